//! Embedded WGSL sources for the SSRT depth-of-field program.

pub const LINEAR_DEPTH_SHADER: &str = include_str!("../shaders/linear_depth.wgsl");
pub const SSRT_DOF_SHADER: &str = include_str!("../shaders/ssrt_dof.wgsl");
pub const BLIT_SHADER: &str = include_str!("../shaders/blit.wgsl");

/// Name under which the depth-of-field program is registered.
pub const SSRT_DOF_PROGRAM_NAME: &str = "PostProcess/SSRTDOF";

/// A multi-pass shading program. Pass 0 writes linear depth, pass 1 ray marches.
#[derive(Debug)]
pub struct ProgramSource {
    pub name: &'static str,
    pub passes: &'static [&'static str],
}

pub static SSRT_DOF_PROGRAM: ProgramSource = ProgramSource {
    name: SSRT_DOF_PROGRAM_NAME,
    passes: &[LINEAR_DEPTH_SHADER, SSRT_DOF_SHADER],
};

static PROGRAMS: &[&ProgramSource] = &[&SSRT_DOF_PROGRAM];

/// Look up a registered program by name.
pub fn find_program(name: &str) -> Option<&'static ProgramSource> {
    PROGRAMS.iter().copied().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_dof_program() {
        let program = find_program("PostProcess/SSRTDOF").unwrap();
        assert_eq!(program.passes.len(), 2);
        assert!(find_program("PostProcess/Missing").is_none());
    }
}

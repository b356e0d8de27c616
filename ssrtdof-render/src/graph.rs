//! The per-frame command list.
//!
//! The graph is built once and replayed unchanged every frame; only the
//! uniform values handed to [`crate::Executor::execute`] vary.

use crate::{Error, Result};

/// Linear depth written where no geometry was drawn.
pub const SENTINEL_DEPTH: f32 = -f32::MAX;
/// Hardware depth clear value for the prepass.
pub const CLEAR_DEPTH: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// The host's color target, read by the ray march and overwritten by the final blit.
    Display,
    LinearDepth,
    RayMarch,
}

/// Pass index within the shading program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderPass {
    LinearDepth = 0,
    RayMarch = 1,
}

impl ShaderPass {
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderNode {
    Clear {
        target: TargetId,
        color: [f32; 4],
        depth: Option<f32>,
    },
    /// Draw every drawable into `target` with `pass`.
    DrawList { target: TargetId, pass: ShaderPass },
    /// Upload the ray-march uniform block and bind static textures.
    BindResources,
    /// Full-screen copy, optionally through a program pass.
    Blit {
        source: TargetId,
        destination: TargetId,
        pass: Option<ShaderPass>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderGraph {
    nodes: Vec<RenderNode>,
}

impl RenderGraph {
    /// Depth prepass, ray march into the reduced target, copy back.
    pub fn depth_of_field() -> Self {
        let nodes = vec![
            RenderNode::Clear {
                target: TargetId::LinearDepth,
                color: [SENTINEL_DEPTH; 4],
                depth: Some(CLEAR_DEPTH),
            },
            RenderNode::DrawList {
                target: TargetId::LinearDepth,
                pass: ShaderPass::LinearDepth,
            },
            RenderNode::BindResources,
            RenderNode::Blit {
                source: TargetId::Display,
                destination: TargetId::RayMarch,
                pass: Some(ShaderPass::RayMarch),
            },
            RenderNode::Blit {
                source: TargetId::RayMarch,
                destination: TargetId::Display,
                pass: None,
            },
        ];
        log::debug!("Built depth-of-field graph with {} nodes", nodes.len());
        Self { nodes }
    }

    /// Build a graph from an explicit node list, checking its ordering.
    pub fn from_nodes(nodes: Vec<RenderNode>) -> Result<Self> {
        validate(&nodes)?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[RenderNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn validate(nodes: &[RenderNode]) -> Result<()> {
    let mut written = vec![TargetId::Display];
    let mut bound = false;

    for (i, node) in nodes.iter().enumerate() {
        match *node {
            RenderNode::Clear { target, .. } => {
                if !written.contains(&target) {
                    written.push(target);
                }
            }
            RenderNode::DrawList { target, .. } => {
                if !written.contains(&target) {
                    return Err(Error::Graph(format!("node {i}: draw into {target:?} before it is cleared")));
                }
            }
            RenderNode::BindResources => bound = true,
            RenderNode::Blit { source, destination, pass } => {
                if source == destination {
                    return Err(Error::Graph(format!("node {i}: blit from {source:?} onto itself")));
                }
                if !written.contains(&source) {
                    return Err(Error::Graph(format!("node {i}: {source:?} is read before it is written")));
                }
                if pass == Some(ShaderPass::RayMarch) {
                    if !bound {
                        return Err(Error::Graph(format!("node {i}: ray march before resources are bound")));
                    }
                    if !written.contains(&TargetId::LinearDepth) {
                        return Err(Error::Graph(format!("node {i}: ray march before the depth prepass")));
                    }
                }
                if !written.contains(&destination) {
                    written.push(destination);
                }
            }
        }
    }
    Ok(())
}

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ssrtdof", about = "Screen-space ray-traced depth of field", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply depth of field to an image over a synthetic depth scene
    Render(RenderArgs),
    /// Print the generated lens samples and rotation angles
    Samples {
        /// Seed for reproducible output; random when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
pub struct RenderArgs {
    /// Input color image
    pub input: PathBuf,
    /// Output PNG path
    #[arg(short, long)]
    pub output: PathBuf,
    /// Executor to run the render graph on
    #[arg(short, long, default_value = "cpu", value_enum)]
    pub backend: Backend,
    /// Depth of the background plane covering the whole frame
    #[arg(long, default_value_t = 5.0)]
    pub depth: f32,
    /// Extra vertical strip in front of the background, as `x0,x1,depth`
    /// with x in [0, 1] across the screen. Repeatable.
    #[arg(long = "strip")]
    pub strips: Vec<StripSpec>,
    /// Distance of the plane in focus
    #[arg(long, default_value_t = 5.0)]
    pub focal_distance: f32,
    /// Lens size
    #[arg(long, default_value_t = 0.01)]
    pub aperture: f32,
    /// Ray-march step length
    #[arg(long, default_value_t = 0.2)]
    pub step: f32,
    /// Ray-march target size relative to the image
    #[arg(long, default_value_t = 0.5)]
    pub scale: f32,
    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 60.0)]
    pub fov: f32,
    /// Upper bound on the march length; defaults to the far plane
    #[arg(long)]
    pub max_distance: Option<f32>,
    /// Seed for the lens samples
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// CPU reference executor
    Cpu,
    /// wgpu on a headless adapter
    Gpu,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StripSpec {
    pub x0: f32,
    pub x1: f32,
    pub depth: f32,
}

impl FromStr for StripSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x0, x1, depth] = parts.as_slice() else {
            return Err(format!("expected `x0,x1,depth`, got `{s}`"));
        };
        let parse = |v: &str| v.parse::<f32>().map_err(|e| format!("`{v}`: {e}"));
        let strip = Self {
            x0: parse(*x0)?,
            x1: parse(*x1)?,
            depth: parse(*depth)?,
        };
        if !(0.0..=1.0).contains(&strip.x0) || !(0.0..=1.0).contains(&strip.x1) || strip.x0 >= strip.x1 {
            return Err(format!("strip bounds must satisfy 0 <= x0 < x1 <= 1, got `{s}`"));
        }
        if strip.depth <= 0.0 {
            return Err(format!("strip depth must be positive, got `{s}`"));
        }
        Ok(strip)
    }
}

pub mod render;
pub mod samples;

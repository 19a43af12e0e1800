pub mod check;
pub mod crop;
pub mod downsample;
pub mod enhance;
pub mod plan;
pub mod reset;
pub mod rotate;
pub mod status;

mod image;
mod system;

pub use image::{ImageSystem, GENERATE_IMAGE};
pub use system::System;

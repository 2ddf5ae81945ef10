pub mod base;
pub mod gradio;
pub mod mock;

pub use base::{mime_type_for, GeneratedImage, ImageGenerator};
pub use gradio::{GradioConfig, GradioImageGenerator, InferenceParams};
pub use mock::MockImageGenerator;

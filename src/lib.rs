pub mod checkpoint;
pub mod display;
pub mod download;
pub mod error;
pub mod layers;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod preprocess;

pub use error::{MaeError, Result};

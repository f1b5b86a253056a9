pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod model;
pub mod runner;
pub mod telemetry;
pub mod template;
pub mod upstream;

pub use completion::GenerationResult;
pub use error::{InferError, Result};

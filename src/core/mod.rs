pub mod config;
pub mod error;
pub mod runner;
pub mod types;
pub mod workflow;

pub use config::{ConfigLoader, ConfigValidator, DetentConfig};
pub use error::AppError;
pub use types::*;

pub mod config;
pub mod error;
pub mod json;
pub mod types;

pub use config::{Config, VkAuthConfig};
pub use error::WallScoutError;
pub use types::*;

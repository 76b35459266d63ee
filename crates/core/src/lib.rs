pub mod error;
pub mod merge;
pub mod models;

pub use error::{ConfigError, GenerationError, ValidationError};
pub use merge::{merge_items, sort_items};
pub use models::*;

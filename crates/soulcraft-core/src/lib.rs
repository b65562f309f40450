//! Soulcraft Core - data model, validation, and error handling

pub mod aggregate;
pub mod error;
pub mod soul;
pub mod types;

pub use aggregate::*;
pub use error::{Error, Result};
pub use soul::*;
pub use types::*;

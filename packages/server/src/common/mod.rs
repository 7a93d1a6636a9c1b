// Common types and utilities shared across the application

pub mod entity_ids;
pub mod error;
pub mod id;
pub mod phone;
pub mod sql;

pub use entity_ids::*;
pub use error::{AppError, ErrorCode};
pub use id::{Id, V4, V7};
pub use sql::Record;

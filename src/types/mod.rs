//! Shared types for docdispatch

mod error;

pub use error::{DispatchError, Result};

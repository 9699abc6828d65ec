//! docdispatch - stateless document-collection request handler
//!
//! Each invocation receives one event, opens one database session, performs
//! exactly one of `insert`, `find`, `update` or `delete` against the fixed
//! collection, closes the session and returns a `{statusCode, headers, body}`
//! envelope.
//!
//! ## Variants
//!
//! - **direct**: the event is the request payload
//! - **gateway**: API-gateway event with the payload as JSON text in `body`
//! - **proxy**: REST routing on `httpMethod` and `path` (`/api/health`, `/api/documents`)

pub mod config;
pub mod db;
pub mod dispatch;
pub mod runtime;
pub mod server;
pub mod types;

pub use config::{Args, Target, Variant};
pub use dispatch::{Dispatcher, Envelope};
pub use types::{DispatchError, Result};

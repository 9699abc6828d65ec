//! Request dispatch
//!
//! Turns one event into one collection operation and one response envelope.

pub mod handler;
pub mod ingest;
pub mod request;
pub mod response;
pub mod routes;

pub use handler::{execute, Dispatcher};
pub use request::{Action, Operation, Plan};
pub use response::{Envelope, Outcome, INVALID_ACTION_MESSAGE, INVALID_JSON_MESSAGE};

//! Local HTTP server

mod http;

pub use http::{build_event, into_response, run};

//! Function runtime glue
//!
//! Registers the dispatcher with the Lambda runtime. The invocation context
//! is not used; every event is handled independently.

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

use crate::config::Variant;
use crate::dispatch::{Dispatcher, Envelope};

/// Serve invocations until the runtime shuts the process down
pub async fn run(dispatcher: Dispatcher, variant: Variant) -> Result<(), Error> {
    info!("Waiting for {} invocations", variant);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<Envelope, Error>(dispatcher.handle(variant, event.payload).await) }
    }))
    .await
}

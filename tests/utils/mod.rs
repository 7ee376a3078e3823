//! Shared fixtures for the integration tests.

use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Initialise the test tracer once; later calls are no-ops.
pub fn init_tracer() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Unwrap a `json!` literal into the object map the builders take.
#[must_use]
pub fn object(value: Value) -> Map<String, Value> {
    let Value::Object(object) = value else { panic!("not an object") };
    object
}

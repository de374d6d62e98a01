//! `Post` namespace.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::dispatch::{HandlerError, RequestContext};

const ALERT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::alert");

/// Destination for alert records.
pub trait AlertSink: Send + Sync {
    /// Records one alert.
    fn alert(&self, message: &str);
}

/// Writes each alert as a `tracing` event on the `relayd::alert` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, message: &str) {
        warn!(target: ALERT_TARGET, event = "alert", alert = %message, "[ALERT]: {message}");
    }
}

/// Parameters of `Post.Alert`: an object of string values. Arrays and
/// non-string values are rejected. A `null` value reads as an empty string.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct AlertParams(BTreeMap<String, Option<String>>);

/// `Post.Alert` bound to a sink.
pub struct Alert {
    sink: Arc<dyn AlertSink>,
}

impl Alert {
    /// Builds the handler.
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Emits one alert record for the `message` key of `params`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-params error when `message` is absent.
    pub fn call(&self, _context: &RequestContext, params: AlertParams) -> Result<(), HandlerError> {
        let AlertParams(mut fields) = params;
        let message = fields
            .remove("message")
            .ok_or_else(|| HandlerError::invalid_params("Missing key"))?
            .unwrap_or_default();
        self.sink.alert(&message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::mock;
    use mockall::predicate::eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::dispatch::test_support::detached_context;
    use crate::dispatch::{Handler, typed};
    use crate::protocol::ErrorCode;

    mock! {
        Sink {}
        impl AlertSink for Sink {
            fn alert(&self, message: &str);
        }
    }

    fn handler(sink: MockSink) -> impl Handler {
        let alert = Alert::new(Arc::new(sink));
        typed(move |context: &RequestContext, params: AlertParams| alert.call(context, params))
    }

    #[rstest]
    fn records_exactly_one_alert() {
        let mut sink = MockSink::new();
        sink.expect_alert()
            .with(eq("disk full"))
            .times(1)
            .return_const(());
        let (context, _outbound) = detached_context();
        let result = handler(sink).call(&context, Some(json!({"message": "disk full"})));
        assert_eq!(result, Ok(serde_json::Value::Null));
    }

    #[rstest]
    #[case(Some(json!({})))]
    #[case(Some(json!({"subject": "x"})))]
    #[case(Some(json!(["x"])))]
    #[case(Some(json!("x")))]
    #[case(None)]
    fn missing_message_is_invalid(#[case] params: Option<serde_json::Value>) {
        let mut sink = MockSink::new();
        sink.expect_alert().never();
        let (context, _outbound) = detached_context();
        let error = handler(sink)
            .call(&context, params)
            .expect_err("should fail");
        assert_eq!(error.kind(), Some(ErrorCode::InvalidParams));
    }

    #[rstest]
    fn null_message_is_an_empty_alert() {
        let mut sink = MockSink::new();
        sink.expect_alert().with(eq("")).times(1).return_const(());
        let (context, _outbound) = detached_context();
        let result = handler(sink).call(&context, Some(json!({"message": null})));
        assert_eq!(result, Ok(serde_json::Value::Null));
    }

    #[rstest]
    fn other_keys_are_ignored() {
        let mut sink = MockSink::new();
        sink.expect_alert()
            .with(eq("disk full"))
            .times(1)
            .return_const(());
        let (context, _outbound) = detached_context();
        let result = handler(sink).call(
            &context,
            Some(json!({"message": "disk full", "host": "db-1"})),
        );
        assert_eq!(result, Ok(serde_json::Value::Null));
    }

    #[rstest]
    fn non_string_message_is_invalid() {
        let mut sink = MockSink::new();
        sink.expect_alert().never();
        let (context, _outbound) = detached_context();
        let error = handler(sink)
            .call(&context, Some(json!({"message": 7})))
            .expect_err("should fail");
        assert_eq!(error.kind(), Some(ErrorCode::InvalidParams));
    }
}

//! Async-callback delivery for the operation lifecycle's notify step
//!. The core only needs "deliver this payload to a
//! URI once"; everything else about the callback contract belongs to the
//! caller.
use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// POSTs `payload` to `uri`. An `Err` means the caller should leave
    /// `notificationURI` in place for a later retry.
    async fn notify(&self, uri: &str, payload: &Value) -> StoreResult<()>;
}

/// Swallows every notification. The default when no delivery mechanism is
/// configured; matches the core's stance that notify failures are
/// retried by a later pass, never by blocking the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _uri: &str, _payload: &Value) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(feature = "notify-http")]
pub use http_notifier::HttpNotifier;

#[cfg(feature = "notify-http")]
mod http_notifier {
    use super::*;
    use crate::error::StoreError;

    /// Delivers notifications over HTTP. Behind the `notify-http` feature
    /// so the core doesn't force a network dependency on callers that
    /// don't need one.
    pub struct HttpNotifier {
        client: reqwest::Client,
    }

    impl HttpNotifier {
        pub fn new() -> Self {
            HttpNotifier {
                client: reqwest::Client::new(),
            }
        }
    }

    impl Default for HttpNotifier {
        fn default() -> Self {
            HttpNotifier::new()
        }
    }

    #[async_trait]
    impl Notifier for HttpNotifier {
        async fn notify(&self, uri: &str, payload: &Value) -> StoreResult<()> {
            let response = self
                .client
                .post(uri)
                .json(payload)
                .send()
                .await
                .map_err(|e| StoreError::transport(e.to_string(), e.status().map(|s| s.as_u16())))?;
            if !response.status().is_success() {
                return Err(StoreError::transport(
                    format!("notify failed: {}", response.status()),
                    Some(response.status().as_u16()),
                ));
            }
            Ok(())
        }
    }
}

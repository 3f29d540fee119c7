use crate::error::RequestError;
use crate::metrics::Metrics;
use crate::protocol::{
    decode_request, encode_response, CanonicalRequest, EncodedResponse, Operation,
};
use crate::storage::StorageBackend;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Turns canonical requests into storage calls and response envelopes.
///
/// One handler is shared by every transport, so all of them see the same
/// store and produce the same envelope for the same outcome. Cloning is
/// cheap.
#[derive(Clone)]
pub struct Handler {
    storage: Arc<dyn StorageBackend>,
    metrics: Arc<Metrics>,
}

impl Handler {
    pub fn new(storage: Arc<dyn StorageBackend>, metrics: Arc<Metrics>) -> Self {
        Self { storage, metrics }
    }

    /// Handler with a no-op metrics sink.
    pub fn with_storage(storage: Arc<dyn StorageBackend>) -> Self {
        Self::new(storage, Arc::new(Metrics::noop()))
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Handle a request whose envelope names its own method (TCP and UDP).
    pub async fn handle_bytes(&self, bytes: &[u8], transport: &'static str) -> EncodedResponse {
        let decoded = decode_request(bytes).map(|request| request.into_canonical());
        self.handle_decoded(decoded, transport).await
    }

    /// Handle a request whose method comes from the transport (HTTP verb).
    pub async fn handle_bytes_as(
        &self,
        operation: Operation,
        bytes: &[u8],
        transport: &'static str,
    ) -> EncodedResponse {
        let decoded = decode_request(bytes).map(|request| request.into_canonical_with(operation));
        self.handle_decoded(decoded, transport).await
    }

    async fn handle_decoded(
        &self,
        decoded: Result<CanonicalRequest, RequestError>,
        transport: &'static str,
    ) -> EncodedResponse {
        let request = match decoded {
            Ok(request) => request,
            Err(err) => {
                debug!(transport, error = %err, "undecodable request");
                return encode_response(Err(err));
            }
        };

        self.metrics.record(request.operation.label());

        let result = AssertUnwindSafe(self.execute(request, transport))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(&*panic);
                error!(transport, panic = %message, "request handling panicked");
                Err(RequestError::Internal(message))
            });

        encode_response(result)
    }

    /// Run one canonical request against storage.
    pub async fn execute(
        &self,
        request: CanonicalRequest,
        transport: &'static str,
    ) -> Result<Option<Value>, RequestError> {
        let CanonicalRequest {
            operation,
            key,
            batch,
        } = request;
        debug!(transport, method = operation.label(), "request");

        match operation {
            Operation::Get => Ok(Some(self.storage.get(&key).await?)),
            Operation::Post => {
                self.storage.put(batch).await?;
                Ok(None)
            }
            Operation::Delete => {
                self.storage.delete(&key).await?;
                Ok(None)
            }
            Operation::Other(_) => Err(RequestError::MethodNotSupported),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler panicked".to_string()
    }
}

//! Wire envelope shared by all transports and its canonical form.

pub mod codec;
pub mod envelope;

pub use codec::{decode_request, encode_response, status_for, EncodedResponse};
pub use envelope::{Request, Response};

use crate::storage::Batch;

/// Canonical operation, normalized from whichever transport carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get,
    Post,
    Delete,
    /// Any token the store does not serve. Kept verbatim for logging.
    Other(String),
}

impl Operation {
    /// Map a method token onto an operation. Matching is exact, as with
    /// HTTP verbs: `get` is not `GET`.
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Operation::Get,
            "POST" => Operation::Post,
            "DELETE" => Operation::Delete,
            other => Operation::Other(other.to_string()),
        }
    }

    /// Label used for logging and metrics.
    pub fn label(&self) -> &str {
        match self {
            Operation::Get => "GET",
            Operation::Post => "POST",
            Operation::Delete => "DELETE",
            Operation::Other(token) => token,
        }
    }
}

/// Transport-neutral request handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    pub operation: Operation,
    /// Key for GET and DELETE.
    pub key: String,
    /// Pairs for POST.
    pub batch: Batch,
}

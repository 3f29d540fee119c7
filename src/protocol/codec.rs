use super::{Request, Response};
use crate::error::RequestError;
use crate::storage::StorageError;
use serde_json::Value;
use tracing::{debug, error};

/// Last-resort envelope when even the degraded response cannot be encoded.
const FALLBACK_ENVELOPE: &[u8] = br#"{"Err":"response encoding failed","Status":500,"Data":null}"#;

/// A response envelope together with its wire bytes.
#[derive(Debug, Clone)]
pub struct EncodedResponse {
    pub response: Response,
    pub bytes: Vec<u8>,
}

impl EncodedResponse {
    pub fn status(&self) -> u16 {
        self.response.status
    }
}

/// Map a request outcome to its status code.
///
/// Order matters: not-found, empty key, unsupported method, then
/// everything else (including an empty store) is a server error.
pub fn status_for(err: Option<&RequestError>) -> u16 {
    match err {
        None => 200,
        Some(RequestError::Storage(StorageError::KeyNotFound)) => 404,
        Some(RequestError::Storage(StorageError::KeyEmpty)) => 400,
        Some(RequestError::MethodNotSupported) => 405,
        Some(_) => 500,
    }
}

/// Decode a request envelope from raw bytes.
pub fn decode_request(bytes: &[u8]) -> Result<Request, RequestError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Build the envelope for a request outcome and serialize it.
///
/// On error the payload is discarded and `Err` carries the message. This
/// never fails: an encoding failure degrades to a 500 envelope.
pub fn encode_response(result: Result<Option<Value>, RequestError>) -> EncodedResponse {
    encode_with(result, |response| serde_json::to_vec(response))
}

fn envelope(result: Result<Option<Value>, RequestError>) -> Response {
    match result {
        Ok(data) => Response {
            err: String::new(),
            status: status_for(None),
            data,
        },
        Err(err) => {
            debug!(error = %err, "request failed");
            Response {
                err: err.to_string(),
                status: status_for(Some(&err)),
                data: None,
            }
        }
    }
}

fn encode_with<F>(result: Result<Option<Value>, RequestError>, encode: F) -> EncodedResponse
where
    F: Fn(&Response) -> serde_json::Result<Vec<u8>>,
{
    let response = envelope(result);
    let err = match encode(&response) {
        Ok(bytes) => return EncodedResponse { response, bytes },
        Err(err) => err,
    };

    error!(error = %err, "response encoding failed");
    let degraded = envelope(Err(RequestError::Encode(err.to_string())));
    match encode(&degraded) {
        Ok(bytes) => EncodedResponse {
            response: degraded,
            bytes,
        },
        Err(err) => {
            error!(error = %err, "degraded response encoding failed");
            EncodedResponse {
                response: Response {
                    err: "response encoding failed".to_string(),
                    status: 500,
                    data: None,
                },
                bytes: FALLBACK_ENVELOPE.to_vec(),
            }
        }
    }
}

use super::{CanonicalRequest, Operation};
use crate::storage::Batch;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Request envelope: `{"Method": .., "Query": .., "Payload": {..}|null}`.
///
/// Decoding is lenient: field names match case-insensitively, `null` on
/// `Method` or `Query` leaves the field empty, unknown fields are skipped
/// and a bare `null` document is an empty request. When a field appears
/// twice the later one wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Request {
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "Query")]
    pub query: String,
    #[serde(rename = "Payload")]
    pub payload: Option<Batch>,
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RequestVisitor)
    }
}

struct RequestVisitor;

impl<'de> Visitor<'de> for RequestVisitor {
    type Value = Request;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a request envelope object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Request, E> {
        Ok(Request::default())
    }

    fn visit_map<A>(self, mut map: A) -> Result<Request, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut request = Request::default();
        while let Some(name) = map.next_key::<String>()? {
            match name.to_lowercase().as_str() {
                "method" => {
                    if let Some(method) = map.next_value::<Option<String>>()? {
                        request.method = method;
                    }
                }
                "query" => {
                    if let Some(query) = map.next_value::<Option<String>>()? {
                        request.query = query;
                    }
                }
                "payload" => request.payload = map.next_value()?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(request)
    }
}

impl Request {
    pub fn get(key: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            query: key.into(),
            payload: None,
        }
    }

    pub fn post(batch: Batch) -> Self {
        Self {
            method: "POST".to_string(),
            query: String::new(),
            payload: Some(batch),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            method: "DELETE".to_string(),
            query: key.into(),
            payload: None,
        }
    }

    /// Canonical form using the envelope's own `Method` field.
    pub fn into_canonical(self) -> CanonicalRequest {
        let operation = Operation::parse(&self.method);
        self.into_canonical_with(operation)
    }

    /// Canonical form with the operation supplied by the transport, as the
    /// HTTP adapter does with the request verb.
    pub fn into_canonical_with(self, operation: Operation) -> CanonicalRequest {
        CanonicalRequest {
            operation,
            key: self.query,
            batch: self.payload.unwrap_or_default(),
        }
    }
}

/// Response envelope: `{"Err": "", "Status": 200, "Data": ..}`.
///
/// `Data` is serialized as `null` when absent. Field order is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Err")]
    pub err: String,
    #[serde(rename = "Status")]
    pub status: u16,
    #[serde(rename = "Data")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_decodes_missing_fields() {
        let req: Request = serde_json::from_str(r#"{"Query":"1"}"#).unwrap();
        assert_eq!(req.method, "");
        assert_eq!(req.query, "1");
        assert_eq!(req.payload, None);
    }

    #[test]
    fn test_request_decodes_lowercase_aliases() {
        let req: Request =
            serde_json::from_str(r#"{"method":"POST","payload":{"1":"hello"}}"#).unwrap();
        let canonical = req.into_canonical();
        assert_eq!(canonical.operation, Operation::Post);
        assert_eq!(canonical.batch.get("1"), Some(&json!("hello")));
    }

    #[test]
    fn test_field_names_ignore_case() {
        let req: Request =
            serde_json::from_str(r#"{"METHOD":"GET","QUERY":"1","pAyLoAd":{"k":true}}"#).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.query, "1");
        assert_eq!(req.payload.unwrap().get("k"), Some(&json!(true)));
    }

    #[test]
    fn test_null_text_fields_are_empty() {
        let req: Request =
            serde_json::from_str(r#"{"Method":"GET","Query":null,"Payload":null}"#).unwrap();
        assert_eq!(req, Request::get(""));

        let req: Request = serde_json::from_str(r#"{"Method":null}"#).unwrap();
        assert_eq!(req.method, "");
    }

    #[test]
    fn test_unknown_fields_and_null_document() {
        let req: Request =
            serde_json::from_str(r#"{"Extra":[1,{"a":null}],"Query":"2"}"#).unwrap();
        assert_eq!(req.query, "2");

        let req: Request = serde_json::from_str("null").unwrap();
        assert_eq!(req, Request::default());
    }

    #[test]
    fn test_later_duplicate_field_wins() {
        let req: Request = serde_json::from_str(r#"{"Query":"a","query":"b"}"#).unwrap();
        assert_eq!(req.query, "b");
    }

    #[test]
    fn test_wrong_field_types_are_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"Query":7}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"Payload":[1]}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"["GET"]"#).is_err());
    }

    #[test]
    fn test_null_payload_is_empty_batch() {
        let req: Request = serde_json::from_str(r#"{"Method":"POST","Payload":null}"#).unwrap();
        assert!(req.into_canonical().batch.is_empty());
    }

    #[test]
    fn test_transport_operation_overrides_method_field() {
        let req = Request::get("1");
        let canonical = req.into_canonical_with(Operation::Delete);
        assert_eq!(canonical.operation, Operation::Delete);
        assert_eq!(canonical.key, "1");
    }

    #[test]
    fn test_response_field_shape() {
        let ok = Response {
            err: String::new(),
            status: 200,
            data: Some(json!("hello world")),
        };
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"Err":"","Status":200,"Data":"hello world"}"#
        );

        let failed = Response {
            err: "store is empty".to_string(),
            status: 500,
            data: None,
        };
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"Err":"store is empty","Status":500,"Data":null}"#
        );
    }
}

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One delivery of a queue message.
///
/// The receipt handle is only valid for this delivery: once the visibility
/// timeout lapses the message is handed out again with a new handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub receipt_handle: String,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(id: &str, receipt_handle: &str, body: impl Into<Vec<u8>>) -> Self {
        Message {
            id: id.to_owned(),
            receipt_handle: receipt_handle.to_owned(),
            body: body.into(),
        }
    }
}

/// Epoch seconds of the email, sent either as a number or as a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestream {
    Seconds(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub email_subject: String,
    pub email_sender: String,
    pub email_timestream: Timestream,
    pub email_content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A decoded message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub data: EmailRecord,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A body that only carries the key of the original payload in the object store
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPointer {
    #[serde(default)]
    pub id: Option<String>,
    pub s3_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Inline(Payload),
    Pointer(ObjectPointer),
}

const POINTER_FIELD: &str = "s3Key";

/// Decodes a message body into either an inline payload or a pointer to one
pub fn decode_body(body: &[u8]) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_slice(body)?;
    if value.get(POINTER_FIELD).is_some() {
        serde_json::from_value(value).map(Inbound::Pointer)
    } else {
        serde_json::from_value(value).map(Inbound::Inline)
    }
}

/// Decodes an object fetched from the store
pub fn decode_payload(bytes: &[u8]) -> Result<Payload, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    pub status: ProcessingStatus,
    pub transformations: Vec<String>,
    pub processed_at: DateTime<Utc>,
    pub processed_by: String,
}

/// Field the processing record is written under
pub const PROCESSING_METADATA_FIELD: &str = "processing-metadata";

/// The input payload with the processing record appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedPayload {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(rename = "processing-metadata")]
    pub processing_metadata: ProcessingMetadata,
}

impl ProcessedPayload {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INLINE: &str = r#"{"id":"x1","data":{"email_subject":"S","email_sender":"a@b","email_timestream":1700000000,"email_content":"C"}}"#;

    #[test]
    fn test_decode_inline() {
        match decode_body(INLINE.as_bytes()).unwrap() {
            Inbound::Inline(payload) => {
                assert_eq!(Some("x1".to_owned()), payload.id);
                assert_eq!(None, payload.timestamp);
                assert_eq!("S", payload.data.email_subject);
                assert_eq!(Timestream::Seconds(1700000000), payload.data.email_timestream);
            }
            other => panic!("expected an inline payload, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_pointer() {
        let body = r#"{"id":"x2","s3Key":"data/2023/x2.json","timestamp":"2023-11-14T22:13:20Z","type":"general"}"#;
        assert_eq!(
            Inbound::Pointer(ObjectPointer {
                id: Some("x2".to_owned()),
                s3_key: "data/2023/x2.json".to_owned(),
            }),
            decode_body(body.as_bytes()).unwrap()
        );
    }

    #[test]
    fn test_decode_not_json() {
        assert!(decode_body(b"not-json").is_err());
    }

    #[test]
    fn test_decode_missing_email_field() {
        let body = r#"{"id":"x3","data":{"email_subject":"S","email_sender":"a@b","email_content":"C"}}"#;
        assert!(decode_body(body.as_bytes()).is_err());
    }

    #[test]
    fn test_textual_timestream() {
        let body = r#"{"data":{"email_subject":"S","email_sender":"a@b","email_timestream":"1700000000","email_content":"C"}}"#;
        let payload = decode_payload(body.as_bytes()).unwrap();
        assert_eq!(
            Timestream::Text("1700000000".to_owned()),
            payload.data.email_timestream
        );
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let body = r#"{"data":{"email_subject":"S","email_sender":"a@b","email_timestream":1700000000,"email_content":"C","type":"general"},"email_date":"2023-11-14T22:13:20.000Z","processed_by":"api-receiver"}"#;
        let payload = decode_payload(body.as_bytes()).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!("api-receiver", value["processed_by"]);
        assert_eq!("2023-11-14T22:13:20.000Z", value["email_date"]);
        assert_eq!("general", value["data"]["type"]);
        assert!(value.get("id").is_none());
    }
}

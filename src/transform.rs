use crate::clock::Clock;
use crate::model::{
    Payload, ProcessedPayload, ProcessingMetadata, ProcessingStatus, PROCESSING_METADATA_FIELD,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const TRANSFORMATIONS: [&str; 3] = [
    "added_timestamp",
    "added_processor_info",
    "validated_structure",
];

/// Stamps payloads with the processing record of this worker
pub struct Transformer {
    worker_id: String,
    clock: Arc<dyn Clock>,
}

impl Transformer {
    pub fn new(worker_id: &str, clock: Arc<dyn Clock>) -> Self {
        Transformer {
            worker_id: worker_id.to_owned(),
            clock,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn transform(&self, payload: &Payload) -> ProcessedPayload {
        self.transform_at(payload, self.clock.now())
    }

    /// Stamps `payload` as processed at `now`. A processing record carried
    /// in by the payload is replaced by the new one.
    pub fn transform_at(&self, payload: &Payload, now: DateTime<Utc>) -> ProcessedPayload {
        let mut payload = payload.clone();
        if payload.extra.remove(PROCESSING_METADATA_FIELD).is_some() {
            debug!("Replacing earlier processing record of {:?}", &payload.id);
        }
        ProcessedPayload {
            payload,
            processing_metadata: ProcessingMetadata {
                status: ProcessingStatus::Completed,
                transformations: TRANSFORMATIONS.iter().map(|t| t.to_string()).collect(),
                processed_at: now,
                processed_by: self.worker_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::decode_payload;

    const BODY: &[u8] = br#"{"id":"x1","timestamp":"2023-11-14T22:13:20.000Z","data":{"email_subject":"S","email_sender":"a@b","email_timestream":1700000000,"email_content":"C"},"processed_by":"api-receiver"}"#;

    fn transformer() -> Transformer {
        Transformer::new("sqs-worker", Arc::new(FixedClock::at_epoch_seconds(1700000100)))
    }

    #[test]
    fn test_deterministic_for_fixed_clock() {
        let payload = decode_payload(BODY).unwrap();
        let first = transformer().transform(&payload).to_json().unwrap();
        let second = transformer().transform(&payload).to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_appends_metadata_and_keeps_fields() {
        let payload = decode_payload(BODY).unwrap();
        let processed = transformer().transform(&payload);
        assert_eq!(payload, processed.payload);

        let value = serde_json::to_value(&processed).unwrap();
        assert_eq!("x1", value["id"]);
        assert_eq!("api-receiver", value["processed_by"]);
        assert_eq!("C", value["data"]["email_content"]);

        let metadata = &value["processing-metadata"];
        assert_eq!("completed", metadata["status"]);
        assert_eq!("sqs-worker", metadata["processedBy"]);
        assert_eq!("2023-11-14T22:15:00Z", metadata["processedAt"]);
        assert_eq!(
            serde_json::json!(["added_timestamp", "added_processor_info", "validated_structure"]),
            metadata["transformations"]
        );
    }

    #[test]
    fn test_earlier_processing_record_is_replaced() {
        let payload = decode_payload(
            br#"{"id":"x1","data":{"email_subject":"S","email_sender":"a@b","email_timestream":1700000000,"email_content":"C"},"processing-metadata":{"status":"old"}}"#,
        )
        .unwrap();
        let processed = transformer().transform(&payload);
        assert!(!processed.payload.extra.contains_key(PROCESSING_METADATA_FIELD));

        let json = String::from_utf8(processed.to_json().unwrap()).unwrap();
        assert_eq!(1, json.matches("\"processing-metadata\"").count());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!("completed", value["processing-metadata"]["status"]);
        assert_eq!("sqs-worker", value["processing-metadata"]["processedBy"]);
    }
}

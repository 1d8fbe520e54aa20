use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::ProcessingError;
use crate::keys::{KeyGenerator, StorageKey, UuidSuffix};
use crate::model::{decode_body, decode_payload, Inbound, Message, Payload, ProcessedPayload};
use crate::queue::QueueClient;
use crate::store::{ObjectStore, StoredObject, JSON_CONTENT_TYPE};
use crate::transform::Transformer;
use std::collections::BTreeMap;
use std::sync::Arc;

const UNKNOWN: &str = "unknown";
const MAX_METADATA_LEN: usize = 256;

/// What a successful attempt left behind
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub message_id: String,
    pub key: StorageKey,
    /// False when the object was written but the delete call failed; the
    /// message will be delivered again
    pub deleted: bool,
}

/// Carries one message from the queue into the object store
pub struct MessageWorker<Q, S> {
    queue: Arc<Q>,
    store: Arc<S>,
    transformer: Transformer,
    keys: KeyGenerator,
}

impl<Q, S> MessageWorker<Q, S>
where
    Q: QueueClient,
    S: ObjectStore,
{
    pub fn new(queue: Arc<Q>, store: Arc<S>, transformer: Transformer, keys: KeyGenerator) -> Self {
        MessageWorker {
            queue,
            store,
            transformer,
            keys,
        }
    }

    /// Builds a worker stamping wall-clock time and random key suffixes
    pub fn from_config(queue: Arc<Q>, store: Arc<S>, config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        MessageWorker::new(
            queue,
            store,
            Transformer::new(&config.worker_id, Arc::clone(&clock)),
            KeyGenerator::new(&config.key_prefix, clock, Arc::new(UuidSuffix)),
        )
    }

    pub fn queue(&self) -> Arc<Q> {
        Arc::clone(&self.queue)
    }

    /// Decodes, transforms and stores one message, then deletes it.
    ///
    /// The message is only deleted once the processed payload is stored. Any
    /// error leaves it on the queue for redelivery.
    pub async fn process(&self, message: Message) -> Result<Processed, ProcessingError> {
        debug!("Processing message {}", &message.id);
        let payload = self.resolve(&message).await?;
        let processed = self.transformer.transform(&payload);
        // One clock reading stamps the record and picks the key partition
        let key = self
            .keys
            .generate_at(&payload, processed.processing_metadata.processed_at);

        let object = StoredObject {
            bytes: processed.to_json()?,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            metadata: object_metadata(&payload, &self.transformer, &processed),
        };
        self.store.put(key.as_str(), object).await?;
        info!("Stored processed message {} at {}", &message.id, &key);

        let deleted = match self.queue.delete(&message.receipt_handle).await {
            Ok(()) => {
                debug!(
                    "Deleted message {} from: {} | subject: {}",
                    &message.id, &payload.data.email_sender, &payload.data.email_subject
                );
                true
            }
            Err(e) => {
                error!(
                    "Stored message {} but could not delete it, it will be delivered again: {}",
                    &message.id, e
                );
                false
            }
        };

        Ok(Processed {
            message_id: message.id,
            key,
            deleted,
        })
    }

    /// Returns the payload carried by the message, fetching it from the store
    /// when the body only points at it
    async fn resolve(&self, message: &Message) -> Result<Payload, ProcessingError> {
        match decode_body(&message.body)? {
            Inbound::Inline(payload) => Ok(payload),
            Inbound::Pointer(pointer) => {
                debug!(
                    "Message {} points at {}, fetching original",
                    &message.id, &pointer.s3_key
                );
                let bytes = self.store.get(&pointer.s3_key).await?;
                let mut payload = decode_payload(&bytes)?;
                if payload.id.is_none() {
                    payload.id = pointer.id;
                }
                Ok(payload)
            }
        }
    }
}

fn object_metadata(
    payload: &Payload,
    transformer: &Transformer,
    processed: &ProcessedPayload,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_owned(), header_value(transformer.worker_id()));
    metadata.insert(
        "processed-at".to_owned(),
        processed.processing_metadata.processed_at.to_rfc3339(),
    );
    metadata.insert(
        "email-subject".to_owned(),
        header_value(&payload.data.email_subject),
    );
    metadata.insert(
        "email-sender".to_owned(),
        header_value(&payload.data.email_sender),
    );
    metadata
}

/// Object metadata travels as http headers, so only printable ascii survives
fn header_value(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .take(MAX_METADATA_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        UNKNOWN.to_owned()
    } else {
        cleaned.to_owned()
    }
}

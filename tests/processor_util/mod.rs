#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqs_mail_worker::clock::{Clock, FixedClock};
use sqs_mail_worker::config::Config;
use sqs_mail_worker::errors::{QueueError, StoreError};
use sqs_mail_worker::keys::{KeyGenerator, UuidSuffix};
use sqs_mail_worker::model::Message;
use sqs_mail_worker::processor::Processor;
use sqs_mail_worker::queue::{QueueClient, ReceiveRequest};
use sqs_mail_worker::store::{ObjectStore, StoredObject};
use sqs_mail_worker::transform::Transformer;
use sqs_mail_worker::work::MessageWorker;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// 2023-11-14T22:13:20Z
pub const FIXED_EPOCH_SECONDS: i64 = 1700000000;

pub const E2E_BODY: &str = r#"{"id":"x1","data":{"email_subject":"S","email_sender":"a@b","email_timestream":1700000000,"email_content":"C"}}"#;

pub fn email_body(id: &str) -> String {
    format!(
        r#"{{"id":"{}","data":{{"email_subject":"Subject {}","email_sender":"a@b","email_timestream":1700000000,"email_content":"C"}}}}"#,
        id, id
    )
}

/// Builds a call log with a queue and a store recording into it
macro_rules! fakes {
    () => {{
        let log = CallLog::default();
        let queue = InMemoryQueue::new(log.clone());
        let store = InMemoryStore::new(log.clone());
        (log, queue, store)
    }};
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Receive,
    Get(String),
    Put(String),
    Delete(String),
}

/// Calls made against both fakes, in the order they happened
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Put(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(receipt_handle) => Some(receipt_handle),
                _ => None,
            })
            .collect()
    }

    pub fn receives(&self) -> usize {
        self.calls()
            .into_iter()
            .filter(|c| *c == Call::Receive)
            .count()
    }
}

pub struct InMemoryQueue {
    messages: Mutex<VecDeque<Message>>,
    log: CallLog,
    fail_receive: bool,
    fail_delete: bool,
}

impl InMemoryQueue {
    pub fn new(log: CallLog) -> Self {
        InMemoryQueue {
            messages: Mutex::new(VecDeque::new()),
            log,
            fail_receive: false,
            fail_delete: false,
        }
    }

    pub fn failing_receive(mut self) -> Self {
        self.fail_receive = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn send(&self, id: &str, body: &str) {
        let message = Message::new(id, &format!("rh-{}", id), body);
        self.messages.lock().unwrap().push_back(message);
    }
}

impl QueueClient for InMemoryQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
        self.log.record(Call::Receive);
        if self.fail_receive {
            return Err(QueueError::Unavailable("connection refused".to_owned()));
        }
        let mut messages = self.messages.lock().unwrap();
        let take = (request.max_messages as usize).min(messages.len());
        Ok(messages.drain(..take).collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.log.record(Call::Delete(receipt_handle.to_owned()));
        if self.fail_delete {
            Err(QueueError::Unavailable("connection reset".to_owned()))
        } else {
            Ok(())
        }
    }
}

pub struct InMemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    log: CallLog,
    fail_put: bool,
    panic_put: AtomicBool,
    put_gate: Option<Arc<Semaphore>>,
}

impl InMemoryStore {
    pub fn new(log: CallLog) -> Self {
        InMemoryStore {
            objects: Mutex::new(HashMap::new()),
            log,
            fail_put: false,
            panic_put: AtomicBool::new(false),
            put_gate: None,
        }
    }

    pub fn failing_put(mut self) -> Self {
        self.fail_put = true;
        self
    }

    /// The next put panics after it is recorded
    pub fn panicking_put(self) -> Self {
        self.panic_put.store(true, Ordering::SeqCst);
        self
    }

    /// Every put waits for a permit of `gate` before it completes
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.put_gate = Some(gate);
        self
    }

    pub fn insert(&self, key: &str, bytes: &str) {
        let object = StoredObject {
            bytes: bytes.as_bytes().to_vec(),
            content_type: "application/json".to_owned(),
            metadata: Default::default(),
        };
        self.objects.lock().unwrap().insert(key.to_owned(), object);
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn json(&self, key: &str) -> serde_json::Value {
        let object = self.object(key).expect("no object stored at key");
        serde_json::from_slice(&object.bytes).expect("stored object is not json")
    }
}

impl ObjectStore for InMemoryStore {
    async fn put(&self, key: &str, object: StoredObject) -> Result<(), StoreError> {
        if let Some(gate) = &self.put_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.log.record(Call::Put(key.to_owned()));
        if self.panic_put.swap(false, Ordering::SeqCst) {
            panic!("object store blew up writing {}", key);
        }
        if self.fail_put {
            return Err(StoreError::Unavailable("slow down".to_owned()));
        }
        self.objects.lock().unwrap().insert(key.to_owned(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.log.record(Call::Get(key.to_owned()));
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }
}

/// A clock that moves forward by `step` every time it is read
pub struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
    step: chrono::Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
        SteppingClock {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + self.step;
        now
    }
}

pub fn test_config() -> Config {
    Config::default()
        .with_poll_interval(Duration::from_millis(100))
        .with_drain_budget(Duration::from_secs(30))
}

pub fn build_worker(
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryStore>,
) -> MessageWorker<InMemoryQueue, InMemoryStore> {
    let clock = Arc::new(FixedClock::at_epoch_seconds(FIXED_EPOCH_SECONDS));
    build_worker_with_clock(queue, store, clock)
}

pub fn build_worker_with_clock(
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryStore>,
    clock: Arc<dyn Clock>,
) -> MessageWorker<InMemoryQueue, InMemoryStore> {
    MessageWorker::new(
        queue,
        store,
        Transformer::new("sqs-worker", clock.clone()),
        KeyGenerator::new("emails", clock, Arc::new(UuidSuffix)),
    )
}

pub fn build_processor(
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryStore>,
    config: &Config,
) -> Processor<InMemoryQueue, InMemoryStore> {
    Processor::new(build_worker(queue, store), config)
}

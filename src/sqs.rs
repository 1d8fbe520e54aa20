use crate::config::Mode;
use crate::errors::{ProcessorError, QueueError};
use crate::model::Message;
use crate::queue::{QueueClient, ReceiveRequest};
use rusoto_core::{HttpClient, Region, RusotoError};
use rusoto_credential::StaticProvider;
use rusoto_sqs::{
    DeleteMessageRequest, Message as SqsMessage, ReceiveMessageRequest, Sqs,
    SqsClient as RusotoSqsClient,
};
use std::error::Error;
use std::sync::Arc;

const NON_EXISTENT_QUEUE: &str = "NonExistentQueue";

/// Queue client backed by Amazon SQS.
///
/// Cloning is cheap as the underlying Rusoto client is embedded in an Arc.
#[derive(Clone)]
pub struct SqsQueue {
    pub queue_url: String,
    sqs: Arc<RusotoSqsClient>,
}

impl SqsQueue {
    pub fn new(region: Region, queue_url: &str) -> Self {
        SqsQueue {
            queue_url: queue_url.to_owned(),
            sqs: Arc::new(RusotoSqsClient::new(region)),
        }
    }

    /// Talks to a local endpoint with static fake credentials
    pub fn local(port: u16, queue_url: &str) -> Result<Self, ProcessorError> {
        let dispatcher = HttpClient::new()?;
        let credentials_provider =
            StaticProvider::new("fakeKey".to_string(), "fakeSecret".to_string(), None, None);
        let sqs = RusotoSqsClient::new_with(
            dispatcher,
            credentials_provider,
            Mode::Local(port).region(),
        );
        Ok(SqsQueue {
            queue_url: queue_url.to_owned(),
            sqs: Arc::new(sqs),
        })
    }

    pub fn from_mode(mode: &Mode, queue_url: &str) -> Result<Self, ProcessorError> {
        match mode {
            Mode::AWS(region) => Ok(SqsQueue::new(region.to_owned(), queue_url)),
            Mode::Local(port) => SqsQueue::local(*port, queue_url),
        }
    }

    fn queue_error<E: Error + 'static>(&self, e: RusotoError<E>) -> QueueError {
        match e {
            RusotoError::Unknown(ref response)
                if String::from_utf8_lossy(&response.body).contains(NON_EXISTENT_QUEUE) =>
            {
                QueueError::NotFound(self.queue_url.clone())
            }
            e => QueueError::Unavailable(e.to_string()),
        }
    }
}

impl QueueClient for SqsQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
        trace!("receive called: {:?}", request);
        let request = ReceiveMessageRequest {
            queue_url: self.queue_url.clone(),
            max_number_of_messages: Some(request.max_messages),
            wait_time_seconds: Some(request.wait_seconds),
            visibility_timeout: Some(request.visibility_timeout_seconds),
            ..ReceiveMessageRequest::default()
        };

        let result = self
            .sqs
            .receive_message(request)
            .await
            .map_err(|e| self.queue_error(e))?;
        Ok(result
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(to_message)
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!("delete_message called. receipt_handle: {}", receipt_handle);
        let request = DeleteMessageRequest {
            queue_url: self.queue_url.clone(),
            receipt_handle: receipt_handle.to_owned(),
        };

        self.sqs
            .delete_message(request)
            .await
            .map_err(|e| self.queue_error(e))
    }
}

fn to_message(m: SqsMessage) -> Option<Message> {
    let id = m
        .message_id
        .clone()
        .unwrap_or_else(|| "<No ID Found>".to_string());
    match m.receipt_handle {
        Some(receipt_handle) => Some(Message {
            id,
            receipt_handle,
            body: m.body.unwrap_or_default().into_bytes(),
        }),
        None => {
            warn!("Cannot process message {} as it has no receipt handle", id);
            None
        }
    }
}

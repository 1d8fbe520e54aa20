use crate::errors::QueueError;
use crate::model::Message;
use std::future::Future;

/// Parameters of one long-poll receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: i64,
    pub wait_seconds: i64,
    pub visibility_timeout_seconds: i64,
}

/// Trait to implement to plug a queue service into the processor.
///
/// Delivery is at-least-once: a received message that is not deleted before
/// its visibility timeout lapses will be received again.
pub trait QueueClient {
    /// Receives up to `max_messages`, blocking server side for up to
    /// `wait_seconds` when the queue is empty
    fn receive(
        &self,
        request: &ReceiveRequest,
    ) -> impl Future<Output = Result<Vec<Message>, QueueError>> + Send;

    /// Deletes the delivery identified by `receipt_handle`
    fn delete(&self, receipt_handle: &str) -> impl Future<Output = Result<(), QueueError>> + Send;
}

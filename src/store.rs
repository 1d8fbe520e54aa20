use crate::errors::StoreError;
use std::collections::BTreeMap;
use std::future::Future;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Trait to implement to plug an object store into the processor.
/// Implementations are bound to a single bucket.
pub trait ObjectStore {
    fn put(
        &self,
        key: &str,
        object: StoredObject,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fails with `StoreError::NotFound` when nothing is stored at `key`
    fn get(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;
}

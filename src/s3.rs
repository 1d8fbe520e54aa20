use crate::config::Mode;
use crate::errors::{ProcessorError, StoreError};
use crate::store::{ObjectStore, StoredObject};
use futures::TryStreamExt;
use rusoto_core::{ByteStream, HttpClient, Region, RusotoError};
use rusoto_credential::StaticProvider;
use rusoto_s3::{
    GetObjectError, GetObjectRequest, PutObjectRequest, S3Client as RusotoS3Client, S3,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Object store backed by a single Amazon S3 bucket
#[derive(Clone)]
pub struct S3Store {
    pub bucket: String,
    s3: Arc<RusotoS3Client>,
}

impl S3Store {
    pub fn new(region: Region, bucket: &str) -> Self {
        S3Store {
            bucket: bucket.to_owned(),
            s3: Arc::new(RusotoS3Client::new(region)),
        }
    }

    pub fn local(port: u16, bucket: &str) -> Result<Self, ProcessorError> {
        let dispatcher = HttpClient::new()?;
        let credentials_provider =
            StaticProvider::new("fakeKey".to_string(), "fakeSecret".to_string(), None, None);
        let s3 = RusotoS3Client::new_with(
            dispatcher,
            credentials_provider,
            Mode::Local(port).region(),
        );
        Ok(S3Store {
            bucket: bucket.to_owned(),
            s3: Arc::new(s3),
        })
    }

    pub fn from_mode(mode: &Mode, bucket: &str) -> Result<Self, ProcessorError> {
        match mode {
            Mode::AWS(region) => Ok(S3Store::new(region.to_owned(), bucket)),
            Mode::Local(port) => S3Store::local(*port, bucket),
        }
    }
}

impl ObjectStore for S3Store {
    async fn put(&self, key: &str, object: StoredObject) -> Result<(), StoreError> {
        debug!("put_object called. bucket: {} key: {}", &self.bucket, key);
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_owned(),
            body: Some(ByteStream::from(object.bytes)),
            content_type: Some(object.content_type),
            metadata: Some(object.metadata.into_iter().collect::<HashMap<_, _>>()),
            ..PutObjectRequest::default()
        };

        self.s3
            .put_object(request)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        debug!("get_object called. bucket: {} key: {}", &self.bucket, key);
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_owned(),
            ..GetObjectRequest::default()
        };

        let output = self.s3.get_object(request).await.map_err(|e| match e {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => {
                StoreError::NotFound(key.to_owned())
            }
            e => StoreError::Unavailable(e.to_string()),
        })?;

        match output.body {
            Some(body) => body
                .map_ok(|chunk| chunk.to_vec())
                .try_concat()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::debug;

use super::error::{Result, StoreError};
use super::store::ObjectStore;
use crate::config::StorageConfig;

/// [`ObjectStore`] backed by any S3-compatible service
#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
    pub storage: StorageConfig,
}

impl S3Client {
    /// Build a client from storage settings
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the default AWS credential chain applies. Path-style addressing is
    /// always on so custom endpoints (Wasabi, MinIO, R2) work unchanged.
    pub async fn new(storage: StorageConfig) -> Self {
        let mut aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(storage.region().to_string()));

        if let (Some(access_key), Some(secret_key)) = (&storage.access_key, &storage.secret_key) {
            aws_config = aws_config.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "dirupload-env",
            ));
        }

        if let Some(endpoint) = &storage.endpoint {
            aws_config = aws_config.endpoint_url(endpoint);
        }

        let sdk_config = aws_config.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            storage,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        self.storage.bucket()
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let size = body.len();

        let mut request = self
            .client
            .put_object()
            .bucket(self.bucket())
            .key(key)
            .content_type(content_type)
            .cache_control(&self.storage.cache_control)
            .content_length(size as i64)
            .body(ByteStream::from(body));

        if let Some(acl) = &self.storage.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        request
            .send()
            .await
            .map_err(|e| StoreError::from_sdk(self.bucket(), key, &e))?;

        debug!(
            "PUT s3://{}/{} ({} bytes, {})",
            self.bucket(),
            key,
            size,
            content_type
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let head_result = self
            .client
            .head_object()
            .bucket(self.bucket())
            .key(key)
            .send()
            .await;

        match head_result {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    Ok(false)
                } else {
                    Err(StoreError::from_sdk(self.bucket(), key, &e))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(self.bucket())
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk(self.bucket(), key, &e))?;

        Ok(output.body)
    }

    fn public_url(&self, key: &str) -> String {
        self.storage.public_url(key)
    }
}

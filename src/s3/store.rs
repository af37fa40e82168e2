use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use super::error::Result;

/// Narrow capability the upload pipeline needs from an object store
///
/// Implementations are shared across workers as `Arc<dyn ObjectStore>` and
/// must tolerate concurrent calls.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Check for an object without transferring its body
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch an object's body
    async fn get(&self, key: &str) -> Result<ByteStream>;

    /// Public URL for `key`. Never touches the network.
    fn public_url(&self, key: &str) -> String;
}

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::fmt::Debug;
use thiserror::Error;

/// Errors returned by an [`ObjectStore`](super::ObjectStore) operation
#[derive(Error, Debug)]
pub enum StoreError {
    /// Credentials rejected or missing permissions on the bucket
    #[error("Access denied for bucket '{bucket}': {message}")]
    AccessDenied { bucket: String, message: String },

    /// Object does not exist
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// Request never produced a response (DNS, connect, timeout)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Store answered with an error code
    #[error("S3 error {code}: {message}")]
    Service { code: String, message: String },

    /// Anything else, including request construction failures
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Classify an AWS SDK error for the given bucket and key
    pub fn from_sdk<E, R>(bucket: &str, key: &str, error: &SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: Debug,
    {
        if let Some(service_error) = error.as_service_error() {
            let code = service_error.code().unwrap_or("Unknown").to_string();
            let message = service_error
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(error).to_string());

            return match code.as_str() {
                "AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
                    Self::AccessDenied {
                        bucket: bucket.to_string(),
                        message,
                    }
                }
                "NoSuchKey" | "NotFound" => Self::NotFound {
                    key: key.to_string(),
                },
                _ => Self::Service { code, message },
            };
        }

        match error {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => Self::Network {
                message: DisplayErrorContext(error).to_string(),
            },
            _ => Self::Other(DisplayErrorContext(error).to_string()),
        }
    }
}

/// Result type for object store operations
pub type Result<T> = std::result::Result<T, StoreError>;

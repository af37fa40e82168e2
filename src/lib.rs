//! Upload a directory tree to an S3-compatible object store.
//!
//! Files are collected up front, then a fixed pool of workers pulls them off
//! a shared cursor and puts each one under a key equal to its path relative
//! to the root.

pub mod config;
pub mod s3;
pub mod upload;

pub use config::{Config, StorageConfig};
pub use s3::{MemoryStore, ObjectStore, S3Client, StoreError};
pub use upload::{CollectError, Dispatcher, RunReport};

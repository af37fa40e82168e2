pub mod client;
pub mod error;
pub mod memory;
pub mod store;

pub use client::S3Client;
pub use error::StoreError;
pub use memory::{MemoryStore, StoredObject};
pub use store::ObjectStore;

pub mod collect;
pub mod dispatch;
pub mod resolve;

pub use collect::{CollectError, collect_files};
pub use dispatch::{Dispatcher, FailedUpload, FileError, RunReport, WorkCursor};
pub use resolve::{DEFAULT_CONTENT_TYPE, content_type, display_key, to_key};

use console::style;
use indicatif::ProgressBar;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::collect::{CollectError, collect_files};
use super::resolve::{content_type, display_key, to_key};
use crate::s3::{ObjectStore, StoreError};

/// Shared index into the file list
///
/// Every index below `total` is handed out by [`WorkCursor::claim`] exactly
/// once, no matter how many workers race on it.
#[derive(Debug)]
pub struct WorkCursor {
    next: AtomicUsize,
    total: usize,
}

impl WorkCursor {
    pub fn new(total: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            total,
        }
    }

    /// Claim the next unprocessed index, or `None` once the list is exhausted
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.total).then_some(index)
    }

    /// Number of indices handed out so far
    pub fn claimed(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.total)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Why a single file could not be uploaded
#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to read file: {0}")]
    Read(#[from] io::Error),

    #[error("path is not valid UTF-8 and has no object key")]
    InvalidKey,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub key: String,
    pub message: String,
}

#[derive(Debug)]
struct Stats {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    start_time: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }
}

/// Final outcome of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub total: usize,
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Failed uploads sorted by key
    pub failures: Vec<FailedUpload>,
}

impl RunReport {
    /// True when every file was uploaded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    pub fn print_summary(&self) {
        println!("\n{}", style("═".repeat(70)).dim());

        for failure in &self.failures {
            println!(
                "{} {} - {}",
                style("✗").red(),
                style(&failure.key).red(),
                style(&failure.message).red()
            );
        }

        let summary = format!(
            "Done. Succeeded: {}, Failed: {}, Duration: {:.2?}",
            self.succeeded, self.failed, self.elapsed
        );
        if self.is_success() {
            println!("{}", style(summary).green().bold());
        } else {
            println!("{}", style(summary).red().bold());
        }
    }
}

struct Shared {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
    files: Arc<[PathBuf]>,
    cursor: WorkCursor,
    stats: Stats,
    progress: ProgressBar,
    print_urls: bool,
}

/// Fans a file list out over a fixed pool of upload workers
pub struct Dispatcher {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
    concurrency: usize,
    progress: ProgressBar,
    print_urls: bool,
}

impl Dispatcher {
    /// Create a dispatcher for files under `root`
    ///
    /// A concurrency of zero is treated as one.
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            store,
            root: root.into(),
            concurrency: concurrency.max(1),
            progress: ProgressBar::hidden(),
            print_urls: false,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Echo each object's public URL after a successful upload
    pub fn with_public_urls(mut self, enabled: bool) -> Self {
        self.print_urls = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Scan the root directory and upload everything found
    ///
    /// # Errors
    ///
    /// Returns a [`CollectError`] when the root is unusable. No upload is
    /// attempted in that case.
    pub async fn upload_tree(&self) -> Result<RunReport, CollectError> {
        println!(
            "{}",
            style(format!("🔍 Scanning folder: {}", self.root.display())).cyan()
        );

        let files = collect_files(&self.root)?;

        println!(
            "{}",
            style(format!("📦 Found {} file(s)", files.len())).cyan().bold()
        );

        Ok(self.dispatch(files).await)
    }

    /// Upload `files` with `concurrency` workers
    ///
    /// Workers beyond the number of files would never claim anything, so at
    /// most `files.len()` (and at least one) are spawned. Per-file failures
    /// are counted and logged; they never stop the run.
    pub async fn dispatch(&self, files: Vec<PathBuf>) -> RunReport {
        let total = files.len();
        let pool_size = self.concurrency.min(total.max(1));
        info!("Uploading {} file(s) with {} workers", total, pool_size);

        self.progress.set_length(total as u64);

        let shared = Arc::new(Shared {
            store: Arc::clone(&self.store),
            root: self.root.clone(),
            files: files.into(),
            cursor: WorkCursor::new(total),
            stats: Stats::default(),
            progress: self.progress.clone(),
            print_urls: self.print_urls,
        });

        let (failure_tx, mut failure_rx) = mpsc::channel::<FailedUpload>(100);

        let mut workers = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            let shared = Arc::clone(&shared);
            let failure_tx = failure_tx.clone();
            workers.push(tokio::spawn(worker(id, shared, failure_tx)));
        }
        drop(failure_tx); // Workers hold the remaining senders

        let collector_handle = tokio::spawn(async move {
            let mut failures = Vec::new();
            while let Some(failure) = failure_rx.recv().await {
                failures.push(failure);
            }
            failures
        });

        for worker in workers {
            if let Err(e) = worker.await {
                debug!("Worker panic: {:?}", e);
                self.progress
                    .suspend(|| eprintln!("{} Worker panic: {}", style("✗").red(), e));
            }
        }

        let mut failures = collector_handle.await.unwrap_or_else(|e| {
            error!("Failure collector panic: {}", e);
            Vec::new()
        });
        failures.sort_by(|a, b| a.key.cmp(&b.key));

        self.progress.finish_and_clear();

        RunReport {
            total,
            claimed: shared.cursor.claimed(),
            succeeded: shared.stats.succeeded.load(Ordering::Relaxed),
            failed: shared.stats.failed.load(Ordering::Relaxed),
            elapsed: shared.stats.start_time.elapsed(),
            failures,
        }
    }
}

async fn worker(id: usize, shared: Arc<Shared>, failure_tx: mpsc::Sender<FailedUpload>) {
    let total = shared.cursor.total();

    while let Some(index) = shared.cursor.claim() {
        let path = &shared.files[index];

        let (key, result) = match to_key(&shared.root, path) {
            Some(key) => {
                let result = upload_file(shared.store.as_ref(), path, &key).await;
                (key, result)
            }
            None => (display_key(&shared.root, path), Err(FileError::InvalidKey)),
        };

        match result {
            Ok(()) => {
                let done = shared.stats.succeeded.fetch_add(1, Ordering::Relaxed) + 1;
                let url = shared.print_urls.then(|| shared.store.public_url(&key));

                shared.progress.suspend(|| {
                    println!(
                        "{}",
                        style(format!("[{}/{}] Uploaded: {}", done, total, key)).green()
                    );
                    if let Some(url) = &url {
                        println!("  {} {}", style("🔗").blue(), style(url).dim());
                    }
                });
            }
            Err(e) => {
                shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                let message = e.to_string();
                debug!("Upload failed for {}: {:?}", key, e);

                shared.progress.suspend(|| {
                    eprintln!(
                        "{}",
                        style(format!("Failed to upload {}: {}", key, message)).red()
                    );
                });

                let _ = failure_tx.send(FailedUpload { key, message }).await;
            }
        }

        shared.progress.inc(1);
    }

    debug!("Worker {} finished", id);
}

/// Read one file and hand it to the store
async fn upload_file(store: &dyn ObjectStore, path: &Path, key: &str) -> Result<(), FileError> {
    let body = tokio::fs::read(path).await?;
    let content_type = content_type(path);

    debug!("Uploading {} ({} bytes, {})", key, body.len(), content_type);

    store.put(key, body, content_type).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::MemoryStore;
    use crate::s3::error::Result as StoreResult;
    use async_trait::async_trait;
    use aws_sdk_s3::primitives::ByteStream;
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::sync::Mutex;

    fn write(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// Store that records how often each key was put
    #[derive(Default)]
    struct CountingStore {
        puts: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn put(&self, key: &str, _body: Vec<u8>, _ct: &str) -> StoreResult<()> {
            tokio::task::yield_now().await;
            *self.puts.lock().unwrap().entry(key.to_string()).or_default() += 1;
            Ok(())
        }

        async fn exists(&self, key: &str) -> StoreResult<bool> {
            Ok(self.puts.lock().unwrap().contains_key(key))
        }

        async fn get(&self, key: &str) -> StoreResult<ByteStream> {
            Err(StoreError::NotFound {
                key: key.to_string(),
            })
        }

        fn public_url(&self, key: &str) -> String {
            format!("counting://{}", key)
        }
    }

    #[test]
    fn test_cursor_claims_each_index_once() {
        let cursor = WorkCursor::new(3);
        assert_eq!(cursor.claim(), Some(0));
        assert_eq!(cursor.claim(), Some(1));
        assert_eq!(cursor.claim(), Some(2));
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claimed(), 3);
    }

    #[test]
    fn test_cursor_under_contention() {
        let cursor = Arc::new(WorkCursor::new(10_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cursor = Arc::clone(&cursor);
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(i) = cursor.claim() {
                        mine.push(i);
                    }
                    mine
                })
            })
            .collect();

        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        assert_eq!(all, (0..10_000).collect::<Vec<_>>());
        assert_eq!(cursor.claimed(), 10_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_example() {
        for concurrency in [1, 3] {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "a.png", b"\x89PNG");
            write(dir.path(), "sub/b.txt", b"hello");

            let store = Arc::new(MemoryStore::new());
            let dispatcher = Dispatcher::new(store.clone(), dir.path(), concurrency);
            let report = dispatcher.upload_tree().await.unwrap();

            assert_eq!(report.total, 2);
            assert_eq!(report.succeeded, 2);
            assert_eq!(report.failed, 0);
            assert!(report.is_success());

            let objects = store.objects();
            assert_eq!(objects.len(), 2);
            assert_eq!(objects["a.png"].content_type, "image/png");
            assert_eq!(objects["a.png"].body, b"\x89PNG");
            assert_eq!(objects["sub/b.txt"].content_type, "text/plain");
            assert_eq!(objects["sub/b.txt"].body, b"hello");
            assert_eq!(store.put_count(), 2);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_file_uploaded_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut expected = HashSet::new();
        for i in 0..60 {
            let relative = format!("d{}/f{}.bin", i % 7, i);
            write(dir.path(), &relative, &[i as u8]);
            expected.insert(relative);
        }

        for concurrency in [1, 2, 5, 16, 100] {
            let store = Arc::new(CountingStore::default());
            let report = Dispatcher::new(store.clone(), dir.path(), concurrency)
                .upload_tree()
                .await
                .unwrap();

            assert_eq!(report.claimed, 60);
            assert_eq!(report.succeeded, 60);

            let puts = store.puts.lock().unwrap();
            assert_eq!(puts.keys().cloned().collect::<HashSet<_>>(), expected);
            assert!(puts.values().all(|&count| count == 1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one.txt", "two.txt", "bad/three.txt", "four.json", "five.css"] {
            write(dir.path(), name, name.as_bytes());
        }

        let store = Arc::new(MemoryStore::new().failing_on(["bad/three.txt"]));
        let report = Dispatcher::new(store.clone(), dir.path(), 3)
            .upload_tree()
            .await
            .unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded + report.failed, report.total);
        assert!(!report.is_success());

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "bad/three.txt");
        assert!(report.failures[0].message.contains("InternalError"));

        let objects = store.objects();
        assert_eq!(objects.len(), 4);
        assert!(!objects.contains_key("bad/three.txt"));
    }

    #[tokio::test]
    async fn test_read_failure_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let present = write(dir.path(), "present.txt", b"ok");
        let vanished = dir.path().join("vanished.txt");

        let store = Arc::new(MemoryStore::new());
        let report = Dispatcher::new(store.clone(), dir.path(), 2)
            .dispatch(vec![vanished, present])
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].key, "vanished.txt");
        assert!(report.failures[0].message.starts_with("failed to read file"));
        // The store never saw the unreadable file
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", b"<html></html>");
        write(dir.path(), "js/app.js", b"console.log(1)");
        write(dir.path(), "img/logo.svg", b"<svg/>");

        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(store.clone(), dir.path(), 2);

        dispatcher.upload_tree().await.unwrap();
        let first = store.objects();
        dispatcher.upload_tree().await.unwrap();
        let second = store.objects();

        assert_eq!(first, second);
        assert_eq!(store.put_count(), 6);
        assert_eq!(second["js/app.js"].content_type, "application/javascript");
    }

    #[tokio::test]
    async fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();

        let store = Arc::new(MemoryStore::new());
        let report = Dispatcher::new(store.clone(), dir.path(), 4)
            .upload_tree()
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(report.claimed, 0);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert!(report.is_success());
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_root_aborts_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "not_a_dir.txt", b"x");

        let store = Arc::new(MemoryStore::new());
        let missing = Dispatcher::new(store.clone(), dir.path().join("missing"), 2)
            .upload_tree()
            .await;
        assert!(matches!(missing, Err(CollectError::NotFound { .. })));

        let not_dir = Dispatcher::new(store.clone(), file, 2).upload_tree().await;
        assert!(matches!(not_dir, Err(CollectError::NotADirectory { .. })));

        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn test_concurrency_floor() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(Dispatcher::new(store.clone(), "/tmp", 0).concurrency(), 1);
        assert_eq!(Dispatcher::new(store, "/tmp", 7).concurrency(), 7);
    }

    #[tokio::test]
    async fn test_huge_concurrency_spawns_bounded_pool() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c/d.txt"] {
            write(dir.path(), name, name.as_bytes());
        }

        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(store.clone(), dir.path(), usize::MAX);
        assert_eq!(dispatcher.concurrency(), usize::MAX);

        let report = dispatcher.upload_tree().await.unwrap();
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.claimed, 3);
        assert_eq!(store.objects().len(), 3);

        let empty = tempfile::tempdir().unwrap();
        let report = Dispatcher::new(store, empty.path(), usize::MAX)
            .upload_tree()
            .await
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(report.is_success());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_non_utf8_names_fail_instead_of_colliding() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"\xff.txt")), b"ff").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"\xfe.txt")), b"fe").unwrap();
        write(dir.path(), "plain.txt", b"plain");

        let store = Arc::new(MemoryStore::new());
        let report = Dispatcher::new(store.clone(), dir.path(), 1)
            .upload_tree()
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert!(!report.is_success());
        assert!(
            report
                .failures
                .iter()
                .all(|f| f.message.contains("not valid UTF-8"))
        );

        let objects = store.objects();
        assert_eq!(objects.keys().collect::<Vec<_>>(), vec!["plain.txt"]);
        // Nothing without a faithful key reached the store
        assert_eq!(store.put_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subdirectory_aborts_before_upload() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.txt", b"ok");
        let locked = dir.path().join("locked");
        write(dir.path(), "locked/secret.txt", b"secret");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still read the directory
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = Arc::new(MemoryStore::new());
        let result = Dispatcher::new(store.clone(), dir.path(), 2)
            .upload_tree()
            .await;

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(CollectError::Walk { .. })));
        assert_eq!(store.put_count(), 0);
    }
}

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Fatal errors raised before any upload starts
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Root directory not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Root is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("Failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to scan {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Collect every regular file under `root`, depth first
///
/// Symlinks are not followed, and symlinks, sockets, devices and fifos are
/// skipped. Any unreadable directory aborts the whole scan.
///
/// # Errors
///
/// Returns [`CollectError::NotFound`] or [`CollectError::NotADirectory`] when
/// the root is unusable, and [`CollectError::Walk`] when the tree cannot be
/// read completely.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, CollectError> {
    let metadata = fs::metadata(root).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => CollectError::NotFound {
            path: root.to_path_buf(),
        },
        _ => CollectError::Io {
            path: root.to_path_buf(),
            source,
        },
    })?;

    if !metadata.is_dir() {
        return Err(CollectError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| {
            let path = source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            CollectError::Walk { path, source }
        })?;

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

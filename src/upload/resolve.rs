use std::path::{Component, Path};

/// Content type used when the extension is missing or unknown
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Build the storage key for `path` relative to `root`
///
/// Path components are joined with `/` regardless of the platform
/// separator. A path outside `root` keeps its own normal components.
///
/// Returns `None` when any component is not valid UTF-8. A lossy
/// conversion would map distinct names onto the same key.
pub fn to_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let segments = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    Some(segments.join("/"))
}

/// Relative path for log lines, including paths that have no key
pub fn display_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Detect Content-Type based on file extension
///
/// The extension is matched case-insensitively. Falls back to
/// "application/octet-stream" for unknown types.
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        // Image formats
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/x-icon",
        Some("avif") => "image/avif",
        Some("tif") | Some("tiff") => "image/tiff",

        // Video formats
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("m4v") => "video/x-m4v",

        // Audio formats
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",

        // Document formats
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",

        // Text formats
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("md") => "text/markdown",

        // Scripts and data
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("map") => "application/json",
        Some("xml") => "application/xml",
        Some("wasm") => "application/wasm",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        // Archive formats
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",

        _ => DEFAULT_CONTENT_TYPE,
    }
}

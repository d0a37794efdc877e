use std::path::Path;

/// Content types by lower-case file suffix.
const SUFFIX_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("xml", "text/xml"),
    ("xhtml", "application/xhtml+xml"),
    ("txt", "text/plain"),
    ("rtf", "application/rtf"),
    ("pdf", "application/pdf"),
    ("word", "application/msword"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("au", "audio/basic"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("avi", "video/x-msvideo"),
    ("gz", "application/x-gzip"),
    ("tar", "application/x-tar"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("svg", "image/svg+xml"),
];

/// Fallback for unknown or missing suffixes.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type for `path`, derived from its extension.
pub fn content_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return OCTET_STREAM;
    };

    SUFFIX_TYPES
        .iter()
        .find(|(suffix, _)| suffix.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

use std::path::Path;
use uuid::Uuid;

const MAX_FILENAME_BYTES: usize = 200;
const FALLBACK_FILENAME: &str = "file";

/// Reduce a client supplied filename to a single safe path component.
///
/// Directory parts are dropped and reserved characters replaced, so the
/// result can be embedded in a storage key or a Content-Disposition header.
pub fn sanitize_filename(filename: &str) -> String {
    // Clients on Windows may send backslash separated paths
    let last = filename.rsplit(['/', '\\']).next().unwrap_or("");

    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from uploaded filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = sanitized.trim();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return FALLBACK_FILENAME.to_string();
    }

    // Limit length safely for UTF-8
    if sanitized.len() > MAX_FILENAME_BYTES {
        let mut end = MAX_FILENAME_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized.to_string()
    }
}

/// Storage key for a new upload: `{random}_{filename}`
pub fn generate_storage_key(filename: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(filename))
}

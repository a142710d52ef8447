//! Object key derivation.
//!
//! Keys have the shape `{folder}/{name}.{ext}`. The extension comes from the
//! original filename when it carries one, then from the content type, then
//! falls back to `bin`. Without a caller-supplied name a random UUID is used.

use uuid::Uuid;

pub const DEFAULT_FOLDER: &str = "uploads";
pub const FALLBACK_EXTENSION: &str = "bin";

const MAX_EXTENSION_LEN: usize = 5;

/// Known MIME types and the extension stored objects of that type receive.
const CONTENT_TYPE_EXTENSIONS: [(&str, &str); 11] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/avif", "avif"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("application/pdf", "pdf"),
];

/// Build the storage key for an upload.
///
/// `name` is used as-is apart from a trailing extension, which is dropped so
/// the resolved extension is not doubled. No character validation happens
/// here; folder and name may contain arbitrary path-like segments.
pub fn derive_key(
    folder: Option<&str>,
    name: Option<&str>,
    filename: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let folder = folder.filter(|f| !f.is_empty()).unwrap_or(DEFAULT_FOLDER);
    let ext = resolve_extension(filename, content_type);
    let name = match name.filter(|n| !n.is_empty()) {
        Some(supplied) => strip_extension(supplied).to_string(),
        None => Uuid::new_v4().to_string(),
    };
    format!("{}/{}.{}", folder, name, ext)
}

/// Pick the extension for a stored object, lower-cased.
pub fn resolve_extension(filename: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(ext) = filename.and_then(trailing_extension) {
        return ext.to_ascii_lowercase();
    }
    content_type
        .and_then(extension_for_content_type)
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}

/// Look up the extension for a MIME type. Parameters such as `; charset=`
/// are ignored and the comparison is case-insensitive.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Whether `filename` ends in something `resolve_extension` would use.
pub fn has_extension(filename: &str) -> bool {
    trailing_extension(filename).is_some()
}

fn trailing_extension(filename: &str) -> Option<&str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.bytes().all(|b| b.is_ascii_alphanumeric());
    valid.then_some(ext)
}

fn strip_extension(name: &str) -> &str {
    match trailing_extension(name) {
        Some(ext) => {
            let stem = &name[..name.len() - ext.len() - 1];
            if stem.is_empty() { name } else { stem }
        }
        None => name,
    }
}

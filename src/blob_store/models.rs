/// Blob storage data models
///
/// The stored filename is the only persisted record of a blob:
/// `<id>__<original name>`. Everything here is about building and
/// taking apart that name.
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::fs::File;
use uuid::Uuid;

/// Separator between the id and the original filename on disk
pub const NAME_DELIMITER: &str = "__";

/// Name used when the client supplies nothing usable
pub const FALLBACK_FILENAME: &str = "file";

/// Longest original filename kept, in bytes. Leaves room for the id and
/// delimiter under the usual 255-byte filesystem limit.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Unique blob identifier, a random v4 UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Generate a fresh id from the OS random source
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// On-disk filename split into its id and original name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredName {
    pub id: String,
    pub original_name: String,
}

impl StoredName {
    /// Compose a stored name from a fresh id and an already sanitized filename
    pub fn new(id: BlobId, original_name: String) -> Self {
        Self {
            id: id.to_string(),
            original_name,
        }
    }

    /// Parse a directory entry name on the first delimiter.
    ///
    /// Names without a delimiter (files not written by this store) map to
    /// the full name for both id and original name.
    pub fn parse(file_name: &str) -> Self {
        match file_name.find(NAME_DELIMITER) {
            Some(idx) if idx > 0 => Self {
                id: file_name[..idx].to_string(),
                original_name: file_name[idx + NAME_DELIMITER.len()..].to_string(),
            },
            _ => Self {
                id: file_name.to_string(),
                original_name: file_name.to_string(),
            },
        }
    }

    /// Filename prefix that every stored name for `id` starts with
    pub fn lookup_prefix(id: &str) -> String {
        format!("{}{}", id, NAME_DELIMITER)
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.id, NAME_DELIMITER, self.original_name)
    }
}

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts and `.`/`..` segments are dropped, the last real
/// segment is kept, control characters are removed and the result is
/// capped at [`MAX_FILENAME_BYTES`].
pub fn sanitize_filename(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let last = normalized
        .split('/')
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .last()
        .unwrap_or("");

    let mut cleaned: String = last.chars().filter(|c| !c.is_control()).collect();

    if cleaned.len() > MAX_FILENAME_BYTES {
        let mut cut = MAX_FILENAME_BYTES;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
    }

    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Whether `id` could possibly match a stored name.
///
/// Rejects ids that would turn the prefix scan into something other than
/// an exact id match.
pub fn is_lookup_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains(NAME_DELIMITER)
}

/// One listed blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub id: String,
    pub filename: String,
}

impl From<StoredName> for BlobEntry {
    fn from(name: StoredName) -> Self {
        Self {
            id: name.id,
            filename: name.original_name,
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
    pub id: String,
    pub filename: String,
}

/// An opened blob ready to be read
#[derive(Debug)]
pub struct BlobContent {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub file: File,
}

/// Wire representation of a blob: `{id, filename, url}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobResponse {
    pub id: String,
    pub filename: String,
    pub url: String,
}

impl BlobResponse {
    /// Build the response with a URL pointing at the fetch route
    pub fn new(id: String, filename: String, public_url: &str) -> Self {
        let url = blob_url(public_url, &id);
        Self { id, filename, url }
    }
}

/// URL under which a blob is served
pub fn blob_url(public_url: &str, id: &str) -> String {
    format!("{}/files/{}", public_url, urlencoding::encode(id))
}

//! File validation: byte-signature content checks and upload metadata checks.
//!
//! Content validation reads the first bytes of an assembled file and compares
//! them against a fixed table of known media-type signatures. A file passes
//! when a signature for the declared type matches, or when a signature for
//! any type in the same top-level category (the part before `/`) matches, so
//! a JPEG declared as `image/png` is still accepted as an image while a video
//! declared as an image is not.
//!
//! Metadata validation runs at initiation and checks the declared size,
//! media type, digest format, and filename extension before any byte is
//! accepted.

use crate::config::UploadConfig;
use crate::error::Result;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// How many leading bytes participate in signature matching
const SIGNATURE_WINDOW: usize = 32;

/// One entry of the signature table
struct Signature {
    media_type: &'static str,
    /// Byte offset at which the signature starts
    offset: usize,
    /// Lower-cased hex signature
    hex: &'static str,
}

/// Known media-type byte signatures
const SIGNATURES: &[Signature] = &[
    Signature { media_type: "image/jpeg", offset: 0, hex: "ffd8ff" },
    Signature { media_type: "image/png", offset: 0, hex: "89504e47" },
    Signature { media_type: "image/gif", offset: 0, hex: "474946383761" },
    Signature { media_type: "image/gif", offset: 0, hex: "474946383961" },
    Signature { media_type: "image/webp", offset: 8, hex: "57454250" },
    Signature { media_type: "video/mp4", offset: 4, hex: "6674797069736f6d" },
    Signature { media_type: "video/mp4", offset: 4, hex: "66747970" },
    Signature { media_type: "video/quicktime", offset: 4, hex: "6674797071742020" },
    Signature { media_type: "video/quicktime", offset: 4, hex: "6d6f6f76" },
    Signature { media_type: "video/x-msvideo", offset: 0, hex: "52494646" },
    Signature { media_type: "video/x-msvideo", offset: 8, hex: "415649204c495354" },
    Signature { media_type: "video/mpeg", offset: 0, hex: "000001ba" },
    Signature { media_type: "video/mpeg", offset: 0, hex: "000001b3" },
];

/// Outcome of a content check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentCheck {
    /// Signature matches the declared type or its category
    Ok,
    /// Some signature matched, but its category differs from the declared one
    Mismatch {
        /// The media type whose signature matched
        detected: &'static str,
    },
    /// No known signature matched
    UndetectedType,
}

/// Top-level category of a media type (`image/jpeg` -> `image`)
fn category(media_type: &str) -> &str {
    media_type.split('/').next().unwrap_or(media_type)
}

/// Match a single table entry against the file's leading hex
fn entry_matches(sig: &Signature, file_hex: &str) -> bool {
    let start = sig.offset * 2;
    let end = start + sig.hex.len();
    end <= file_hex.len() && &file_hex[start..end] == sig.hex
}

/// Validate the byte prefix of `path` against the declared media type.
///
/// Reads at most the first 32 bytes of the file.
pub async fn validate_content(path: &Path, declared_type: &str) -> Result<ContentCheck> {
    let mut file = fs::File::open(path).await?;
    let mut buf = [0u8; SIGNATURE_WINDOW];
    let mut filled = 0;

    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(check_prefix(&buf[..filled], declared_type))
}

/// Signature check on an in-memory prefix; split out for direct testing.
pub fn check_prefix(prefix: &[u8], declared_type: &str) -> ContentCheck {
    let file_hex = hex::encode(prefix);
    let declared_category = category(declared_type);

    let mut detected: Option<&'static str> = None;

    for sig in SIGNATURES {
        if !entry_matches(sig, &file_hex) {
            continue;
        }
        if sig.media_type == declared_type || category(sig.media_type) == declared_category {
            return ContentCheck::Ok;
        }
        detected.get_or_insert(sig.media_type);
    }

    match detected {
        Some(detected) => ContentCheck::Mismatch { detected },
        None => ContentCheck::UndetectedType,
    }
}

/// Filename extensions accepted for each declared media type
pub fn allowed_extensions(media_type: &str) -> &'static [&'static str] {
    match media_type {
        "image/jpeg" => &["jpg", "jpeg", "jpe"],
        "image/png" => &["png"],
        "image/gif" => &["gif"],
        "image/webp" => &["webp"],
        "video/mp4" => &["mp4", "m4v"],
        "video/quicktime" => &["mov", "qt"],
        "video/x-msvideo" => &["avi"],
        "video/mpeg" => &["mpg", "mpeg"],
        _ => &[],
    }
}

/// Lower-cased extension of a filename (characters after the last `.`)
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Validate upload metadata at initiation.
///
/// Returns a list of human-readable errors; empty means the metadata is
/// acceptable.
pub fn validate_metadata(
    filename: &str,
    media_type: &str,
    file_size: u64,
    md5_hex: &str,
    config: &UploadConfig,
) -> Vec<String> {
    let mut errors = Vec::new();

    if file_size == 0 {
        errors.push("fileSize must be greater than 0".to_string());
    } else if file_size > config.max_file_size {
        errors.push(format!(
            "fileSize {} exceeds the maximum allowed size {}",
            file_size, config.max_file_size
        ));
    }

    if !config.is_allowed_type(media_type) {
        errors.push(format!("mimeType '{}' is not allowed", media_type));
    } else {
        let allowed = allowed_extensions(media_type);
        match file_extension(filename) {
            Some(ext) if allowed.contains(&ext.as_str()) => {}
            Some(ext) => errors.push(format!(
                "extension '.{}' does not match mimeType '{}'",
                ext, media_type
            )),
            None => errors.push(format!(
                "filename '{}' has no extension to match against mimeType '{}'",
                filename, media_type
            )),
        }
    }

    if md5_hex.len() != 32 || !md5_hex.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.push("md5Hash must be a 32-character hex string".to_string());
    }

    errors
}

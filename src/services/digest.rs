//! Streaming MD5 digest computation and verification.
//!
//! The MD5 algorithm (RFC 1321) is required for wire compatibility with
//! existing uploader clients, which declare the digest of every file at
//! initiation. It is not used as a security property.

use crate::error::Result;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Read buffer size for digest streaming
const READ_BUF_SIZE: usize = 64 * 1024;

/// Compute the lower-cased hex MD5 digest of a file, streaming it in
/// fixed-size reads.
pub async fn md5_hex(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Verify a file against an expected hex digest, case-insensitively.
pub async fn verify(path: &Path, expected_hex: &str) -> Result<bool> {
    let actual = md5_hex(path).await?;
    Ok(actual.eq_ignore_ascii_case(expected_hex))
}

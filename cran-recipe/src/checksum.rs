//! Source archive location and SHA-256 checksums

use std::io::Read;

use cran_db::Fetch;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::Result;

/// Tarball URL for `package` at `version` under `mirror`.
pub fn source_url(mirror: &str, package: &str, version: &str) -> String {
    format!(
        "{}/{}_{}.tar.gz",
        mirror.trim_end_matches('/'),
        package,
        version
    )
}

/// Compute the SHA256 hash of everything `reader` yields
pub fn sha256_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 65536]; // 64KB buffer
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Download a source archive and hash its body.
pub fn fetch_source_sha256<F: Fetch + ?Sized>(fetcher: &F, url: &str) -> Result<String> {
    info!("Fetching source archive {}", url);
    let body = fetcher.open(url)?;
    Ok(sha256_reader(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cran_db::MemoryFetcher;

    #[test]
    fn test_sha256_reader() {
        let hash = sha256_reader(&b"hello world"[..]).unwrap();
        // Known SHA256 hash of "hello world"
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_spans_buffer_boundary() {
        let data = vec![0xABu8; 65536 * 2 + 17];
        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(sha256_reader(data.as_slice()).unwrap(), expected);
    }

    #[test]
    fn test_source_url() {
        assert_eq!(
            source_url("https://cran.r-project.org/src/contrib", "R6", "2.5.1"),
            "https://cran.r-project.org/src/contrib/R6_2.5.1.tar.gz"
        );
        assert_eq!(
            source_url("https://mirror.example/src/contrib/", "cli", "3.6.3"),
            "https://mirror.example/src/contrib/cli_3.6.3.tar.gz"
        );
    }

    #[test]
    fn test_fetch_source_sha256() {
        let archive = b"\x1f\x8b fake tarball bytes".to_vec();
        let expected = format!("{:x}", Sha256::digest(&archive));
        let fetcher = MemoryFetcher::new().with("https://example.org/x_1.0.tar.gz", archive);

        let hash = fetch_source_sha256(&fetcher, "https://example.org/x_1.0.tar.gz").unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_fetch_source_missing() {
        let fetcher = MemoryFetcher::new();
        assert!(fetch_source_sha256(&fetcher, "https://example.org/none.tar.gz").is_err());
    }
}

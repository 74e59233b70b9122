//! cran-db: CRAN package database access
//!
//! This crate provides:
//! - Fetching the package database into a temporary file
//! - Decoding R serialization (`packages.rds`) and DCF (`PACKAGES`) files
//! - Table access and package record lookup

pub mod dcf;
pub mod error;
pub mod fetch;
pub mod rds;
pub mod record;
pub mod table;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use fetch::{download_to_tempfile, Fetch, HttpFetcher, MemoryFetcher};
pub use record::PackageRecord;
pub use table::{DatabaseFormat, Table};

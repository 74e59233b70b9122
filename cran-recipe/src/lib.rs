//! cran-recipe: Spack recipe stubs for CRAN packages
//!
//! This crate provides:
//! - Source archive checksums
//! - Dependency field parsing and `depends_on` rendering
//! - Recipe rendering (body or full `package.py`)
//! - Version lines carried over from an existing `package.py`
//! - The end-to-end lookup pipeline used by the CLI

pub mod checksum;
pub mod deps;
pub mod error;
pub mod existing;
pub mod pipeline;
pub mod recipe;

pub use error::{Error, Result};
pub use existing::PreviousVersion;
pub use pipeline::{generate, package_name, Options};
pub use recipe::Recipe;

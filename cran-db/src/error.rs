use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RDS decode error: {0}")]
    Decode(String),

    #[error("Unsupported serialization format: {0}")]
    UnsupportedFormat(String),

    #[error("DCF parse error on line {line}: {message}")]
    Dcf { line: usize, message: String },

    #[error("Object is not a table: {0}")]
    NotATable(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Missing field {field} for package {package}")]
    MissingField { package: String, field: String },
}

pub type Result<T> = std::result::Result<T, Error>;

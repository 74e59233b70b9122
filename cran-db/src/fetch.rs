//! Remote access for the package database and source archives

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};

use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{Error, Result};

/// Default location of the CRAN package database
pub const DEFAULT_DATABASE_URL: &str = "https://cran.r-project.org/web/packages/packages.rds";

/// Default base URL for source tarballs
pub const DEFAULT_MIRROR: &str = "https://cran.r-project.org/src/contrib";

/// Anything that can hand out the body of a URL as a stream.
pub trait Fetch {
    /// Open `url` for reading. Non-success responses are errors.
    fn open(&self, url: &str) -> Result<Box<dyn Read + '_>>;
}

/// Blocking HTTP client (redirects are followed)
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cran-recipe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read + '_>> {
        debug!("GET {}", url);
        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(Box::new(response))
    }
}

/// In-memory fetcher serving fixed bodies, for tests.
///
/// Unknown URLs answer with a 404.
#[derive(Debug, Default, Clone)]
pub struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }
}

impl Fetch for MemoryFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read + '_>> {
        match self.bodies.get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.as_slice()))),
            None => Err(Error::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Download `url` into a fresh temporary file.
///
/// The file is removed when the returned handle is dropped.
pub fn download_to_tempfile<F: Fetch + ?Sized>(fetcher: &F, url: &str) -> Result<NamedTempFile> {
    info!("Downloading package database from {}", url);
    let mut body = fetcher.open(url)?;
    let mut file = NamedTempFile::new()?;
    let written = io::copy(&mut body, &mut file)?;
    file.flush()?;
    debug!("Wrote {} bytes to {:?}", written, file.path());
    Ok(file)
}

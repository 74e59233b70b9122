//! Lookup, checksum and render for a single package

use std::io::{BufRead, Write};

use cran_db::fetch::DEFAULT_MIRROR;
use cran_db::{Fetch, PackageRecord, Table};
use tracing::info;

use crate::checksum::{fetch_source_sha256, source_url};
use crate::existing::PreviousVersion;
use crate::recipe::Recipe;
use crate::{Error, Result};

const PROMPT: &str = "Please enter package name: ";

#[derive(Debug, Clone)]
pub struct Options {
    /// Base URL the source tarballs live under
    pub mirror: String,
    /// Emit `Depends` entries ahead of `Imports`
    pub include_depends: bool,
    /// `version()` lines of an existing recipe to carry over
    pub previous_versions: Vec<PreviousVersion>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
            include_depends: false,
            previous_versions: Vec::new(),
        }
    }
}

/// The package to look up: `arg` when given, else one line read from
/// `input` after writing a prompt to `prompt`.
pub fn package_name<R: BufRead, W: Write>(
    arg: Option<String>,
    mut input: R,
    mut prompt: W,
) -> Result<String> {
    let name = match arg {
        Some(name) => name,
        None => {
            prompt.write_all(PROMPT.as_bytes())?;
            prompt.flush()?;

            let mut line = String::new();
            input.read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if name.is_empty() {
        return Err(Error::EmptyPackageName);
    }
    Ok(name)
}

/// Build the recipe for `package` out of a loaded database.
///
/// Nothing is rendered until every stage has succeeded.
pub fn generate<F: Fetch + ?Sized>(
    fetcher: &F,
    table: &Table,
    package: &str,
    options: &Options,
) -> Result<Recipe> {
    let record = PackageRecord::lookup(table, package)?;
    info!("Found {} {}", record.name, record.version);

    let url = source_url(&options.mirror, &record.name, &record.version);
    let sha256 = fetch_source_sha256(fetcher, &url)?;

    Ok(Recipe::from_record(&record, sha256, options.include_depends)?
        .with_previous_versions(options.previous_versions.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cran_db::{dcf, MemoryFetcher};
    use sha2::{Digest, Sha256};

    const PACKAGES: &str = "\
Package: R6
Title: Encapsulated Classes with Reference Semantics
Description: Creates classes with reference semantics.
Version: 2.5.1
URL: https://r6.r-lib.org, https://github.com/r-lib/R6

Package: tidyr
Title: Tidy Messy Data
Description: Tools to help to create tidy data.
Version: 1.3.1
Imports: R6, methods, data.table
";

    const MIRROR: &str = "https://cran.example/src/contrib";

    fn options() -> Options {
        Options {
            mirror: MIRROR.to_string(),
            ..Options::default()
        }
    }

    fn fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with(format!("{}/R6_2.5.1.tar.gz", MIRROR), b"r6 archive".to_vec())
            .with(format!("{}/tidyr_1.3.1.tar.gz", MIRROR), b"tidyr archive".to_vec())
    }

    #[test]
    fn test_generate_with_homepage() {
        let table = dcf::parse(PACKAGES).unwrap();
        let recipe = generate(&fetcher(), &table, "R6", &options()).unwrap();
        let body = recipe.render_body();

        assert!(body.contains("\ncran = \"R6\"\n"));
        assert!(body.contains("homepage = \"https://r6.r-lib.org, https://github.com/r-lib/R6\"\n"));
        assert_eq!(
            recipe.sha256,
            format!("{:x}", Sha256::digest(b"r6 archive"))
        );
        assert!(!body.contains("depends_on"));
    }

    #[test]
    fn test_generate_with_dependencies() {
        let table = dcf::parse(PACKAGES).unwrap();
        let body = generate(&fetcher(), &table, "tidyr", &options())
            .unwrap()
            .render_body();

        assert!(!body.contains("homepage"));
        let deps: Vec<&str> = body.lines().filter(|l| l.starts_with("depends_on(\"")).collect();
        assert_eq!(deps.len(), 3);
        assert!(deps[0].contains("\"r-r6\""));
        assert!(deps[1].contains("\"r-methods\""));
        assert!(deps[2].contains("\"r-data-table\""));
        assert!(deps.iter().all(|l| l.ends_with("type=(\"build\", \"run\"))")));
    }

    #[test]
    fn test_generate_unknown_package() {
        let table = dcf::parse(PACKAGES).unwrap();
        let err = generate(&fetcher(), &table, "ggplot2", &options()).unwrap_err();
        assert!(matches!(
            err,
            Error::Db(cran_db::Error::PackageNotFound(ref name)) if name == "ggplot2"
        ));
    }

    #[test]
    fn test_generate_missing_archive() {
        let table = dcf::parse(PACKAGES).unwrap();
        let err = generate(&MemoryFetcher::new(), &table, "R6", &options()).unwrap_err();
        assert!(matches!(
            err,
            Error::Db(cran_db::Error::HttpStatus { status: 404, .. })
        ));
    }

    #[test]
    fn test_generate_carries_previous_versions() {
        let table = dcf::parse(PACKAGES).unwrap();
        let options = Options {
            previous_versions: crate::existing::parse(
                "    version(\"2.5.1\", sha256=\"stale\")\n    version(\"2.5.0\", sha256=\"aa\")\n",
            )
            .unwrap(),
            ..options()
        };
        let body = generate(&fetcher(), &table, "R6", &options)
            .unwrap()
            .render_body();

        let versions: Vec<&str> = body.lines().filter(|l| l.starts_with("version(")).collect();
        assert_eq!(versions.len(), 2);
        assert!(!versions[0].contains("stale"));
        assert_eq!(versions[1], "version(\"2.5.0\", sha256=\"aa\")");
    }

    #[test]
    fn test_package_name_from_argument() {
        let mut prompt = Vec::new();
        let name = package_name(Some("cli".to_string()), &b""[..], &mut prompt).unwrap();
        assert_eq!(name, "cli");
        assert!(prompt.is_empty());
    }

    #[test]
    fn test_package_name_prompted() {
        let mut prompt = Vec::new();
        let name = package_name(None, &b"cli\r\n"[..], &mut prompt).unwrap();
        assert_eq!(name, "cli");
        assert_eq!(prompt, PROMPT.as_bytes());

        let name = package_name(None, &b"data.table"[..], Vec::new()).unwrap();
        assert_eq!(name, "data.table");
    }

    #[test]
    fn test_empty_package_name_rejected() {
        let err = package_name(None, &b"\n"[..], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyPackageName));

        let err = package_name(None, &b""[..], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyPackageName));

        let err = package_name(Some(String::new()), &b""[..], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyPackageName));
    }
}

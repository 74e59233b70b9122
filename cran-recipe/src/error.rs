use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] cran_db::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dependency: {0:?}")]
    MalformedDependency(String),

    #[error("Malformed recipe: {0}")]
    MalformedRecipe(String),

    #[error("No package name given")]
    EmptyPackageName,
}

pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Error type for the flashcard-pkg library
#[derive(Error, Debug)]
pub enum Error {
    /// Lifecycle misuse: opening an open package or closing a closed one.
    #[error("invalid package state: {0}")]
    InvalidState(String),
    #[error("package {} is corrupt: {source}", .path.display())]
    ContainerCorrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("package entry {0:?} resolves outside the scratch directory")]
    PathEscape(String),
    #[error("cannot read asset {}: {source}", .path.display())]
    MissingAsset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset {} is not valid UTF-8", .path.display())]
    InvalidAsset {
        path: PathBuf,
        #[source]
        source: FromUtf8Error,
    },
    #[error("unsupported note type kind: {0:?} (expected \"normal\" or \"cloze\")")]
    UnsupportedModelKind(String),
    #[error("unsupported field format: {0:?} (expected \"text\" or \"markdown\")")]
    UnsupportedFieldFormat(String),
    #[error(transparent)]
    StorageFault(#[from] DatabaseError),
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Wrapper for errors from the embedded SQLite databases
#[derive(Error, Debug)]
#[error("database error: {0}")]
pub struct DatabaseError(#[from] pub rusqlite::Error);

#[derive(Error, Debug)]
#[error("json error: {0}")]
pub struct JsonError(#[from] pub serde_json::Error);

pub(crate) fn database_error(e: rusqlite::Error) -> Error {
    Error::StorageFault(DatabaseError(e))
}

pub(crate) fn json_error(e: serde_json::Error) -> Error {
    Error::Json(JsonError(e))
}

pub(crate) fn zip_error(path: impl Into<PathBuf>) -> impl FnOnce(zip::result::ZipError) -> Error {
    let path = path.into();
    move |source| Error::ContainerCorrupt { path, source }
}

pub(crate) fn asset_error(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.into();
    move |source| Error::MissingAsset { path, source }
}

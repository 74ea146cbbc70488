//! Error types for guten operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while opening, editing or packaging a project.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Missing required element: {0}")]
    MissingElement(String),

    #[error("Manifest id already in use: {0}")]
    DuplicateId(String),

    #[error("Manifest href already in use: {0}")]
    DuplicateHref(String),

    #[error("No manifest item with id or href '{0}'")]
    ItemNotFound(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Spine is empty")]
    EmptySpine,

    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Navigation document already exists: {0}")]
    NavExists(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Package store: on-disk registry of uploaded handler-logic packages.

mod store;

pub use store::{PackageInfo, PackageStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("invalid package name: {0:?}")]
    InvalidPackageName(String),

    #[error("package archive is corrupt: {0}")]
    PackageCorrupt(String),

    #[error("archive entry escapes the package directory: {0}")]
    UnsafePackagePath(String),

    #[error("package exceeds the unpacked size limit of {0} bytes")]
    PackageTooLarge(u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PackageError>;

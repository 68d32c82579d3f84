// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Library for building and parsing Rockbox tagcache databases (schema version 4.0).
//!
//! The tagcache is the on-disk database that the Rockbox firmware uses to browse a music
//! collection by tag. It consists of a master index file with one fixed-size entry per track and
//! one tag file per string-valued column holding the deduplicated tag strings, which entries
//! reference by file offset.
//!
//! The format has been documented by the Rockbox project:
//!
//! - <https://www.rockbox.org/wiki/TagcacheDBFormat>
//! - <https://www.rockbox.org/wiki/DataBase>
//!
//! This crate contains the low-level codec for the individual files ([`tagcache`]), an in-memory
//! model with directory-level read/write operations ([`database`]), a parallel indexer that
//! synthesizes a database from a directory of audio files ([`indexer`]), the metadata adapter it
//! uses ([`metadata`]), and best-effort migration of runtime statistics between database
//! generations ([`migrate`]).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod database;
pub mod indexer;
pub mod metadata;
pub mod migrate;
pub mod tagcache;
mod util;

use crate::tagcache::Tag;
use std::path::PathBuf;

/// The error type used by this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A read ran past the end of the data.
    #[error("unexpected end of data")]
    Truncated,
    /// A file did not start with the expected signature.
    #[error("bad file signature")]
    BadMagic,
    /// The database declares a schema version this crate does not support.
    #[error("unsupported schema version {0} (expected {expected})", expected = tagcache::SCHEMA_VERSION)]
    UnsupportedVersion(u32),
    /// A master index entry references an offset that is not a tag string header.
    #[error("entry references invalid {tag} string at offset {offset:#010x}")]
    BrokenRef {
        /// The string tag whose tag file was referenced.
        tag: Tag,
        /// The offset that did not resolve to a tag string header.
        offset: u32,
    },
    /// Reading metadata from a single audio file failed. Non-fatal during indexing: the file is
    /// skipped and the failure is recorded in the scan report.
    #[error("failed to read metadata from {}: {source}", path.display())]
    Metadata {
        /// The audio file that could not be read.
        path: PathBuf,
        /// The underlying metadata reader error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A filesystem operation failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// The file or directory the operation was performed on.
        path: PathBuf,
        /// The underlying i/o error.
        source: std::io::Error,
    },
    /// Any other binary serialization error.
    #[error("failed to serialize binary data: {0}")]
    Binary(binrw::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        let err = match err {
            binrw::Error::Backtrace(backtrace) => *backtrace.error,
            err => err,
        };
        match err {
            binrw::Error::BadMagic { .. } => Error::BadMagic,
            binrw::Error::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::Truncated
            }
            err => Error::Binary(err),
        }
    }
}

/// The result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;

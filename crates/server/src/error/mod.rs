// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! All defined errors for kvdns

mod config_error;
mod dnssec_error;
mod store_error;

use std::fmt;

use thiserror::Error;

pub use self::config_error::{ConfigError, ConfigErrorKind, ConfigResult};
pub use self::dnssec_error::{DnssecError, DnssecErrorKind, DnssecResult};
pub use self::store_error::{StoreError, StoreErrorKind, StoreResult};
use crate::proto::error::ProtoError;

/// An alias for results returned by zone and record fetches
pub type Result<T> = ::std::result::Result<T, Error>;

/// The error kind for failures while materializing a zone or a location
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A stored value is not valid JSON for the expected type
    #[error("failed to decode value at {key}: {source}")]
    Decode {
        /// store key (and field) of the value
        key: String,
        /// the underlying decoder error
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for storage
    #[error("failed to encode value for {key}: {source}")]
    Encode {
        /// store key (and field) the value was meant for
        key: String,
        /// the underlying encoder error
        #[source]
        source: serde_json::Error,
    },

    /// Data required to answer was not present in the store
    #[error("no data stored for {0}")]
    Missing(String),

    /// A zone or owner name could not be parsed
    #[error("invalid name {name}: {source}")]
    Name {
        /// the name as given
        name: String,
        /// the parser error
        #[source]
        source: ProtoError,
    },

    // foreign
    /// An error got returned from the backing store
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The error type for failures while materializing a zone or a location
#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
}

impl Error {
    /// Get the kind of the error
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns true if the error was caused by the store rather than by the data it returned
    pub fn is_transient(&self) -> bool {
        matches!(*self.kind, ErrorKind::Store(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

use thiserror::Error;

use crate::error::StoreError;
use crate::proto::error::ProtoError;

/// An alias for results returned while materializing DNSSEC keys
pub type DnssecResult<T> = ::std::result::Result<T, DnssecError>;

/// The error kind for key material and signing failures
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DnssecErrorKind {
    /// No value is stored under the key
    #[error("no key material stored at {0}")]
    MissingKey(String),

    /// The stored value could not be parsed
    #[error("malformed key material at {key}: {reason}")]
    Malformed {
        /// store key of the offending value
        key: String,
        /// what failed to parse
        reason: String,
    },

    /// The key uses an algorithm this server cannot sign with
    #[error("unsupported DNSSEC algorithm: {0}")]
    UnsupportedAlgorithm(u8),

    /// The private key was rejected by the crypto provider
    #[error("key rejected: {0}")]
    KeyRejected(String),

    /// The public and private halves use different algorithms
    #[error("public key algorithm {public} does not match private key algorithm {private}")]
    AlgorithmMismatch {
        /// algorithm number from the DNSKEY record
        public: u8,
        /// algorithm number from the private key document
        private: u8,
    },

    /// Producing a signature failed
    #[error("signing failed: {0}")]
    Signing(String),

    // foreign
    /// An error got returned while reading the key material
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An error got returned by the hickory-proto crate
    #[error("proto error: {0}")]
    Proto(#[from] ProtoError),
}

/// The error type for key material and signing failures
#[derive(Debug)]
pub struct DnssecError {
    kind: Box<DnssecErrorKind>,
}

impl DnssecError {
    /// Get the kind of the error
    pub fn kind(&self) -> &DnssecErrorKind {
        &self.kind
    }
}

impl fmt::Display for DnssecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl<E> From<E> for DnssecError
where
    E: Into<DnssecErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}

impl std::error::Error for DnssecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

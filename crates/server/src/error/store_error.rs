// Copyright 2015-2016 Benjamin Fry
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{fmt, io, time::Duration};

use thiserror::Error;

/// An alias for results returned by backing store operations
pub type StoreResult<T> = ::std::result::Result<T, StoreError>;

/// The error kind for errors returned by a backing store
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// A request timed out
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The change notification feed was closed by the store
    #[error("change notification feed closed")]
    FeedClosed,

    // foreign
    /// An error got returned from IO
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error got returned from the redis crate
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// The error type for errors returned by a backing store
#[derive(Debug)]
pub struct StoreError {
    kind: Box<StoreErrorKind>,
}

impl StoreError {
    /// Get the kind of the error
    pub fn kind(&self) -> &StoreErrorKind {
        &self.kind
    }

    /// Returns true if the request was abandoned because it exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(*self.kind, StoreErrorKind::Timeout(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl<E> From<E> for StoreError
where
    E: Into<StoreErrorKind>,
{
    fn from(error: E) -> Self {
        Self {
            kind: Box::new(error.into()),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

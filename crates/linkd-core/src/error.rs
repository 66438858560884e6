//! Error types for linkd
//!
//! [`Error`] is the internal error type shared by the registry, the monitor
//! and link sources. It never crosses the transport boundary directly: the
//! query handler translates it into a [`QueryError`](crate::query::QueryError).

use std::fmt;
use thiserror::Error;

use crate::link::LinkIndex;

/// Result type alias for linkd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Identifier a lookup was made with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKey {
    /// Lookup by interface index
    Index(LinkIndex),
    /// Lookup by interface name
    Name(String),
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKey::Index(index) => write!(f, "{}", index),
            LinkKey::Name(name) => f.write_str(name),
        }
    }
}

/// Core error type for linkd
#[derive(Error, Debug)]
pub enum Error {
    /// The name or index does not resolve to a live link
    #[error("Link {0} not known")]
    NotFound(LinkKey),

    /// The detection subsystem reported an index that is already registered
    #[error("Link index {0} is already registered")]
    DuplicateIndex(LinkIndex),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Link source (detection subsystem) errors
    #[error("Link source error: {0}")]
    LinkSource(String),
}

impl Error {
    /// Create a "not found" error for an index lookup
    pub fn index_not_found(index: LinkIndex) -> Self {
        Self::NotFound(LinkKey::Index(index))
    }

    /// Create a "not found" error for a name lookup
    pub fn name_not_found(name: impl Into<String>) -> Self {
        Self::NotFound(LinkKey::Name(name.into()))
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a link source error
    pub fn link_source(msg: impl Into<String>) -> Self {
        Self::LinkSource(msg.into())
    }

    /// Whether this error means the link does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_carry_the_identifier() {
        assert_eq!(Error::index_not_found(2).to_string(), "Link 2 not known");
        assert_eq!(
            Error::name_not_found("eth0").to_string(),
            "Link eth0 not known"
        );
    }

    #[test]
    fn duplicate_index_is_not_a_lookup_miss() {
        let err = Error::DuplicateIndex(7);
        assert!(!err.is_not_found());
        assert!(err.to_string().contains('7'));
    }
}

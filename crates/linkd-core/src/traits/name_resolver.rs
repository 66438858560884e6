// # Name Resolver Trait
//
// Maps an interface name to the index currently bound to it. Names can be
// rebound at any time, so resolution happens on every lookup and results
// are never cached.

use std::collections::HashMap;

use crate::link::LinkIndex;

/// Resolves interface names against the detection subsystem's view
///
/// The registry uses the same identity source as the detection subsystem, so
/// a name that resolves to an index the registry does not hold points at a
/// consistency gap between the two.
pub trait NameResolver: Send + Sync {
    /// Index currently bound to `name`, if any
    fn resolve(&self, name: &str) -> Option<LinkIndex>;
}

/// Fixed name table
///
/// Useful when the identity source is not the host, for example in tests or
/// when links are fed through the API only.
#[derive(Debug, Clone, Default)]
pub struct StaticNameResolver {
    names: HashMap<String, LinkIndex>,
}

impl StaticNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or rebind a name
    pub fn with_name(mut self, name: impl Into<String>, index: LinkIndex) -> Self {
        self.names.insert(name.into(), index);
        self
    }
}

impl NameResolver for StaticNameResolver {
    fn resolve(&self, name: &str) -> Option<LinkIndex> {
        self.names.get(name).copied()
    }
}

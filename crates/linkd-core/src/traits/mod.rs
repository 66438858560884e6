//! Collaborator traits for linkd
//!
//! These are the narrow seams between the registry and the outside world.
//!
//! - [`LinkSource`]: Detection subsystem reporting link changes
//! - [`NameResolver`]: Name → index identity source

pub mod link_source;
pub mod name_resolver;

pub use link_source::{LinkEvent, LinkInfo, LinkSource, LinkSourceFactory};
pub use name_resolver::{NameResolver, StaticNameResolver};

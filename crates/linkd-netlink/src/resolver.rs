// # System Name Resolver
//
// Resolves interface names through the kernel, the same identity source the
// netlink watcher reports from.

use linkd_core::link::LinkIndex;
use linkd_core::traits::NameResolver;

/// Name resolution via `if_nametoindex(3)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNameResolver;

#[cfg(target_os = "linux")]
impl NameResolver for SystemNameResolver {
    fn resolve(&self, name: &str) -> Option<LinkIndex> {
        let name = std::ffi::CString::new(name).ok()?;

        // SAFETY: `name` is a valid NUL-terminated string that outlives the call
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };

        if index == 0 {
            None
        } else {
            LinkIndex::try_from(index).ok()
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl NameResolver for SystemNameResolver {
    fn resolve(&self, _name: &str) -> Option<LinkIndex> {
        None
    }
}

use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Static name to address table consulted before any forward lookup.
///
/// Keys are fully-qualified names matched exactly as written (no case folding,
/// no trailing dot added). The table is filled once at startup and shared
/// read-only between request tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionCache {
    entries: HashMap<String, Ipv4Addr>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Ipv4Addr)> + '_ {
        self.entries.iter().map(|(name, addr)| (name.as_str(), *addr))
    }
}

impl<S: Into<String>> FromIterator<(S, Ipv4Addr)> for ResolutionCache {
    fn from_iter<T: IntoIterator<Item = (S, Ipv4Addr)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

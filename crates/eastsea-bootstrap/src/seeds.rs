//! Seed-list parsing, per spec.md §4.E: "a list of `(host, port)` seed
//! entries, either defaulted or injected by configuration."

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedEntry(pub SocketAddr);

#[derive(Debug, PartialEq, Eq)]
pub struct SeedParseError(String);

impl fmt::Display for SeedParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid seed address: {}", self.0)
    }
}

impl std::error::Error for SeedParseError {}

impl FromStr for SeedEntry {
    type Err = SeedParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(SeedEntry)
            .map_err(|_| SeedParseError(s.to_string()))
    }
}

/// The configured seed list. Empty means the node runs as an island
/// until another node dials in (spec.md §4.E).
#[derive(Debug, Clone, Default)]
pub struct SeedList(Vec<SeedEntry>);

impl SeedList {
    pub fn new(seeds: Vec<SeedEntry>) -> Self {
        Self(seeds)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.0.iter().map(|s| s.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_valid_host_port_pair() {
        let seed: SeedEntry = "127.0.0.1:8000".parse().unwrap();
        assert_eq!(seed.0.port(), 8000);
    }

    #[test]
    fn rejects_a_malformed_entry() {
        let result = "not-an-address".parse::<SeedEntry>();
        assert!(result.is_err());
    }

    #[test]
    fn empty_seed_list_reports_island_mode() {
        let seeds = SeedList::default();
        assert!(seeds.is_empty());
        assert_eq!(seeds.len(), 0);
    }
}

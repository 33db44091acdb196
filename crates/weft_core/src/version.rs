//! Protocol version numbers.
//!
//! Protocol versions are free-form strings on the definition. They are only
//! turned into numbers when two of them are compared.

use std::fmt;

/// Numeric view of a protocol version string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Breaking component
    pub major: u64,
    /// Feature component
    pub minor: u64,
    /// Fix component
    pub patch: u64,
}

impl Version {
    /// Create a new version
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Read a version string; missing or non-numeric components become 0.
    ///
    /// A leading `v` and any pre-release suffix (`1.2.3-beta`) are ignored,
    /// so comparing two definitions never fails on formatting alone.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        let mut parts = s.trim().trim_start_matches('v').split('.');
        let mut next = || {
            parts
                .next()
                .map(|p| {
                    let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
                    digits.parse().unwrap_or(0)
                })
                .unwrap_or(0)
        };
        let major = next();
        let minor = next();
        let patch = next();
        Self::new(major, minor, patch)
    }

    /// Only the major component decides compatibility
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::parse_lenient(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

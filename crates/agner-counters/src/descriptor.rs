//! Counter descriptors and references.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// One counter variant as reported by the probe tool.
///
/// The same ID or name may appear several times, once per microarchitecture
/// that implements the counter. At most one of them is supported on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterDescriptor {
    /// Hardware event identifier.
    pub counter_id: u32,
    /// Symbolic name (not unique across descriptors).
    pub name: String,
    /// Whether the host's PMC scheme and family match this variant.
    pub supported: bool,
    /// Required counter-access scheme bits.
    pub scheme: u32,
    /// Required processor family bits.
    pub family: u32,
}

/// A user-facing counter reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterRef {
    Id(u32),
    Name(String),
}

impl CounterRef {
    /// Returns true for numeric references.
    #[must_use]
    pub const fn is_id(&self) -> bool {
        matches!(self, Self::Id(_))
    }
}

impl FromStr for CounterRef {
    type Err = Infallible;

    /// Decimal integers become IDs, everything else is a name. Surrounding
    /// whitespace is ignored either way.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<u32>()
            .map_or_else(|_| Self::Name(s.to_string()), Self::Id))
    }
}

impl fmt::Display for CounterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u32> for CounterRef {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for CounterRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for CounterRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

//! The closed set of person roles on a filmwork.

use std::fmt;
use std::str::FromStr;

/// Role of a person relative to a filmwork.
///
/// The source schema constrains the edge attribute to exactly these three
/// values; anything else on the wire is treated as unknown and dropped by
/// the transformer rather than surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Actor,
    Director,
    Writer,
}

impl Role {
    /// The wire spelling used by the source schema.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Director => "director",
            Self::Writer => "writer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a role value outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(Self::Actor),
            "director" => Ok(Self::Director),
            "writer" => Ok(Self::Writer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

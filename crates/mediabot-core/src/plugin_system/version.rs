//! Dotted version strings encoded as totally ordered integers.
//!
//! A version has one to three numeric components. Each component is
//! zero-padded to three digits and absent trailing components count as
//! `000`, so `"1.2"` encodes to `001002000` and sorts below `"1.2.1"`.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Highest number of dot-separated components a version may have
pub const MAX_COMPONENTS: usize = 3;

/// Each component occupies three decimal digits of the encoding
const COMPONENT_BASE: u64 = 1000;

/// Error type for version parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Version '{0}' has more than {max} components", max = MAX_COMPONENTS)]
    TooManyComponents(String),

    #[error("Version '{version}' has a non-numeric component '{component}'")]
    InvalidComponent { version: String, component: String },

    #[error("Component {value} of version '{version}' does not fit in three digits")]
    ComponentOutOfRange { version: String, value: u64 },
}

/// Encode a dotted version string. Empty or blank input encodes to 0.
pub fn encode(version: &str) -> Result<u64, VersionError> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > MAX_COMPONENTS {
        return Err(VersionError::TooManyComponents(trimmed.to_string()));
    }

    let mut encoded = 0u64;
    for index in 0..MAX_COMPONENTS {
        let value = match parts.get(index) {
            Some(part) => parse_component(trimmed, part)?,
            None => 0,
        };
        encoded = encoded * COMPONENT_BASE + value;
    }
    Ok(encoded)
}

/// Compare two version strings by their encodings
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(encode(a)?.cmp(&encode(b)?))
}

fn parse_component(version: &str, part: &str) -> Result<u64, VersionError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidComponent {
            version: version.to_string(),
            component: part.to_string(),
        });
    }
    // Digits only, so the only possible failure is overflow.
    let value = part.parse::<u64>().map_err(|_| VersionError::ComponentOutOfRange {
        version: version.to_string(),
        value: u64::MAX,
    })?;
    if value >= COMPONENT_BASE {
        return Err(VersionError::ComponentOutOfRange {
            version: version.to_string(),
            value,
        });
    }
    Ok(value)
}

/// A parsed version that keeps its original text next to the encoding
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    encoded: u64,
}

impl Version {
    pub fn parse(version: &str) -> Result<Self, VersionError> {
        Ok(Self {
            raw: version.trim().to_string(),
            encoded: encode(version)?,
        })
    }

    /// The 9-digit integer form
    pub fn encoded(&self) -> u64 {
        self.encoded
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

// Equality follows the encoding: "1.2" and "1.2.0" are the same version.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encoded.cmp(&other.encoded)
    }
}

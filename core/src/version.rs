//! Dotted version strings and their `(major, minor, patch)` triple.
//!
//! Every cookbook version is identified by a triple of non-negative integers.
//! Input strings may carry one, two or three components; missing trailing
//! components default to `0`, so `"1.2"` and `"1.2.0"` name the same version.
//! Rendering always produces exactly three components.
//!
//! # Examples
//!
//! ```
//! use cookbook_store_core::Version;
//!
//! let v: Version = "1.2".parse().unwrap();
//! assert_eq!(v.to_string(), "1.2.0");
//! assert!(Version::new(2, 0, 0) > Version::new(1, 10, 3));
//! assert!(Version::parse("1.2.3.4").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The input was empty or whitespace-only.
    #[error("invalid version: empty version string")]
    Empty,
    /// More than three dot-separated components.
    #[error("invalid version '{0}': expected at most three components")]
    TooManyComponents(String),
    /// A component is empty or contains something other than ASCII digits.
    #[error("invalid version '{input}': component '{component}' is not a non-negative integer")]
    InvalidComponent { input: String, component: String },
    /// A component does not fit the stored numeric range.
    #[error("invalid version '{input}': component '{component}' is out of range")]
    Overflow { input: String, component: String },
}

/// A `(major, minor, patch)` version triple.
///
/// Ordering is lexicographic on the three components, which is the order
/// used everywhere versions are listed (newest first means descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a dotted version string.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionError`] if the string does not consist of one to
    /// three dot-separated runs of ASCII digits, or a component exceeds
    /// `u32::MAX`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.trim().is_empty() {
            return Err(VersionError::Empty);
        }

        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionError::TooManyComponents(input.to_string()));
        }

        let mut triple = [0u32; 3];
        for (slot, part) in triple.iter_mut().zip(&parts) {
            *slot = parse_component(input, part)?;
        }

        Ok(Self::new(triple[0], triple[1], triple[2]))
    }

    /// Returns the components as a tuple.
    pub fn triple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }
}

fn parse_component(input: &str, part: &str) -> Result<u32, VersionError> {
    // `u32::from_str` accepts a leading '+', which is not a version digit.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidComponent {
            input: input.to_string(),
            component: part.to_string(),
        });
    }
    part.parse::<u32>().map_err(|_| VersionError::Overflow {
        input: input.to_string(),
        component: part.to_string(),
    })
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

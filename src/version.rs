//! Dataset versions and the patterns used to pin them in a request (`mnist:3.*.*`).
use crate::DatasetError;
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` dataset version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Bumped when the records change in an incompatible way
    pub major: u32,
    /// Bumped when features are added
    pub minor: u32,
    /// Bumped for fixes that keep the records identical
    pub patch: u32,
}

impl Version {
    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn components(s: &str) -> Option<[&str; 3]> {
    let mut parts = s.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    let patch = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some([major, minor, patch])
}

impl FromStr for Version {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DatasetError::InvalidVersion(s.to_string());
        let [major, minor, patch] = components(s).ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
            patch: patch.parse().map_err(|_| invalid())?,
        })
    }
}

/// A version where any component may be the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPattern {
    major: Option<u32>,
    minor: Option<u32>,
    patch: Option<u32>,
}

impl VersionPattern {
    /// Whether `version` satisfies every non-wildcard component.
    pub fn matches(&self, version: &Version) -> bool {
        self.major.map_or(true, |m| m == version.major)
            && self.minor.map_or(true, |m| m == version.minor)
            && self.patch.map_or(true, |p| p == version.patch)
    }
}

impl fmt::Display for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |c: Option<u32>| c.map_or("*".to_string(), |c| c.to_string());
        write!(
            f,
            "{}.{}.{}",
            show(self.major),
            show(self.minor),
            show(self.patch)
        )
    }
}

impl FromStr for VersionPattern {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DatasetError::InvalidVersion(s.to_string());
        let [major, minor, patch] = components(s).ok_or_else(invalid)?;
        let component = |c: &str| -> Result<Option<u32>, DatasetError> {
            if c == "*" {
                Ok(None)
            } else {
                c.parse().map(Some).map_err(|_| invalid())
            }
        };
        Ok(Self {
            major: component(major)?,
            minor: component(minor)?,
            patch: component(patch)?,
        })
    }
}

impl From<Version> for VersionPattern {
    fn from(version: Version) -> Self {
        Self {
            major: Some(version.major),
            minor: Some(version.minor),
            patch: Some(version.patch),
        }
    }
}

// src/version.rs

//! Version and constraint model
//!
//! Versions are strict `MAJOR.MINOR.PATCH` triples. Constraints pair an
//! operator with a reference version:
//!
//! - `*`      any version
//! - `=1.2.0` or `1.2.0`  exactly that version
//! - `>=1.2.0` that version or anything newer
//! - `^1.2.0` same major, at least the reference
//! - `~1.2.0` same major and minor, at least the reference

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `MAJOR.MINOR.PATCH` version, ordered component-wise with major first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string; exactly three dot-separated non-negative integers
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidFormat(format!(
                "invalid version format: {}",
                text
            )));
        }

        let major = parse_component(parts[0], "major", text)?;
        let minor = parse_component(parts[1], "minor", text)?;
        let patch = parse_component(parts[2], "patch", text)?;

        Ok(Self::new(major, minor, patch))
    }

    /// Compare two versions component-wise
    pub fn compare(&self, other: &Version) -> Ordering {
        self.cmp(other)
    }
}

fn parse_component(part: &str, label: &str, text: &str) -> Result<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidFormat(format!(
            "invalid {} version '{}' in {}",
            label, part, text
        )));
    }

    part.parse().map_err(|_| {
        Error::InvalidFormat(format!(
            "{} version '{}' out of range in {}",
            label, part, text
        ))
    })
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A version requirement attached to a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// `*`
    Any,
    /// `=x.y.z` or bare `x.y.z`
    Exact(Version),
    /// `>=x.y.z`
    AtLeast(Version),
    /// `^x.y.z`
    Caret(Version),
    /// `~x.y.z`
    Tilde(Version),
}

impl Constraint {
    /// Parse a constraint expression
    ///
    /// Prefixes are tried in the order `>=`, `^`, `~`, `=`; anything else is
    /// read as an exact version.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();

        if text == "*" {
            return Ok(Constraint::Any);
        }
        if let Some(rest) = text.strip_prefix(">=") {
            return Ok(Constraint::AtLeast(Version::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix('^') {
            return Ok(Constraint::Caret(Version::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix('~') {
            return Ok(Constraint::Tilde(Version::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix('=') {
            return Ok(Constraint::Exact(Version::parse(rest)?));
        }

        Ok(Constraint::Exact(Version::parse(text)?))
    }

    /// Check whether `version` falls inside this constraint's range
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::Exact(reference) => version == reference,
            Constraint::AtLeast(reference) => version >= reference,
            Constraint::Caret(reference) => {
                version.major == reference.major && version >= reference
            }
            Constraint::Tilde(reference) => {
                version.major == reference.major
                    && version.minor == reference.minor
                    && version >= reference
            }
        }
    }

    /// Reference version, absent for `*`
    pub fn reference(&self) -> Option<&Version> {
        match self {
            Constraint::Any => None,
            Constraint::Exact(v)
            | Constraint::AtLeast(v)
            | Constraint::Caret(v)
            | Constraint::Tilde(v) => Some(v),
        }
    }

    /// Pick the highest version in `candidates` that satisfies this constraint
    ///
    /// Candidates that fail to parse are skipped.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<(&'a str, Version)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|text| Version::parse(text).ok().map(|v| (text, v)))
            .filter(|(_, v)| self.satisfies(v))
            .max_by(|(_, a), (_, b)| a.cmp(b))
    }
}

impl FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => write!(f, "*"),
            Constraint::Exact(v) => write!(f, "={}", v),
            Constraint::AtLeast(v) => write!(f, ">={}", v),
            Constraint::Caret(v) => write!(f, "^{}", v),
            Constraint::Tilde(v) => write!(f, "~{}", v),
        }
    }
}

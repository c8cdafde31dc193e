//! Semantic versions of the runtime SDK and their compatibility rules.
//!
//! Multiple copies of the runtime SDK routinely coexist inside one module
//! tree. Not every combination works at runtime, so discovery records every
//! copy it sees and [`compatible`] decides whether a pair can share a
//! process. The rules are deliberately coarse: pre-1.0 releases broke
//! between minor versions, the 1.x/2.x line was stable, and post-2.0 each
//! major stands alone.

use std::fmt;

use thiserror::Error;

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticVersion {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Prerelease identifier, empty for stable releases.
    pub pre: String,
    /// Build metadata, empty when absent.
    pub build: String,
}

impl SemanticVersion {
    /// Parses a `major.minor.patch[-pre][+build]` string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionParseError`] when the core is not three dotted
    /// numeric components.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let malformed = || VersionParseError {
            version: input.to_string(),
        };

        let (core_and_pre, build) = input.split_once('+').unwrap_or((input, ""));
        let (core, pre) = core_and_pre.split_once('-').unwrap_or((core_and_pre, ""));
        let mut components = core.split('.');
        let major: u64 = components
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(malformed)?;
        let minor: u64 = components
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(malformed)?;
        let patch: u64 = components
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(malformed)?;
        if components.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre: pre.to_string(),
            build: build.to_string(),
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SemanticVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// Error raised when a version string is not a valid semantic version.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid semantic version '{version}'")]
pub struct VersionParseError {
    /// The offending input.
    pub version: String,
}

/// Why a pair of SDK versions cannot share a process.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VersionMismatch {
    /// Pre-1.0 copies must agree on major and minor.
    #[error("Differing major or minor versions are not supported.")]
    MajorMinor,
    /// Post-2.0 copies must agree on major.
    #[error("Differing major versions are not supported.")]
    Major,
}

/// Decides whether two SDK versions can coexist in one program.
///
/// Symmetric in its arguments. Pre-1.0 versions require an exact minor
/// match, anything in the 1.x/2.x band is mutually compatible (including the
/// 0.17.x release that immediately preceded 1.0), and past 2.0 the majors
/// must match.
///
/// # Errors
///
/// Returns the [`VersionMismatch`] explaining the incompatibility.
pub fn compatible(a: &SemanticVersion, b: &SemanticVersion) -> Result<(), VersionMismatch> {
    let in_stable_band = |v: &SemanticVersion| v.major == 1 || v.major == 2;
    let bridges_one_zero = |x: &SemanticVersion, y: &SemanticVersion| {
        x.major == 1 && y.major == 0 && y.minor == 17
    };

    if a.major == 0 && b.major == 0 {
        if a.minor != b.minor {
            return Err(VersionMismatch::MajorMinor);
        }
        Ok(())
    } else if in_stable_band(a) && in_stable_band(b) {
        Ok(())
    } else if a.major > 2 || b.major > 2 {
        if a.major != b.major {
            return Err(VersionMismatch::Major);
        }
        Ok(())
    } else if bridges_one_zero(a, b) || bridges_one_zero(b, a) {
        Ok(())
    } else {
        Err(VersionMismatch::MajorMinor)
    }
}

//! Engine compatibility checks
//!
//! Versions are compared structurally with `semver`. String comparison would
//! order "9.0.0" after "10.0.0".

use semver::Version;

use crate::model::Template;

/// Outcome of checking a template against a running engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    /// Template declares no minimum, or the engine satisfies it
    Compatible,
    /// Engine is older than the declared minimum
    EngineTooOld { required: String },
    /// One of the two versions could not be parsed
    Unparseable { value: String, reason: String },
}

impl Compatibility {
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// Compare `template.min_engine_version` with `engine_version`.
#[must_use]
pub fn check(template: &Template, engine_version: &str) -> Compatibility {
    let Some(required) = template.min_engine_version.as_deref() else {
        return Compatibility::Compatible;
    };

    let required_v = match Version::parse(required) {
        Ok(v) => v,
        Err(e) => {
            return Compatibility::Unparseable {
                value: required.to_string(),
                reason: e.to_string(),
            };
        }
    };
    let engine_v = match Version::parse(engine_version) {
        Ok(v) => v,
        Err(e) => {
            return Compatibility::Unparseable {
                value: engine_version.to_string(),
                reason: e.to_string(),
            };
        }
    };

    if engine_v >= required_v {
        Compatibility::Compatible
    } else {
        Compatibility::EngineTooOld {
            required: required.to_string(),
        }
    }
}

/// Structured ordering of two version strings, `None` if either fails to parse.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Option<std::cmp::Ordering> {
    let a = Version::parse(a).ok()?;
    let b = Version::parse(b).ok()?;
    Some(a.cmp(&b))
}

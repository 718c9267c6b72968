//! Semver predicate grammar for dependency and extension-point version gating.
//!
//! Grammar: an optional operator from `=, >, >=, <, <=, !=, ~=, ^` followed by
//! a semver literal; `=` is the default when no operator is present.
//!
//! `^` here only pins the major component (`plugin.major == literal.major`),
//! matching the reference implementation's explicit check — this is
//! deliberately *not* Cargo's "leftmost nonzero component" caret semantics,
//! since `semver::VersionReq`'s parser would silently diverge from the
//! reference grammar on that one operator.

use semver::Version;

use crate::error::ManifestError;

/// A parsed version predicate, ready to evaluate against a candidate [`Version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPredicate {
    operator: Operator,
    literal: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    TildeEq,
    Caret,
}

impl VersionPredicate {
    /// Parses a predicate string such as `">=1.2.0"`, `"~=1.2"`, or a bare
    /// `"1.2.3"` (implicitly `=`).
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        let raw = raw.trim();
        let (operator, rest) = Self::split_operator(raw);
        let literal = Version::parse(rest.trim()).map_err(|e| ManifestError::InvalidVersion {
            version: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { operator, literal })
    }

    fn split_operator(raw: &str) -> (Operator, &str) {
        for (prefix, op) in [
            (">=", Operator::Gte),
            ("<=", Operator::Lte),
            ("!=", Operator::Ne),
            ("~=", Operator::TildeEq),
            ("^", Operator::Caret),
            (">", Operator::Gt),
            ("<", Operator::Lt),
            ("=", Operator::Eq),
        ] {
            if let Some(rest) = raw.strip_prefix(prefix) {
                return (op, rest);
            }
        }
        (Operator::Eq, raw)
    }

    /// Evaluates this predicate against `candidate`.
    pub fn matches(&self, candidate: &Version) -> bool {
        match self.operator {
            Operator::Eq => candidate == &self.literal,
            Operator::Gt => candidate > &self.literal,
            Operator::Gte => candidate >= &self.literal,
            Operator::Lt => candidate < &self.literal,
            Operator::Lte => candidate <= &self.literal,
            Operator::Ne => candidate != &self.literal,
            Operator::TildeEq => {
                candidate.major == self.literal.major
                    && candidate.minor == self.literal.minor
                    && candidate >= &self.literal
            }
            Operator::Caret => candidate.major == self.literal.major && candidate >= &self.literal,
        }
    }

    /// The literal version embedded in this predicate (ignoring the operator).
    pub fn literal(&self) -> &Version {
        &self.literal
    }
}

impl std::fmt::Display for VersionPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.operator {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Ne => "!=",
            Operator::TildeEq => "~=",
            Operator::Caret => "^",
        };
        write!(f, "{op}{}", self.literal)
    }
}

/// Parses `version` as a bare semver literal (no operator), for comparing two
/// concrete releases directly (e.g. extension-point gating).
pub fn parse_version(version: &str) -> Result<Version, ManifestError> {
    Version::parse(version.trim()).map_err(|e| ManifestError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// The extension registry's stricter compatibility rule: major must match
/// exactly and `available >= required` — a declared-contract-version rule,
/// distinct from the fuller predicate grammar above.
pub fn is_extension_compatible(available: &Version, required: &Version) -> bool {
    available.major == required.major && available >= required
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn round_trip_table_matches_spec() {
        // operators in {=, >=, <=, ~=, ^} must match literal against itself
        for op in ["=", ">=", "<=", "~=", "^"] {
            let pred = VersionPredicate::parse(&format!("{op}1.2.3")).unwrap();
            assert!(pred.matches(&v("1.2.3")), "operator {op} should match its own literal");
        }
        // operators in {>, <, !=} must NOT match literal against itself
        for op in [">", "<", "!="] {
            let pred = VersionPredicate::parse(&format!("{op}1.2.3")).unwrap();
            assert!(!pred.matches(&v("1.2.3")), "operator {op} should not match its own literal");
        }
    }

    #[test]
    fn bare_literal_defaults_to_equality() {
        let pred = VersionPredicate::parse("2.0.0").unwrap();
        assert!(pred.matches(&v("2.0.0")));
        assert!(!pred.matches(&v("2.0.1")));
    }

    #[test]
    fn tilde_pins_major_and_minor() {
        let pred = VersionPredicate::parse("~=1.2.0").unwrap();
        assert!(pred.matches(&v("1.2.5")));
        assert!(!pred.matches(&v("1.3.0")));
        assert!(!pred.matches(&v("2.2.0")));
    }

    #[test]
    fn caret_pins_only_major() {
        let pred = VersionPredicate::parse("^1.2.0").unwrap();
        assert!(pred.matches(&v("1.9.0")));
        assert!(!pred.matches(&v("2.0.0")));
        assert!(!pred.matches(&v("1.1.0")));
    }

    #[test]
    fn malformed_version_is_a_hard_error() {
        assert!(VersionPredicate::parse(">=not-a-version").is_err());
    }

    #[test]
    fn extension_compatibility_requires_major_match_and_gte() {
        assert!(is_extension_compatible(&v("1.3.0"), &v("1.0.0")));
        assert!(!is_extension_compatible(&v("2.0.0"), &v("1.0.0")));
        assert!(!is_extension_compatible(&v("1.0.0"), &v("1.3.0")));
    }
}

use std::fmt;

use thiserror::Error;

use crate::tree_builder::MAX_NESTING_DEPTH;

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Problems found while constructing a [`crate::Policy`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid element name '{name}'")]
    InvalidElementName { name: String },

    #[error("Invalid attribute name '{name}'")]
    InvalidAttributeName { name: String },

    #[error("Element <{name}> carries active content and cannot be allowed")]
    UnsafeElement { name: String },

    #[error("Attribute '{name}' carries active content and cannot be allowed")]
    UnsafeAttribute { name: String },

    #[error("Invalid URL scheme '{scheme}'")]
    InvalidScheme { scheme: String },

    #[error("URL scheme '{scheme}' executes script and cannot be allowed")]
    UnsafeScheme { scheme: String },

    #[error("Invalid rel value '{value}' for links")]
    InvalidLinkRel { value: String },

    #[error("Maximum nesting depth {depth} is outside 1..={max}", max = MAX_NESTING_DEPTH)]
    InvalidNestingDepth { depth: usize },

    #[error("Unknown policy '{name}'. Expected one of: {expected}")]
    UnknownPolicy { name: String, expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    DisallowedElement { name: String },
    DisallowedScheme { attribute: String, scheme: String },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::DisallowedElement { name } => write!(f, "disallowed element <{}>", name),
            ViolationKind::DisallowedScheme { attribute, scheme } => {
                write!(f, "disallowed URL scheme '{}:' in {}", scheme, attribute)
            }
        }
    }
}

/// One offending node, located by its path in the parsed tree (`/div[0]/a[1]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.path)
    }
}

/// Returned instead of output when a fail-closed policy meets disallowed content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Policy violation: {}", summarize(.violations))]
pub struct PolicyViolation {
    pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
    match violations {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_violation(path: &str, name: &str) -> Violation {
        Violation {
            path: path.to_string(),
            kind: ViolationKind::DisallowedElement {
                name: name.to_string(),
            },
        }
    }

    #[test]
    fn violation_message_names_first_offender() {
        let err = PolicyViolation {
            violations: vec![
                element_violation("/script[1]", "script"),
                element_violation("/div[2]/iframe[0]", "iframe"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Policy violation: disallowed element <script> at /script[1] (and 1 more)"
        );
    }

    #[test]
    fn scheme_violation_message() {
        let violation = Violation {
            path: "/a[0]".into(),
            kind: ViolationKind::DisallowedScheme {
                attribute: "href".into(),
                scheme: "javascript".into(),
            },
        };
        assert_eq!(
            violation.to_string(),
            "disallowed URL scheme 'javascript:' in href at /a[0]"
        );
    }
}

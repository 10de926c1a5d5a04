//! Allow-list HTML sanitization.
//!
//! Input is tokenized, built into a tree, filtered against a [`Policy`] and serialized back
//! with every text and attribute value escaped. Nothing the policy does not name survives.
//!
//! ```
//! use scour_core::{sanitize, Policy};
//!
//! let clean = sanitize(r#"<p onclick="x()">Hi<script>alert(1)</script></p>"#, &Policy::basic());
//! assert_eq!(clean, "<p>Hi</p>");
//! ```

pub mod entities;
pub mod error;
pub mod markdown;
pub mod node;
pub mod policy;
pub mod serializer;
pub mod token;
pub mod tokenizer;
pub mod tree_builder;
pub mod walker;

pub use error::{PolicyError, PolicyResult, PolicyViolation, Violation, ViolationKind};
pub use markdown::{to_html, to_safe_html};
pub use node::{Element, Node};
pub use policy::{Policy, PolicyBuilder, PolicyDefinition, StripMode};
pub use serializer::serialize;
pub use token::{Attribute, Token};
pub use tokenizer::{tokenize, Tokenizer};
pub use tree_builder::{build, TreeBuilder};
pub use walker::{SanitizeReport, Walker};

/// Sanitized markup together with what was removed to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeResult {
    pub html: String,
    pub report: SanitizeReport,
}

/// Sanitizes `input`, returning the violations instead of output when the policy is
/// fail-closed and the input contains disallowed content.
pub fn try_sanitize(input: &str, policy: &Policy) -> Result<SanitizeResult, PolicyViolation> {
    let tree = TreeBuilder::for_policy(policy).build(Tokenizer::new(input));
    let filtered = Walker::new(policy).filter(tree)?;
    let html = serialize(&filtered.root);
    if !filtered.report.is_clean() {
        log::debug!(
            "Sanitized {} bytes to {} bytes ({} changes)",
            input.len(),
            html.len(),
            filtered.report.total()
        );
    }
    Ok(SanitizeResult {
        html,
        report: filtered.report,
    })
}

/// Sanitizes `input`. Never fails: a fail-closed violation yields an empty string.
pub fn sanitize(input: &str, policy: &Policy) -> String {
    match try_sanitize(input, policy) {
        Ok(result) => result.html,
        Err(violation) => {
            log::warn!("{}", violation);
            String::new()
        }
    }
}

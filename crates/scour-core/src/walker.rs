use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{PolicyViolation, Violation, ViolationKind};
use crate::node::{is_raw_text_container, Attributes, Element, Node};
use crate::policy::{AttributeKind, Policy, StripMode};

lazy_static! {
    static ref URL_SCHEME: Regex =
        Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").expect("Invalid URL_SCHEME regex pattern");
}

/// What the walker removed or rewrote during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub elements_removed: usize,
    pub elements_unwrapped: usize,
    pub attributes_removed: usize,
    pub attributes_altered: usize,
    pub comments_removed: usize,
}

impl SanitizeReport {
    pub fn total(&self) -> usize {
        self.elements_removed
            + self.elements_unwrapped
            + self.attributes_removed
            + self.attributes_altered
            + self.comments_removed
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub root: Node,
    pub report: SanitizeReport,
}

/// Scheme of an already-normalized URL value, lowercased.
pub fn url_scheme(url: &str) -> Option<String> {
    URL_SCHEME
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Strips what browsers strip before parsing a URL: leading and trailing C0 controls and
/// spaces, and tab/CR/LF anywhere.
pub fn normalize_url(value: &str) -> String {
    value
        .trim_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Appends `node`, merging adjacent text so unwrapped children read as one run.
fn push_merged(out: &mut Vec<Node>, node: Node) {
    if let Node::Text(text) = &node {
        if let Some(Node::Text(last)) = out.last_mut() {
            last.push_str(text);
            return;
        }
    }
    out.push(node);
}

/// Depth-first filter enforcing a [`Policy`] on an owned tree.
#[derive(Debug)]
pub struct Walker<'p> {
    policy: &'p Policy,
    report: SanitizeReport,
    violations: Vec<Violation>,
}

impl<'p> Walker<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            report: SanitizeReport::default(),
            violations: Vec::new(),
        }
    }

    /// Filters `root`. Only fails when the policy is fail-closed and something was
    /// disallowed; in that case no tree is returned.
    pub fn filter(mut self, root: Node) -> Result<Filtered, PolicyViolation> {
        let children = match root {
            Node::Element(element) if element.is_root() => element.children,
            other => vec![other],
        };
        let mut root = Element::root();
        root.children = self.filter_children(children, "");

        if !self.violations.is_empty() {
            log::warn!(
                "Rejecting input: {} policy violation(s)",
                self.violations.len()
            );
            return Err(PolicyViolation {
                violations: self.violations,
            });
        }
        Ok(Filtered {
            root: Node::Element(root),
            report: self.report,
        })
    }

    fn record(&mut self, path: &str, kind: ViolationKind) {
        if self.policy.fail_closed() {
            self.violations.push(Violation {
                path: path.to_string(),
                kind,
            });
        }
    }

    fn filter_children(&mut self, children: Vec<Node>, path: &str) -> Vec<Node> {
        let mut out = Vec::with_capacity(children.len());
        for (index, child) in children.into_iter().enumerate() {
            match child {
                Node::Text(text) => push_merged(&mut out, Node::Text(text)),
                Node::Comment(text) => {
                    if self.policy.keep_comments() {
                        out.push(Node::Comment(text));
                    } else {
                        self.report.comments_removed += 1;
                    }
                }
                Node::Element(element) => {
                    let child_path = if self.policy.fail_closed() {
                        format!("{}/{}[{}]", path, element.name, index)
                    } else {
                        String::new()
                    };
                    self.filter_element(element, &child_path, &mut out);
                }
            }
        }
        out
    }

    fn filter_element(&mut self, element: Element, path: &str, out: &mut Vec<Node>) {
        let name = element.name.to_ascii_lowercase();
        let raw_text = is_raw_text_container(&name);

        if raw_text || !self.policy.allows_element(&name) {
            self.record(path, ViolationKind::DisallowedElement { name: name.clone() });
            if raw_text || self.policy.strip_mode() == StripMode::RemoveSubtree {
                log::debug!("Removed <{}> with its content", name);
                self.report.elements_removed += 1;
                return;
            }
            log::debug!("Unwrapped <{}>", name);
            self.report.elements_unwrapped += 1;
            for child in self.filter_children(element.children, path) {
                push_merged(out, child);
            }
            return;
        }

        let attributes = self.filter_attributes(&name, element.attributes, path);
        let children = self.filter_children(element.children, path);
        out.push(Node::Element(Element {
            name,
            attributes,
            children,
        }));
    }

    fn filter_attributes(
        &mut self,
        element: &str,
        attributes: Attributes,
        path: &str,
    ) -> Attributes {
        let policy = self.policy;
        let forced_rel = policy.link_rel().filter(|_| element == "a");
        let mut original_rel = None;
        let mut kept = Attributes::new();

        for attr in attributes.into_vec() {
            let name = attr.name.to_ascii_lowercase();
            if forced_rel.is_some() && name == "rel" {
                original_rel = Some(attr.value);
                continue;
            }
            let Some(kind) = policy.attribute_kind(element, &name) else {
                log::debug!("Removed attribute {} from <{}>", name, element);
                self.report.attributes_removed += 1;
                continue;
            };
            match self.check_value(kind, &name, &attr.value, path) {
                Some(value) => {
                    if value != attr.value {
                        self.report.attributes_altered += 1;
                    }
                    kept.set(&name, &value);
                }
                None => self.report.attributes_removed += 1,
            }
        }

        if let Some(rel) = forced_rel {
            if original_rel.as_deref() != Some(rel) {
                self.report.attributes_altered += 1;
            }
            kept.set("rel", rel);
        }
        kept
    }

    /// The value to keep, or `None` when the attribute must go.
    fn check_value(
        &mut self,
        kind: AttributeKind<'_>,
        attribute: &str,
        value: &str,
        path: &str,
    ) -> Option<String> {
        match kind {
            AttributeKind::Text => Some(
                value
                    .chars()
                    .filter(|c| !is_stripped_control(*c))
                    .collect(),
            ),
            AttributeKind::Url => {
                let url = normalize_url(value);
                if url.chars().any(char::is_control) {
                    return None;
                }
                match url_scheme(&url) {
                    Some(scheme) if self.policy.allows_scheme(&scheme) => Some(url),
                    Some(scheme) => {
                        log::debug!("Removed {} with scheme '{}'", attribute, scheme);
                        self.record(
                            path,
                            ViolationKind::DisallowedScheme {
                                attribute: attribute.to_string(),
                                scheme,
                            },
                        );
                        None
                    }
                    None if self.policy.allow_relative_urls() => Some(url),
                    None => None,
                }
            }
            AttributeKind::Tokens(allowed) => {
                let tokens: Vec<&str> = value
                    .split_ascii_whitespace()
                    .filter_map(|token| {
                        allowed
                            .iter()
                            .find(|candidate| candidate.eq_ignore_ascii_case(token))
                            .map(String::as_str)
                    })
                    .collect();
                (!tokens.is_empty()).then(|| tokens.join(" "))
            }
        }
    }
}

//! Allow-list policies.
//!
//! A [`Policy`] is immutable once built and can be shared freely between threads. Start from
//! one of the presets ([`Policy::minimal_text`], [`Policy::basic`], [`Policy::markdown`]) and
//! narrow it through [`Policy::to_builder`], or describe one declaratively with a
//! [`PolicyDefinition`] loaded from configuration.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};
use crate::node::is_raw_text_container;
use crate::tree_builder::{DEFAULT_MAX_NESTING_DEPTH, MAX_NESTING_DEPTH};

lazy_static! {
    static ref ELEMENT_NAME: Regex =
        Regex::new(r"^[a-z][a-z0-9-]*$").expect("Invalid ELEMENT_NAME regex pattern");
    static ref ATTRIBUTE_NAME: Regex =
        Regex::new(r"^[a-z][a-z0-9_.:-]*$").expect("Invalid ATTRIBUTE_NAME regex pattern");
    static ref DATA_ATTRIBUTE: Regex =
        Regex::new(r"^data-[a-z0-9][a-z0-9_.-]*$").expect("Invalid DATA_ATTRIBUTE regex pattern");
    static ref SCHEME: Regex =
        Regex::new(r"^[a-z][a-z0-9+.-]*$").expect("Invalid SCHEME regex pattern");
}

pub const PRESET_NAMES: &[&str] = &["minimal", "basic", "markdown"];

/// Elements whose content is executed, embedded or parsed in a foreign mode.
fn is_active_content_element(name: &str) -> bool {
    is_raw_text_container(name)
        || matches!(
            name,
            "object"
                | "embed"
                | "applet"
                | "base"
                | "meta"
                | "link"
                | "template"
                | "svg"
                | "math"
                | "frame"
                | "frameset"
                | "portal"
        )
}

/// Event handlers and style-like attributes are never allow-listable. Any name starting
/// with `on` matches, including harmless ones such as `one-line`; that over-match is
/// intended, since new event handler names keep appearing.
pub fn is_active_content_attribute(name: &str) -> bool {
    name.starts_with("on") || matches!(name, "style" | "srcdoc")
}

fn is_script_scheme(scheme: &str) -> bool {
    matches!(scheme, "javascript" | "vbscript" | "livescript")
}

/// Attributes whose value is fetched or navigated to.
pub fn is_url_attribute(name: &str) -> bool {
    matches!(
        name,
        "href"
            | "src"
            | "action"
            | "formaction"
            | "cite"
            | "background"
            | "poster"
            | "longdesc"
            | "codebase"
            | "data"
            | "xlink:href"
            | "ping"
            | "manifest"
            | "lowsrc"
            | "dynsrc"
            | "usemap"
    )
}

pub fn is_data_attribute(name: &str) -> bool {
    DATA_ATTRIBUTE.is_match(name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripMode {
    /// Drop a disallowed element together with everything inside it.
    RemoveSubtree,
    /// Drop only the disallowed element's tags and keep its filtered children in place.
    #[default]
    UnwrapKeepChildren,
}

/// Shape of an allowed attribute's value, resolved once per attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind<'a> {
    Text,
    Url,
    /// Whitespace-separated tokens drawn from a fixed set.
    Tokens(&'a BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    elements: HashSet<String>,
    element_attributes: HashMap<String, HashSet<String>>,
    global_attributes: HashSet<String>,
    url_schemes: HashSet<String>,
    attribute_values: HashMap<String, BTreeSet<String>>,
    strip_mode: StripMode,
    keep_comments: bool,
    fail_closed: bool,
    allow_relative_urls: bool,
    allow_data_attributes: bool,
    link_rel: Option<String>,
    max_nesting_depth: usize,
}

impl Policy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// A builder pre-filled with this policy, for narrowing or extending it.
    pub fn to_builder(&self) -> PolicyBuilder {
        PolicyBuilder {
            elements: self.elements.clone(),
            element_attributes: self.element_attributes.clone(),
            global_attributes: self.global_attributes.clone(),
            url_schemes: self.url_schemes.clone(),
            attribute_values: self.attribute_values.clone(),
            strip_mode: self.strip_mode,
            keep_comments: self.keep_comments,
            fail_closed: self.fail_closed,
            allow_relative_urls: self.allow_relative_urls,
            allow_data_attributes: self.allow_data_attributes,
            link_rel: self.link_rel.clone(),
            max_nesting_depth: self.max_nesting_depth,
        }
    }

    /// Inline text formatting only, no attributes, no links.
    pub fn minimal_text() -> Self {
        PolicyBuilder::new()
            .allow_elements([
                "b", "strong", "i", "em", "u", "s", "small", "sub", "sup", "mark", "code", "br",
            ])
            .assemble()
    }

    /// Common document structure, links and images over http, https and mailto.
    pub fn basic() -> Self {
        PolicyBuilder::new()
            .allow_elements([
                "a", "abbr", "b", "blockquote", "br", "caption", "code", "col", "colgroup", "dd",
                "del", "details", "div", "dl", "dt", "em", "figcaption", "figure", "h1", "h2",
                "h3", "h4", "h5", "h6", "hr", "i", "img", "ins", "kbd", "li", "mark", "ol", "p",
                "pre", "q", "s", "samp", "small", "span", "strong", "sub", "summary", "sup",
                "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "u", "ul",
            ])
            .allow_attributes("a", ["href", "title"])
            .allow_attributes("img", ["src", "alt", "title", "width", "height"])
            .allow_attributes("td", ["colspan", "rowspan"])
            .allow_attributes("th", ["colspan", "rowspan", "scope"])
            .allow_attributes("col", ["span"])
            .allow_attributes("colgroup", ["span"])
            .allow_attributes("ol", ["start", "reversed"])
            .allow_attributes("blockquote", ["cite"])
            .allow_attributes("q", ["cite"])
            .allow_attributes("del", ["cite", "datetime"])
            .allow_attributes("ins", ["cite", "datetime"])
            .allow_attributes("time", ["datetime"])
            .allow_global_attributes(["lang", "dir", "title"])
            .allow_attribute_values("dir", ["ltr", "rtl", "auto"])
            .allow_attribute_values("scope", ["row", "col", "rowgroup", "colgroup"])
            .allow_url_schemes(["http", "https", "mailto"])
            .link_rel(Some("noopener noreferrer"))
            .assemble()
    }

    /// Everything the markdown renderer produces, including math and mermaid blocks.
    pub fn markdown() -> Self {
        PolicyBuilder::new()
            .allow_elements([
                "a", "blockquote", "br", "caption", "code", "dd", "del", "div", "dl", "dt", "em",
                "h1", "h2", "h3", "h4", "h5", "h6", "hr", "img", "input", "li", "ol", "p", "pre",
                "section", "span", "strong", "sub", "sup", "table", "tbody", "td", "tfoot", "th",
                "thead", "tr", "ul",
            ])
            .allow_attributes("a", ["href", "title", "id", "class"])
            .allow_attributes("img", ["src", "alt", "title"])
            .allow_attributes("input", ["type", "checked", "disabled"])
            .allow_attributes("li", ["id", "class"])
            .allow_attributes("ol", ["start"])
            .allow_attributes("section", ["class"])
            .allow_attributes("sup", ["class"])
            .allow_attributes("span", ["class", "data-math"])
            .allow_attributes("div", ["class", "data-math"])
            .allow_attributes("th", ["align"])
            .allow_attributes("td", ["align"])
            .allow_attribute_values(
                "class",
                [
                    "math-inline",
                    "math-block",
                    "mermaid",
                    "footnote-ref",
                    "footnote-backref",
                    "footnotes",
                    "task-list-item",
                ],
            )
            .allow_attribute_values("type", ["checkbox"])
            .allow_attribute_values("align", ["left", "center", "right"])
            .allow_url_schemes(["http", "https", "mailto"])
            .link_rel(Some("noopener noreferrer"))
            .assemble()
    }

    /// Resolves a preset by name (`minimal`, `basic`, `markdown`).
    pub fn named(name: &str) -> PolicyResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "minimal" | "minimal_text" | "minimal-text" => Ok(Self::minimal_text()),
            "basic" => Ok(Self::basic()),
            "markdown" => Ok(Self::markdown()),
            _ => Err(PolicyError::UnknownPolicy {
                name: name.to_string(),
                expected: PRESET_NAMES.join(", "),
            }),
        }
    }

    pub fn allows_element(&self, name: &str) -> bool {
        self.elements.contains(&name.to_ascii_lowercase())
    }

    /// The value shape for `attribute` on `element`, or `None` if it is not allowed there.
    pub fn attribute_kind(&self, element: &str, attribute: &str) -> Option<AttributeKind<'_>> {
        let element = element.to_ascii_lowercase();
        let attribute = attribute.to_ascii_lowercase();
        if is_active_content_attribute(&attribute) {
            return None;
        }

        let allowed = self.global_attributes.contains(&attribute)
            || self
                .element_attributes
                .get(&element)
                .is_some_and(|attrs| attrs.contains(&attribute))
            || (self.allow_data_attributes && is_data_attribute(&attribute));
        if !allowed {
            return None;
        }

        if let Some(tokens) = self.attribute_values.get(&attribute) {
            Some(AttributeKind::Tokens(tokens))
        } else if is_url_attribute(&attribute) {
            Some(AttributeKind::Url)
        } else {
            Some(AttributeKind::Text)
        }
    }

    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.url_schemes.contains(&scheme.to_ascii_lowercase())
    }

    pub fn strip_mode(&self) -> StripMode {
        self.strip_mode
    }

    pub fn keep_comments(&self) -> bool {
        self.keep_comments
    }

    pub fn fail_closed(&self) -> bool {
        self.fail_closed
    }

    pub fn allow_relative_urls(&self) -> bool {
        self.allow_relative_urls
    }

    pub fn link_rel(&self) -> Option<&str> {
        self.link_rel.as_deref()
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }

    /// Allowed element names in sorted order.
    pub fn elements(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.elements.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Allowed URL schemes in sorted order.
    pub fn url_schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.url_schemes.iter().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::basic()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyBuilder {
    elements: HashSet<String>,
    element_attributes: HashMap<String, HashSet<String>>,
    global_attributes: HashSet<String>,
    url_schemes: HashSet<String>,
    attribute_values: HashMap<String, BTreeSet<String>>,
    strip_mode: StripMode,
    keep_comments: bool,
    fail_closed: bool,
    allow_relative_urls: bool,
    allow_data_attributes: bool,
    link_rel: Option<String>,
    max_nesting_depth: usize,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(name: impl AsRef<str>) -> String {
    name.as_ref().trim().to_ascii_lowercase()
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self {
            elements: HashSet::new(),
            element_attributes: HashMap::new(),
            global_attributes: HashSet::new(),
            url_schemes: HashSet::new(),
            attribute_values: HashMap::new(),
            strip_mode: StripMode::default(),
            keep_comments: false,
            fail_closed: false,
            allow_relative_urls: true,
            allow_data_attributes: false,
            link_rel: None,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }

    pub fn allow_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.elements.extend(names.into_iter().map(normalize));
        self
    }

    /// Removes elements, and their attribute lists, from the allow-list.
    pub fn deny_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names.into_iter().map(normalize) {
            self.elements.remove(&name);
            self.element_attributes.remove(&name);
        }
        self
    }

    pub fn allow_attributes<I, S>(mut self, element: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.element_attributes
            .entry(normalize(element))
            .or_default()
            .extend(attributes.into_iter().map(normalize));
        self
    }

    pub fn allow_global_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.global_attributes
            .extend(attributes.into_iter().map(normalize));
        self
    }

    /// Restricts `attribute` to whitespace-separated tokens from `values`.
    pub fn allow_attribute_values<I, S>(mut self, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attribute_values
            .entry(normalize(attribute))
            .or_default()
            .extend(values.into_iter().map(|v| v.as_ref().trim().to_string()));
        self
    }

    pub fn allow_url_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.url_schemes.extend(
            schemes
                .into_iter()
                .map(|s| normalize(s).trim_end_matches(':').to_string()),
        );
        self
    }

    pub fn strip_mode(mut self, mode: StripMode) -> Self {
        self.strip_mode = mode;
        self
    }

    pub fn keep_comments(mut self, keep: bool) -> Self {
        self.keep_comments = keep;
        self
    }

    pub fn fail_closed(mut self, fail_closed: bool) -> Self {
        self.fail_closed = fail_closed;
        self
    }

    pub fn allow_relative_urls(mut self, allow: bool) -> Self {
        self.allow_relative_urls = allow;
        self
    }

    pub fn allow_data_attributes(mut self, allow: bool) -> Self {
        self.allow_data_attributes = allow;
        self
    }

    /// Forces `rel` on every retained `<a>`; `None` leaves links untouched.
    pub fn link_rel(mut self, rel: Option<&str>) -> Self {
        self.link_rel = rel.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        self
    }

    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    fn validate(&self) -> PolicyResult<()> {
        for name in &self.elements {
            if !ELEMENT_NAME.is_match(name) {
                return Err(PolicyError::InvalidElementName { name: name.clone() });
            }
            if is_active_content_element(name) {
                return Err(PolicyError::UnsafeElement { name: name.clone() });
            }
        }

        let attribute_names = self
            .element_attributes
            .values()
            .flatten()
            .chain(self.global_attributes.iter())
            .chain(self.attribute_values.keys());
        for name in attribute_names {
            if !ATTRIBUTE_NAME.is_match(name) {
                return Err(PolicyError::InvalidAttributeName { name: name.clone() });
            }
            if is_active_content_attribute(name) {
                return Err(PolicyError::UnsafeAttribute { name: name.clone() });
            }
        }
        for element in self.element_attributes.keys() {
            if !ELEMENT_NAME.is_match(element) {
                return Err(PolicyError::InvalidElementName {
                    name: element.clone(),
                });
            }
        }

        for scheme in &self.url_schemes {
            if !SCHEME.is_match(scheme) {
                return Err(PolicyError::InvalidScheme {
                    scheme: scheme.clone(),
                });
            }
            if is_script_scheme(scheme) {
                return Err(PolicyError::UnsafeScheme {
                    scheme: scheme.clone(),
                });
            }
        }

        if let Some(rel) = &self.link_rel {
            if !rel
                .split_ascii_whitespace()
                .all(|token| token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
            {
                return Err(PolicyError::InvalidLinkRel { value: rel.clone() });
            }
        }

        if !(1..=MAX_NESTING_DEPTH).contains(&self.max_nesting_depth) {
            return Err(PolicyError::InvalidNestingDepth {
                depth: self.max_nesting_depth,
            });
        }
        Ok(())
    }

    pub fn build(self) -> PolicyResult<Policy> {
        self.validate()?;
        Ok(self.assemble())
    }

    /// Builds without validation; only for the presets, which are covered by tests.
    fn assemble(self) -> Policy {
        Policy {
            elements: self.elements,
            element_attributes: self.element_attributes,
            global_attributes: self.global_attributes,
            url_schemes: self.url_schemes,
            attribute_values: self.attribute_values,
            strip_mode: self.strip_mode,
            keep_comments: self.keep_comments,
            fail_closed: self.fail_closed,
            allow_relative_urls: self.allow_relative_urls,
            allow_data_attributes: self.allow_data_attributes,
            link_rel: self.link_rel,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}

/// Declarative policy as it appears in configuration files.
///
/// ```json
/// { "base": "basic", "deny_elements": ["img"], "fail_closed": true }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyDefinition {
    /// Preset to start from; an empty policy when absent.
    pub base: Option<String>,
    pub elements: Vec<String>,
    pub deny_elements: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
    pub global_attributes: Vec<String>,
    pub attribute_values: BTreeMap<String, Vec<String>>,
    pub url_schemes: Vec<String>,
    pub strip_mode: Option<StripMode>,
    pub keep_comments: Option<bool>,
    pub fail_closed: Option<bool>,
    pub allow_relative_urls: Option<bool>,
    pub allow_data_attributes: Option<bool>,
    /// An empty string removes a `rel` inherited from the base preset.
    pub link_rel: Option<String>,
    pub max_nesting_depth: Option<usize>,
}

impl PolicyDefinition {
    pub fn build(&self) -> PolicyResult<Policy> {
        let mut builder = match &self.base {
            Some(base) => Policy::named(base)?.to_builder(),
            None => PolicyBuilder::new(),
        };

        builder = builder
            .allow_elements(&self.elements)
            .allow_global_attributes(&self.global_attributes)
            .allow_url_schemes(&self.url_schemes);
        for (element, attributes) in &self.attributes {
            builder = builder.allow_attributes(element, attributes);
        }
        for (attribute, values) in &self.attribute_values {
            builder = builder.allow_attribute_values(attribute, values);
        }
        builder = builder.deny_elements(&self.deny_elements);

        if let Some(mode) = self.strip_mode {
            builder = builder.strip_mode(mode);
        }
        if let Some(keep) = self.keep_comments {
            builder = builder.keep_comments(keep);
        }
        if let Some(fail_closed) = self.fail_closed {
            builder = builder.fail_closed(fail_closed);
        }
        if let Some(allow) = self.allow_relative_urls {
            builder = builder.allow_relative_urls(allow);
        }
        if let Some(allow) = self.allow_data_attributes {
            builder = builder.allow_data_attributes(allow);
        }
        if let Some(rel) = &self.link_rel {
            builder = builder.link_rel(Some(rel.as_str()));
        }
        if let Some(depth) = self.max_nesting_depth {
            builder = builder.max_nesting_depth(depth);
        }
        builder.build()
    }
}

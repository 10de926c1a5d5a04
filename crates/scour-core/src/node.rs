use crate::token::Attribute;

/// Name of the synthetic element that owns the top-level nodes.
pub const ROOT_NAME: &str = "#root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants, comments excluded.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Comment(_) => {}
        Node::Element(element) => {
            for child in &element.children {
                collect_text(child, out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::default(),
            children: Vec::new(),
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_NAME)
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_NAME
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.set(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.push_child(child);
        self
    }

    /// Appends a child, merging it into a trailing text node when both are text.
    pub fn push_child(&mut self, child: Node) {
        if let Node::Text(text) = &child {
            if let Some(Node::Text(last)) = self.children.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.children.push(child);
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

/// Ordered attribute map with unique names.
///
/// Setting an existing name replaces its value in place, so the first occurrence fixes
/// the position and the last occurrence fixes the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .0
            .iter_mut()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value.to_string(),
            None => self.0.push(Attribute::new(name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .0
            .iter()
            .position(|attr| attr.name.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(index).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Attribute> {
        self.0
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for attr in iter {
            attributes.set(&attr.name, &attr.value);
        }
        attributes
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Elements that never have children and are written without an end tag.
pub fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// How the tokenizer treats the content of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentModel {
    Markup,
    /// Undecoded text up to the matching end tag.
    RawText,
    /// Text up to the matching end tag, character references decoded.
    EscapableRawText,
    /// Everything up to the end of input.
    PlainText,
}

pub fn content_model(name: &str) -> ContentModel {
    match name {
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
            ContentModel::RawText
        }
        "textarea" | "title" => ContentModel::EscapableRawText,
        "plaintext" => ContentModel::PlainText,
        _ => ContentModel::Markup,
    }
}

/// Raw-text containers hold script or style source rather than document text.
pub fn is_raw_text_container(name: &str) -> bool {
    matches!(
        content_model(name),
        ContentModel::RawText | ContentModel::PlainText
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_keep_first_position_and_last_value() {
        let attrs: Attributes = vec![
            Attribute::new("title", "one"),
            Attribute::new("href", "/a"),
            Attribute::new("title", "two"),
        ]
        .into_iter()
        .collect();

        let pairs: Vec<(&str, &str)> = attrs
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("title", "two"), ("href", "/a")]);
    }

    #[test]
    fn attribute_lookup_ignores_case() {
        let mut attrs = Attributes::new();
        attrs.set("href", "/x");
        assert_eq!(attrs.get("HREF"), Some("/x"));
        assert_eq!(attrs.remove("Href"), Some("/x".to_string()));
        assert!(attrs.is_empty());
    }

    #[test]
    fn push_child_merges_adjacent_text() {
        let mut element = Element::new("p");
        element.push_child(Node::Text("a".into()));
        element.push_child(Node::Text("b".into()));
        element.push_child(Node::Element(Element::new("br")));
        element.push_child(Node::Text("c".into()));
        assert_eq!(element.children.len(), 3);
        assert_eq!(element.children[0], Node::Text("ab".into()));
    }

    #[test]
    fn classifies_content_models() {
        assert_eq!(content_model("script"), ContentModel::RawText);
        assert_eq!(content_model("title"), ContentModel::EscapableRawText);
        assert_eq!(content_model("plaintext"), ContentModel::PlainText);
        assert_eq!(content_model("div"), ContentModel::Markup);
        assert!(is_raw_text_container("style"));
        assert!(!is_raw_text_container("textarea"));
        assert!(is_void_element("br"));
        assert!(!is_void_element("p"));
    }

    #[test]
    fn text_content_skips_comments() {
        let node = Node::Element(
            Element::new("p")
                .with_child(Node::Text("a".into()))
                .with_child(Node::Comment("hidden".into()))
                .with_child(Node::Element(
                    Element::new("b").with_child(Node::Text("c".into())),
                )),
        );
        assert_eq!(node.text_content(), "ac");
    }
}

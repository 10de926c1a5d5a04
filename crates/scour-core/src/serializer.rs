use crate::node::{is_void_element, Element, Node};

/// Renders a tree as markup. Text and attribute values are escaped so the output re-parses
/// into the same tree; the synthetic root contributes only its children.
pub fn serialize(root: &Node) -> String {
    let mut out = String::new();
    write_node(&mut out, root);
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => escape_into(out, text),
        Node::Comment(text) => write_comment(out, text),
        Node::Element(element) => write_element(out, element),
    }
}

fn write_children(out: &mut String, element: &Element) {
    for child in &element.children {
        write_node(out, child);
    }
}

fn write_element(out: &mut String, element: &Element) {
    if element.is_root() || !is_markup_name(&element.name) {
        write_children(out, element);
        return;
    }

    let name = element.name.to_ascii_lowercase();
    out.push('<');
    out.push_str(&name);
    for attr in &element.attributes {
        if !is_markup_name(&attr.name) {
            continue;
        }
        out.push(' ');
        out.push_str(&attr.name.to_ascii_lowercase());
        out.push_str("=\"");
        escape_into(out, &attr.value);
        out.push('"');
    }
    out.push('>');

    // Void elements cannot hold children; anything attached during recovery is dropped.
    if is_void_element(&name) {
        return;
    }
    write_children(out, element);
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// Comment text is rewritten so it cannot close the comment early: `--` runs are broken
/// up and a leading `>` or `->` is padded.
fn write_comment(out: &mut String, text: &str) {
    let mut body = text.to_string();
    while body.contains("--") {
        body = body.replace("--", "- -");
    }
    if body.starts_with('>') || body.starts_with("->") {
        body.insert(0, ' ');
    }
    if body.ends_with('-') {
        body.push(' ');
    }
    out.push_str("<!--");
    out.push_str(&body);
    out.push_str("-->");
}

/// ASCII letter first, then letters, digits, `-`, `_`, `.`, `:`.
fn is_markup_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text);
    out
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(children: Vec<Node>) -> Node {
        let mut root = Element::root();
        root.children = children;
        Node::Element(root)
    }

    #[test]
    fn escapes_text_and_attributes() {
        let tree = root(vec![Node::Element(
            Element::new("a")
                .with_attribute("title", r#"x" onmouseover='y'"#)
                .with_child(Node::Text("1 < 2 & 3 > 0".into())),
        )]);
        assert_eq!(
            serialize(&tree),
            r#"<a title="x&quot; onmouseover=&#39;y&#39;">1 &lt; 2 &amp; 3 &gt; 0</a>"#
        );
    }

    #[test]
    fn void_elements_have_no_end_tag_or_children() {
        let tree = root(vec![Node::Element(
            Element::new("br").with_child(Node::Text("stray".into())),
        )]);
        assert_eq!(serialize(&tree), "<br>");
    }

    #[test]
    fn every_other_element_is_closed() {
        let tree = root(vec![Node::Element(
            Element::new("p").with_child(Node::Element(Element::new("b"))),
        )]);
        assert_eq!(serialize(&tree), "<p><b></b></p>");
    }

    #[test]
    fn comments_cannot_terminate_early() {
        let tree = root(vec![
            Node::Comment("a --> b --!> c".into()),
            Node::Comment(">x".into()),
            Node::Comment("tail-".into()),
        ]);
        assert_eq!(
            serialize(&tree),
            "<!--a - -> b - -!> c--><!-- >x--><!--tail- -->"
        );
    }

    #[test]
    fn malformed_names_are_not_emitted() {
        let tree = root(vec![Node::Element(
            Element::new("x\"y")
                .with_attribute("a<b", "1")
                .with_child(Node::Element(
                    Element::new("b").with_attribute("c\"d", "2"),
                ))
                .with_child(Node::Text("t".into())),
        )]);
        assert_eq!(serialize(&tree), "<b></b>t");
    }

    #[test]
    fn escape_helper() {
        assert_eq!(escape("<'&\">"), "&lt;&#39;&amp;&quot;&gt;");
    }
}

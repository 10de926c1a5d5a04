use crate::node::{is_void_element, Element, Node};
use crate::policy::Policy;
use crate::token::{Attribute, Token};

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 256;

/// Deepest tree the recursive walker and serializer are given.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Elements that stop an implied close from reaching past them. When building for a policy,
/// only the ones it allows count: an unwrapped element must not shield anything its output
/// would not shield when parsed again.
const SCOPE: &[&str] = &["html", "table", "td", "th", "caption"];

const LIST_ITEM_BOUNDARIES: &[&str] = &["html", "table", "td", "th", "caption", "ul", "ol"];

const DEFINITION_BOUNDARIES: &[&str] = &["html", "table", "td", "th", "caption", "dl"];

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Start tags that implicitly end an open `<p>`.
fn closes_paragraph(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "center"
            | "details"
            | "dialog"
            | "dir"
            | "div"
            | "dl"
            | "dd"
            | "dt"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "header"
            | "hgroup"
            | "hr"
            | "li"
            | "listing"
            | "main"
            | "menu"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "summary"
            | "table"
            | "ul"
            | "xmp"
            | "plaintext"
    ) || is_heading(name)
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Document-level wrappers have no meaning inside a fragment and are dropped.
fn is_document_wrapper(name: &str) -> bool {
    matches!(name, "html" | "head" | "body")
}

/// Builds a tree from `tokens` with the default nesting limit.
pub fn build<I: IntoIterator<Item = Token>>(tokens: I) -> Node {
    TreeBuilder::new().build(tokens)
}

#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'p> {
    max_depth: usize,
    policy: Option<&'p Policy>,
}

impl Default for TreeBuilder<'_> {
    fn default() -> Self {
        TreeBuilder::new()
    }
}

impl TreeBuilder<'static> {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_NESTING_DEPTH)
    }

    /// Start tags nested deeper than `max_depth` are ignored; their content is attached to
    /// the deepest open element instead. The depth is clamped to `1..=MAX_NESTING_DEPTH`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        TreeBuilder {
            max_depth: max_depth.clamp(1, MAX_NESTING_DEPTH),
            policy: None,
        }
    }
}

impl<'p> TreeBuilder<'p> {
    /// Builder whose scope boundaries are limited to elements `policy` keeps.
    pub fn for_policy(policy: &'p Policy) -> Self {
        Self {
            max_depth: policy.max_nesting_depth().clamp(1, MAX_NESTING_DEPTH),
            policy: Some(policy),
        }
    }

    pub fn build<I: IntoIterator<Item = Token>>(&self, tokens: I) -> Node {
        let mut open = OpenElements::new(self.max_depth, self.policy);
        for token in tokens {
            match token {
                Token::StartTag {
                    name, attributes, ..
                } => open.start_tag(name, attributes),
                Token::EndTag { name } => open.end_tag(&name),
                Token::Text(text) => open.text(text),
                Token::Comment(text) => open.current().push_child(Node::Comment(text)),
                Token::EndOfInput => break,
            }
        }
        open.finish()
    }
}

/// Stack of elements under construction. The root sits at index 0 and is never popped
/// before `finish`.
struct OpenElements<'p> {
    stack: Vec<Element>,
    max_depth: usize,
    policy: Option<&'p Policy>,
}

impl<'p> OpenElements<'p> {
    fn new(max_depth: usize, policy: Option<&'p Policy>) -> Self {
        Self {
            stack: vec![Element::root()],
            max_depth,
            policy,
        }
    }

    fn current(&mut self) -> &mut Element {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn pop(&mut self) {
        if self.stack.len() > 1 {
            if let Some(element) = self.stack.pop() {
                self.current().push_child(Node::Element(element));
            }
        }
    }

    /// Closes open elements until the one at `index` has been closed too.
    fn close_through(&mut self, index: usize) {
        let index = index.max(1);
        while self.stack.len() > index {
            self.pop();
        }
    }

    /// Innermost open element named in `targets`, unless a `boundaries` element is hit first.
    fn find_in_scope(&self, targets: &[&str], boundaries: &[&str]) -> Option<usize> {
        for (index, element) in self.stack.iter().enumerate().skip(1).rev() {
            if targets.contains(&element.name.as_str()) {
                return Some(index);
            }
            if self.shields(element, boundaries) {
                return None;
            }
        }
        None
    }

    fn shields(&self, element: &Element, boundaries: &[&str]) -> bool {
        boundaries.contains(&element.name.as_str())
            && self
                .policy
                .map_or(true, |policy| policy.allows_element(&element.name))
    }

    fn close_if_open(&mut self, targets: &[&str], boundaries: &[&str]) {
        if let Some(index) = self.find_in_scope(targets, boundaries) {
            self.close_through(index);
        }
    }

    fn apply_implied_closes(&mut self, name: &str) {
        match name {
            "li" => self.close_if_open(&["li"], LIST_ITEM_BOUNDARIES),
            "dd" | "dt" => self.close_if_open(&["dd", "dt"], DEFINITION_BOUNDARIES),
            "tr" => self.close_if_open(&["tr"], &["table", "thead", "tbody", "tfoot"]),
            "td" | "th" => self.close_if_open(&["td", "th"], &["tr", "table"]),
            "thead" | "tbody" | "tfoot" => {
                self.close_if_open(&["thead", "tbody", "tfoot"], &["table"])
            }
            "option" => self.close_if_open(&["option"], &["select", "datalist", "optgroup"]),
            "optgroup" => {
                self.close_if_open(&["option"], &["select", "datalist", "optgroup"]);
                self.close_if_open(&["optgroup"], &["select", "datalist"]);
            }
            "a" => self.close_if_open(&["a"], SCOPE),
            "button" => self.close_if_open(&["button"], SCOPE),
            _ => {}
        }
        if closes_paragraph(name) {
            self.close_if_open(&["p"], SCOPE);
        }
        if is_heading(name) {
            self.close_if_open(HEADINGS, SCOPE);
        }
    }

    fn start_tag(&mut self, name: String, attributes: Vec<Attribute>) {
        if is_document_wrapper(&name) {
            return;
        }
        self.apply_implied_closes(&name);

        let element = Element {
            attributes: attributes.into_iter().collect(),
            children: Vec::new(),
            name,
        };
        if is_void_element(&element.name) {
            self.current().push_child(Node::Element(element));
            return;
        }
        if self.depth() >= self.max_depth {
            log::debug!(
                "Nesting limit {} reached, flattening <{}>",
                self.max_depth,
                element.name
            );
            return;
        }
        self.stack.push(element);
    }

    fn end_tag(&mut self, name: &str) {
        if is_void_element(name) || is_document_wrapper(name) {
            return;
        }
        let matching = self
            .stack
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .find(|(_, element)| element.name == name)
            .map(|(index, _)| index);
        match matching {
            Some(index) => self.close_through(index),
            None => log::debug!("Discarding stray </{}>", name),
        }
    }

    fn text(&mut self, text: String) {
        if !text.is_empty() {
            self.current().push_child(Node::Text(text));
        }
    }

    fn finish(mut self) -> Node {
        self.close_through(1);
        Node::Element(self.stack.pop().unwrap_or_else(Element::root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;
    use pretty_assertions::assert_eq;

    /// Compact rendering: `p("text",b("x"))`, comments as `!`.
    fn outline(node: &Node) -> String {
        match node {
            Node::Text(text) => format!("{:?}", text),
            Node::Comment(_) => "!".to_string(),
            Node::Element(element) => {
                let children: Vec<String> = element.children.iter().map(outline).collect();
                if element.is_root() {
                    children.join(",")
                } else {
                    format!("{}({})", element.name, children.join(","))
                }
            }
        }
    }

    fn parse(input: &str) -> String {
        outline(&build(Tokenizer::new(input)))
    }

    #[test]
    fn auto_closes_at_end_of_input() {
        assert_eq!(parse("<p>unterminated"), r#"p("unterminated")"#);
        assert_eq!(parse("<div><span>a"), r#"div(span("a"))"#);
    }

    #[test]
    fn stray_end_tags_are_discarded() {
        assert_eq!(parse("a</b>c</div>"), r#""ac""#);
    }

    #[test]
    fn end_tag_closes_innermost_match() {
        assert_eq!(parse("<div><b><i>x</div>y"), r#"div(b(i("x"))),"y""#);
        assert_eq!(parse("<b><b>x</b>y</b>"), r#"b(b("x"),"y")"#);
    }

    #[test]
    fn void_elements_take_no_children() {
        assert_eq!(parse("<p>a<br>b<img src=x>c</br></p>"), r#"p("a",br(),"b",img(),"c")"#);
    }

    #[test]
    fn self_closing_flag_is_ignored_on_normal_elements() {
        assert_eq!(parse("<div/>x"), r#"div("x")"#);
    }

    #[test]
    fn block_start_closes_paragraph() {
        assert_eq!(parse("<p>one<div>two</div>"), r#"p("one"),div("two")"#);
        assert_eq!(parse("<p>one<p>two"), r#"p("one"),p("two")"#);
        assert_eq!(parse("<p><span>a<h2>b</h2>"), r#"p(span("a")),h2("b")"#);
    }

    #[test]
    fn table_cells_shield_paragraph() {
        assert_eq!(
            parse("<p>a<table><tr><td>b<p>c<div>d</div></table>"),
            r#"p("a"),table(tr(td("b",p("c"),div("d"))))"#
        );
    }

    #[test]
    fn inline_wrappers_do_not_shield_implied_closes() {
        assert_eq!(
            parse("<p><button>x<div>y</div></button>z"),
            r#"p(button("x")),div("y"),"z""#
        );
        assert_eq!(parse("<h1><span>a<h2>b"), r#"h1(span("a")),h2("b")"#);
    }

    #[test]
    fn list_items_close_siblings() {
        assert_eq!(
            parse("<ul><li>a<li>b<ul><li>c</ul></ul>"),
            r#"ul(li("a"),li("b",ul(li("c"))))"#
        );
        assert_eq!(parse("<dl><dt>t<dd>d<dt>u</dl>"), r#"dl(dt("t"),dd("d"),dt("u"))"#);
    }

    #[test]
    fn table_parts_close_siblings() {
        assert_eq!(
            parse("<table><tr><td>a<td>b<tr><th>c</table>"),
            r#"table(tr(td("a"),td("b")),tr(th("c")))"#
        );
    }

    #[test]
    fn nested_links_are_split() {
        assert_eq!(parse("<a>1<a>2</a>"), r#"a("1"),a("2")"#);
    }

    #[test]
    fn headings_do_not_nest() {
        assert_eq!(parse("<h1>a<h2>b"), r#"h1("a"),h2("b")"#);
    }

    #[test]
    fn document_wrappers_are_dropped() {
        assert_eq!(
            parse("<html><head></head><body><p>x</p></body></html>"),
            r#"p("x")"#
        );
    }

    #[test]
    fn duplicate_attributes_last_value_wins() {
        let root = build(Tokenizer::new(r#"<a title="1" href="/" title="2">"#));
        let Node::Element(root) = root else {
            panic!("root must be an element");
        };
        let link = root.children[0].as_element().unwrap();
        let attrs: Vec<(&str, &str)> = link
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(attrs, vec![("title", "2"), ("href", "/")]);
    }

    #[test]
    fn nesting_is_capped() {
        let input = "<div>".repeat(10) + "deep";
        let root = TreeBuilder::with_max_depth(3).build(Tokenizer::new(&input));
        assert_eq!(outline(&root), r#"div(div(div("deep")))"#);
    }

    #[test]
    fn requested_depth_is_clamped() {
        let input = "<b>".repeat(MAX_NESTING_DEPTH + 10);
        let root = TreeBuilder::with_max_depth(usize::MAX).build(Tokenizer::new(&input));
        let mut depth = 0;
        let mut node = &root;
        while let Some(child) = node.as_element().and_then(|e| e.children.first()) {
            depth += 1;
            node = child;
        }
        assert_eq!(depth, MAX_NESTING_DEPTH);
    }

    #[test]
    fn disallowed_boundaries_do_not_shield() {
        let policy = Policy::builder().allow_elements(["p", "div", "li"]).build().unwrap();
        let parse_for = |input: &str| {
            outline(&TreeBuilder::for_policy(&policy).build(Tokenizer::new(input)))
        };
        assert_eq!(parse_for("<p>a<td>b<div>c"), r#"p("a",td("b")),div("c")"#);
        assert_eq!(
            parse_for("<ul><li>a<ul><li>b</ul></ul>"),
            r#"ul(li("a",ul()),li("b"))"#
        );
        assert_eq!(parse("<p>a<td>b<div>c"), r#"p("a",td("b",div("c")))"#);
    }

    #[test]
    fn optgroup_closes_open_option_and_group() {
        assert_eq!(
            parse("<select><optgroup><option>a<optgroup><option>b</select>"),
            r#"select(optgroup(option("a")),optgroup(option("b")))"#
        );
    }

    #[test]
    fn comments_and_text_attach_to_current_element() {
        assert_eq!(parse("<p>a<!--c-->b</p>"), r#"p("a",!,"b")"#);
    }
}

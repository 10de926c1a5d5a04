/// A single `name="value"` pair as it appeared in a start tag.
///
/// Names are ASCII-lowercased and values are already entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag {
        name: String,
        /// Source order, duplicates included.
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    Comment(String),
    EndOfInput,
}

impl Token {
    pub fn start_tag(name: &str) -> Self {
        Token::StartTag {
            name: name.to_string(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    pub fn end_tag(name: &str) -> Self {
        Token::EndTag {
            name: name.to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Token::Text(text.to_string())
    }
}

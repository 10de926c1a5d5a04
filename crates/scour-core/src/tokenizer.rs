//! Lazy, error-tolerant markup tokenizer.
//!
//! The tokenizer never fails. Constructs it cannot complete (an unterminated tag, a stray
//! `<`) come out as literal text, which the serializer later escapes. Names are
//! ASCII-lowercased; text and attribute values are decoded once via [`crate::entities`].
//!
//! Raw-text containers (`script`, `style`, ...) switch the tokenizer into a mode where the
//! content up to the matching end tag is a single text token, so `<` inside them is never
//! read as a nested tag.
use memchr::{memchr, memmem};

use crate::entities::{decode_attribute, decode_text};
use crate::node::{content_model, ContentModel};
use crate::token::{Attribute, Token};

const COMMENT_OPEN: &[u8] = b"<!--";
const DOCTYPE: &[u8] = b"<!doctype";

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C')
}

fn starts_with_ignore_ascii_case_at(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

fn replace_nul(s: String) -> String {
    if s.contains('\0') {
        s.replace('\0', "\u{FFFD}")
    } else {
        s
    }
}

fn lower_name(s: &str) -> String {
    replace_nul(s.to_ascii_lowercase())
}

/// Tokenizes the whole input eagerly. Prefer [`Tokenizer`] when streaming into a builder.
pub fn tokenize(input: &str) -> Vec<Token> {
    Tokenizer::new(input).collect()
}

#[derive(Debug)]
struct RawRun {
    name: String,
    model: ContentModel,
}

struct ParsedTag {
    name: String,
    attributes: Vec<Attribute>,
    self_closing: bool,
    end: usize,
}

/// Iterator over the tokens of `input`. Always ends with a single [`Token::EndOfInput`].
#[derive(Debug)]
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    raw: Option<RawRun>,
    pending: Option<Token>,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw: None,
            pending: None,
            finished: false,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    /// Produces the next token, or `None` when the construct at the cursor emits nothing
    /// (a doctype, `</>`, an empty raw run).
    fn step(&mut self) -> Option<Token> {
        if let Some(run) = self.raw.take() {
            return self.raw_text(run);
        }

        let bytes = self.bytes();
        if self.starts_markup(self.pos) {
            self.markup()
        } else {
            let start = self.pos;
            let mut i = start + 1;
            let end = loop {
                match memchr(b'<', &bytes[i..]) {
                    Some(rel) if self.starts_markup(i + rel) => break i + rel,
                    Some(rel) => i += rel + 1,
                    None => break bytes.len(),
                }
            };
            self.pos = end;
            Some(Token::Text(replace_nul(decode_text(&self.input[start..end]))))
        }
    }

    fn starts_markup(&self, at: usize) -> bool {
        let bytes = self.bytes();
        if bytes.get(at) != Some(&b'<') {
            return false;
        }
        match bytes.get(at + 1) {
            Some(b) if b.is_ascii_alphabetic() => true,
            Some(b'/') | Some(b'!') | Some(b'?') => true,
            _ => false,
        }
    }

    fn markup(&mut self) -> Option<Token> {
        let bytes = self.bytes();
        let at = self.pos;

        if bytes[at..].starts_with(COMMENT_OPEN) {
            return Some(self.comment(at + COMMENT_OPEN.len()));
        }
        if starts_with_ignore_ascii_case_at(bytes, at, DOCTYPE) {
            self.pos = memchr(b'>', &bytes[at..]).map_or(bytes.len(), |rel| at + rel + 1);
            return None;
        }

        match bytes.get(at + 1) {
            Some(b'!') => Some(self.bogus_comment(at + 2)),
            Some(b'?') => Some(self.bogus_comment(at + 1)),
            Some(b'/') => match bytes.get(at + 2) {
                Some(b) if b.is_ascii_alphabetic() => match self.parse_tag(at + 2) {
                    Some(tag) => {
                        self.pos = tag.end;
                        Some(Token::EndTag { name: tag.name })
                    }
                    None => Some(self.literal_rest(at)),
                },
                Some(b'>') => {
                    self.pos = at + 3;
                    None
                }
                Some(_) => Some(self.bogus_comment(at + 2)),
                None => Some(self.literal_rest(at)),
            },
            _ => match self.parse_tag(at + 1) {
                Some(tag) => {
                    self.pos = tag.end;
                    let model = content_model(&tag.name);
                    if model != ContentModel::Markup {
                        self.raw = Some(RawRun {
                            name: tag.name.clone(),
                            model,
                        });
                    }
                    Some(Token::StartTag {
                        name: tag.name,
                        attributes: tag.attributes,
                        self_closing: tag.self_closing,
                    })
                }
                None => Some(self.literal_rest(at)),
            },
        }
    }

    /// An unterminated tag: the remainder of the input is plain text.
    fn literal_rest(&mut self, at: usize) -> Token {
        self.pos = self.input.len();
        Token::Text(replace_nul(decode_text(&self.input[at..])))
    }

    fn comment(&mut self, body: usize) -> Token {
        let bytes = self.bytes();
        match bytes.get(body) {
            Some(b'>') => {
                self.pos = body + 1;
                return Token::Comment(String::new());
            }
            Some(b'-') if bytes.get(body + 1) == Some(&b'>') => {
                self.pos = body + 2;
                return Token::Comment(String::new());
            }
            _ => {}
        }

        let mut search = body;
        while let Some(rel) = memmem::find(&bytes[search..], b"--") {
            let dashes = search + rel;
            let terminator = if bytes.get(dashes + 2) == Some(&b'>') {
                Some(3)
            } else if bytes[dashes + 2..].starts_with(b"!>") {
                Some(4)
            } else {
                None
            };
            if let Some(len) = terminator {
                self.pos = dashes + len;
                return Token::Comment(replace_nul(self.input[body..dashes].to_string()));
            }
            search = dashes + 1;
        }

        self.pos = bytes.len();
        Token::Comment(replace_nul(self.input[body..].to_string()))
    }

    fn bogus_comment(&mut self, body: usize) -> Token {
        let bytes = self.bytes();
        let end = memchr(b'>', &bytes[body..]).map_or(bytes.len(), |rel| body + rel);
        self.pos = (end + 1).min(bytes.len());
        Token::Comment(replace_nul(self.input[body..end].to_string()))
    }

    /// Parses a tag whose name begins at `name_start`. Returns `None` if the input ends
    /// before the closing `>`.
    fn parse_tag(&self, name_start: usize) -> Option<ParsedTag> {
        let bytes = self.bytes();
        let len = bytes.len();
        let mut k = name_start;
        while k < len && !is_space(bytes[k]) && bytes[k] != b'/' && bytes[k] != b'>' {
            k += 1;
        }
        let name = lower_name(&self.input[name_start..k]);
        let mut attributes = Vec::new();

        loop {
            while k < len && is_space(bytes[k]) {
                k += 1;
            }
            if k >= len {
                return None;
            }
            match bytes[k] {
                b'>' => {
                    return Some(ParsedTag {
                        name,
                        attributes,
                        self_closing: false,
                        end: k + 1,
                    })
                }
                b'/' => {
                    if bytes.get(k + 1) == Some(&b'>') {
                        return Some(ParsedTag {
                            name,
                            attributes,
                            self_closing: true,
                            end: k + 2,
                        });
                    }
                    k += 1;
                }
                _ => {
                    let attr_start = k;
                    // The first character may be `=`; afterwards `=` ends the name.
                    k += 1;
                    while k < len
                        && !is_space(bytes[k])
                        && !matches!(bytes[k], b'/' | b'>' | b'=')
                    {
                        k += 1;
                    }
                    let attr_name = lower_name(&self.input[attr_start..k]);
                    while k < len && is_space(bytes[k]) {
                        k += 1;
                    }

                    let mut value = String::new();
                    if k < len && bytes[k] == b'=' {
                        k += 1;
                        while k < len && is_space(bytes[k]) {
                            k += 1;
                        }
                        if k >= len {
                            return None;
                        }
                        match bytes[k] {
                            quote @ (b'"' | b'\'') => {
                                let value_start = k + 1;
                                let value_end = value_start + memchr(quote, &bytes[value_start..])?;
                                value = decode_attribute(&self.input[value_start..value_end]);
                                k = value_end + 1;
                            }
                            b'>' => {}
                            _ => {
                                let value_start = k;
                                while k < len && !is_space(bytes[k]) && bytes[k] != b'>' {
                                    k += 1;
                                }
                                value = decode_attribute(&self.input[value_start..k]);
                            }
                        }
                    }
                    attributes.push(Attribute::new(attr_name, replace_nul(value)));
                }
            }
        }
    }

    fn raw_text(&mut self, run: RawRun) -> Option<Token> {
        let bytes = self.bytes();
        let start = self.pos;

        if run.model == ContentModel::PlainText {
            self.pos = bytes.len();
            return (start < bytes.len())
                .then(|| Token::Text(replace_nul(self.input[start..].to_string())));
        }

        let (text_end, resume) = match self.find_close_tag(start, &run.name) {
            Some((close_start, close_end)) => (close_start, close_end),
            None => (bytes.len(), bytes.len()),
        };
        self.pos = resume;

        let end_tag = Token::EndTag { name: run.name };
        if text_end == start {
            return Some(end_tag);
        }
        let raw = &self.input[start..text_end];
        let text = match run.model {
            ContentModel::EscapableRawText => decode_text(raw),
            _ => raw.to_string(),
        };
        self.pending = Some(end_tag);
        Some(Token::Text(replace_nul(text)))
    }

    /// Finds `</name` followed by whitespace, `/` or `>`, returning the offset of `<` and
    /// the offset just past the tag's `>`.
    fn find_close_tag(&self, from: usize, name: &str) -> Option<(usize, usize)> {
        let bytes = self.bytes();
        let name = name.as_bytes();
        let mut i = from;
        while let Some(rel) = memmem::find(&bytes[i..], b"</") {
            let open = i + rel;
            let after_name = open + 2 + name.len();
            if starts_with_ignore_ascii_case_at(bytes, open + 2, name) {
                match bytes.get(after_name) {
                    Some(&b) if is_space(b) || b == b'/' || b == b'>' => {
                        let end = memchr(b'>', &bytes[after_name..])
                            .map_or(bytes.len(), |rel| after_name + rel + 1);
                        return Some((open, end));
                    }
                    _ => {}
                }
            }
            i = open + 2;
        }
        None
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }
        loop {
            if self.raw.is_none() && self.pos >= self.input.len() {
                if self.finished {
                    return None;
                }
                self.finished = true;
                return Some(Token::EndOfInput);
            }
            if let Some(token) = self.step() {
                return Some(token);
            }
        }
    }
}

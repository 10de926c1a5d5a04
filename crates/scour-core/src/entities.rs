//! Character reference decoding.
//!
//! Every reference is decoded exactly once: the decoder never looks at its own output, so
//! `&amp;lt;` becomes the literal text `&lt;` and stays that way.
//!
//! - Named references come from a fixed table of common names and must end in `;`, except
//!   the legacy names `amp lt gt quot nbsp copy reg`, which browsers also accept bare.
//!   Inside attribute values a bare legacy name is left alone when followed by an
//!   alphanumeric or `=` (so query strings like `?a=1&copy=2` survive).
//! - Numeric references (`&#38;`, `&#x26;`) take an optional `;`. NUL, surrogates and
//!   values past U+10FFFF decode to U+FFFD.
//! - Anything else is copied through unchanged.
use memchr::memchr;

const REPLACEMENT: char = '\u{FFFD}';
const MAX_NAME_LEN: usize = 32;

const NAMED: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{00A0}"),
    ("copy", "\u{00A9}"),
    ("reg", "\u{00AE}"),
    ("trade", "\u{2122}"),
    ("hellip", "\u{2026}"),
    ("mdash", "\u{2014}"),
    ("ndash", "\u{2013}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("laquo", "\u{00AB}"),
    ("raquo", "\u{00BB}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{00B7}"),
    ("deg", "\u{00B0}"),
    ("times", "\u{00D7}"),
    ("divide", "\u{00F7}"),
    ("plusmn", "\u{00B1}"),
    ("sect", "\u{00A7}"),
    ("para", "\u{00B6}"),
    ("cent", "\u{00A2}"),
    ("pound", "\u{00A3}"),
    ("yen", "\u{00A5}"),
    ("euro", "\u{20AC}"),
    ("shy", "\u{00AD}"),
    ("iexcl", "\u{00A1}"),
    ("iquest", "\u{00BF}"),
    ("larr", "\u{2190}"),
    ("rarr", "\u{2192}"),
    ("uarr", "\u{2191}"),
    ("darr", "\u{2193}"),
    ("colon", ":"),
    ("semi", ";"),
    ("comma", ","),
    ("period", "."),
    ("excl", "!"),
    ("quest", "?"),
    ("num", "#"),
    ("percnt", "%"),
    ("sol", "/"),
    ("bsol", "\\"),
    ("lpar", "("),
    ("rpar", ")"),
    ("equals", "="),
    ("Tab", "\t"),
    ("NewLine", "\n"),
];

const LEGACY: &[&str] = &["amp", "lt", "gt", "quot", "nbsp", "copy", "reg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Text,
    Attribute,
}

fn lookup(name: &str) -> Option<&'static str> {
    NAMED
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
}

pub fn decode_text(s: &str) -> String {
    decode(s, Context::Text)
}

pub fn decode_attribute(s: &str) -> String {
    decode(s, Context::Attribute)
}

pub fn decode(s: &str, context: Context) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut copy_start = 0;
    let mut i = 0;

    while let Some(rel) = memchr(b'&', &bytes[i..]) {
        i += rel;
        out.push_str(&s[copy_start..i]);
        match decode_reference(s, i, context) {
            Some((replacement, consumed)) => {
                out.push_str(&replacement);
                i += consumed;
            }
            None => {
                out.push('&');
                i += 1;
            }
        }
        copy_start = i;
    }
    out.push_str(&s[copy_start..]);
    out
}

/// Decodes the reference starting at `start` (which holds `&`), returning the replacement
/// and the number of input bytes it covers.
fn decode_reference(s: &str, start: usize, context: Context) -> Option<(String, usize)> {
    let bytes = s.as_bytes();
    if bytes.get(start + 1) == Some(&b'#') {
        return decode_numeric(bytes, start);
    }

    let name_start = start + 1;
    let mut end = name_start;
    while end < bytes.len() && end - name_start < MAX_NAME_LEN && bytes[end].is_ascii_alphanumeric()
    {
        end += 1;
    }
    if end == name_start {
        return None;
    }
    let run = &s[name_start..end];

    if bytes.get(end) == Some(&b';') {
        if let Some(value) = lookup(run) {
            return Some((value.to_string(), end + 1 - start));
        }
    }

    let legacy = LEGACY
        .iter()
        .filter(|name| run.starts_with(**name))
        .max_by_key(|name| name.len())?;
    let after = name_start + legacy.len();
    if context == Context::Attribute {
        let next = bytes.get(after).copied();
        if next.is_some_and(|b| b.is_ascii_alphanumeric() || b == b'=') {
            return None;
        }
    }
    let value = lookup(legacy)?;
    Some((value.to_string(), after - start))
}

fn decode_numeric(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut j = start + 2;
    let hex = matches!(bytes.get(j), Some(b'x') | Some(b'X'));
    if hex {
        j += 1;
    }
    let digits_start = j;
    let radix = if hex { 16 } else { 10 };
    let mut value: u32 = 0;
    let mut overflow = false;
    while j < bytes.len() {
        let Some(digit) = (bytes[j] as char).to_digit(radix) else {
            break;
        };
        value = match value.checked_mul(radix).and_then(|v| v.checked_add(digit)) {
            Some(v) if v <= 0x10FFFF => v,
            _ => {
                overflow = true;
                0x110000
            }
        };
        j += 1;
    }
    if j == digits_start {
        return None;
    }
    if bytes.get(j) == Some(&b';') {
        j += 1;
    }

    let ch = if overflow || value == 0 {
        REPLACEMENT
    } else {
        char::from_u32(value).unwrap_or(REPLACEMENT)
    };
    Some((ch.to_string(), j - start))
}

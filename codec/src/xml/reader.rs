//! Minimal pull tokenizer for the envelope's XML dialect.
//!
//! Tokens carry byte offsets into the source so callers can slice raw
//! fragments back out verbatim. Comments, processing instructions and
//! doctype declarations are skipped. No entity definitions beyond the five
//! predefined ones and numeric character references.

use plex_types::{Format, ProtocolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Start {
        name: &'a str,
        attrs: Vec<(&'a str, String)>,
        empty: bool,
        /// Offset of `<`.
        start: usize,
        /// Offset just past `>`.
        end: usize,
    },
    End {
        name: &'a str,
        start: usize,
    },
    /// Character data, still escaped.
    Text { raw: &'a str, start: usize },
    /// Contents of a CDATA section.
    CData { text: &'a str, start: usize },
}

impl Token<'_> {
    /// Attribute value, unescaped.
    pub(crate) fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Token::Start { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

pub(crate) struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub(crate) fn source(&self) -> &'a str {
        self.src
    }

    pub(crate) fn next_token(&mut self) -> Result<Option<Token<'a>>, ProtocolError> {
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return Ok(None);
            }
            let start = self.pos;

            if !rest.starts_with('<') {
                let len = rest.find('<').unwrap_or(rest.len());
                self.pos += len;
                return Ok(Some(Token::Text {
                    raw: &rest[..len],
                    start,
                }));
            }
            if rest.starts_with("<!--") {
                self.skip_past("-->", "unterminated comment")?;
                continue;
            }
            if let Some(body) = rest.strip_prefix("<![CDATA[") {
                let len = body
                    .find("]]>")
                    .ok_or_else(|| malformed(start, "unterminated CDATA section"))?;
                self.pos += "<![CDATA[".len() + len + "]]>".len();
                return Ok(Some(Token::CData {
                    text: &body[..len],
                    start,
                }));
            }
            if rest.starts_with("<?") {
                self.skip_past("?>", "unterminated processing instruction")?;
                continue;
            }
            if rest.starts_with("<!") {
                self.skip_past(">", "unterminated declaration")?;
                continue;
            }
            if let Some(body) = rest.strip_prefix("</") {
                let len = body
                    .find('>')
                    .ok_or_else(|| malformed(start, "unterminated end tag"))?;
                let name = body[..len].trim_end();
                check_name(name, start)?;
                self.pos += 2 + len + 1;
                return Ok(Some(Token::End { name, start }));
            }
            return self.start_tag(start).map(Some);
        }
    }

    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<(), ProtocolError> {
        let rest = &self.src[self.pos..];
        let len = rest
            .find(terminator)
            .ok_or_else(|| malformed(self.pos, what))?;
        self.pos += len + terminator.len();
        Ok(())
    }

    fn start_tag(&mut self, start: usize) -> Result<Token<'a>, ProtocolError> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut i = start + 1;
        let name_end = src[i..]
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .map_or(src.len(), |off| i + off);
        let name = &src[i..name_end];
        check_name(name, start)?;
        i = name_end;

        let mut attrs = Vec::new();
        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                None => return Err(malformed(start, "unterminated start tag")),
                Some(b'>') => {
                    self.pos = i + 1;
                    return Ok(Token::Start {
                        name,
                        attrs,
                        empty: false,
                        start,
                        end: self.pos,
                    });
                }
                Some(b'/') => {
                    if bytes.get(i + 1) != Some(&b'>') {
                        return Err(malformed(i, "expected '>' after '/'"));
                    }
                    self.pos = i + 2;
                    return Ok(Token::Start {
                        name,
                        attrs,
                        empty: true,
                        start,
                        end: self.pos,
                    });
                }
                Some(_) => {
                    let key_end = src[i..]
                        .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
                        .map_or(src.len(), |off| i + off);
                    let key = &src[i..key_end];
                    check_name(key, i)?;
                    i = key_end;
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    if bytes.get(i) != Some(&b'=') {
                        return Err(malformed(i, "expected '=' after attribute name"));
                    }
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    let quote = match bytes.get(i) {
                        Some(&q) if q == b'"' || q == b'\'' => q as char,
                        _ => return Err(malformed(i, "expected quoted attribute value")),
                    };
                    let value_start = i + 1;
                    let value_len = src[value_start..]
                        .find(quote)
                        .ok_or_else(|| malformed(i, "unterminated attribute value"))?;
                    let raw = &src[value_start..value_start + value_len];
                    if raw.contains('<') {
                        return Err(malformed(value_start, "'<' in attribute value"));
                    }
                    if attrs.iter().any(|(k, _)| *k == key) {
                        return Err(malformed(i, "duplicate attribute"));
                    }
                    attrs.push((key, unescape(raw, value_start)?));
                    i = value_start + value_len + 1;
                }
            }
        }
    }
}

fn check_name(name: &str, offset: usize) -> Result<(), ProtocolError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(malformed(offset, &format!("invalid name '{name}'")))
    }
}

pub(crate) fn malformed(offset: usize, message: &str) -> ProtocolError {
    ProtocolError::Malformed {
        format: Format::Xml,
        message: format!("{message} at byte {offset}"),
    }
}

/// Resolve entity and character references in `raw`.
pub(crate) fn unescape(raw: &str, offset: usize) -> Result<String, ProtocolError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let semi = tail
            .find(';')
            .ok_or_else(|| malformed(offset, "unterminated entity reference"))?;
        let entity = &tail[..semi];
        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or_else(|| {
                    malformed(offset, &format!("unknown entity '&{entity};'"))
                })?
            }
        };
        out.push(ch);
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Escape character data.
pub(crate) fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

/// Escape an attribute value for double quotes. Whitespace control
/// characters become references so they survive attribute normalization.
pub(crate) fn escape_attr(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            other => out.push(other),
        }
    }
}

//! Canonical XML codec.
//!
//! ```text
//! <message>
//!   <parameter name="target">host</parameter>
//!   <data>
//!     <request name="helloworld" format="json" status="failed">
//!       <parameters><parameter name="k">v</parameter></parameters>
//!       <data>raw fragment</data>
//!       <error code="404"><message>..</message><detail>..</detail></error>
//!     </request>
//!   </data>
//! </message>
//! ```
//!
//! The canonical form carries no whitespace between elements. Native
//! fragments are recovered by source span, so nested markup inside a
//! request's `<data>` (including further `<data>` elements) is returned
//! exactly as written.

mod reader;

use plex_types::{
    DATA_KEY, Envelope, EnvelopeBuilder, Fault, Format, Outcome, Params, ProtocolError, Status,
    SubRequest,
};

use crate::Codec;
use reader::{Reader, Token, escape_attr, escape_text, malformed, unescape};

const ROOT: &str = "message";
const PARAMETER: &str = "parameter";
const PARAMETERS: &str = "parameters";
const REQUEST: &str = "request";
const ERROR: &str = "error";

/// XML serializer/parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl Codec for XmlCodec {
    fn format(&self) -> Format {
        Format::Xml
    }

    fn to_message(&self, envelope: &Envelope) -> String {
        let mut out = String::from("<message>");
        push_params(&mut out, envelope.params());
        out.push_str(&self.generate_data(envelope));
        out.push_str("</message>");
        out
    }

    fn generate_data(&self, envelope: &Envelope) -> String {
        let mut out = String::from("<data>");
        for request in envelope.requests() {
            push_request(&mut out, request);
        }
        out.push_str("</data>");
        out
    }

    fn parse(&self, text: &str) -> Result<Envelope, ProtocolError> {
        Parser::new(text).envelope()
    }

    fn validate_fragment(&self, raw: &str) -> Result<(), ProtocolError> {
        check_balanced(raw, false)
    }
}

/// Escape `text` for use as XML character data.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text(&mut out, text);
    out
}

/// Check that `text` is a well-formed document with a single root element.
pub fn validate_document(text: &str) -> Result<(), ProtocolError> {
    check_balanced(text, true)
}

fn check_balanced(text: &str, single_root: bool) -> Result<(), ProtocolError> {
    let mut reader = Reader::new(text);
    let mut stack: Vec<&str> = Vec::new();
    let mut roots = 0usize;
    while let Some(token) = reader.next_token()? {
        match token {
            Token::Start { name, empty, .. } => {
                if stack.is_empty() {
                    roots += 1;
                }
                if !empty {
                    stack.push(name);
                }
            }
            Token::End { name, start } => match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => return Err(mismatch(start, open, name)),
                None => {
                    return Err(ProtocolError::Unbalanced {
                        offset: start,
                        message: format!("unexpected </{name}>"),
                    });
                }
            },
            Token::Text { raw, start } => {
                unescape(raw, start)?;
                if single_root && stack.is_empty() && !raw.trim().is_empty() {
                    return Err(malformed(start, "text outside the root element"));
                }
            }
            Token::CData { start, .. } => {
                if single_root && stack.is_empty() {
                    return Err(malformed(start, "CDATA outside the root element"));
                }
            }
        }
    }
    if let Some(open) = stack.pop() {
        return Err(unclosed(text.len(), open));
    }
    if single_root && roots != 1 {
        return Err(malformed(0, &format!("expected one root element, found {roots}")));
    }
    Ok(())
}

// ============================================================================
// Serialization
// ============================================================================

fn push_param(out: &mut String, key: &str, value: &str) {
    out.push_str("<parameter name=\"");
    escape_attr(out, key);
    out.push_str("\">");
    escape_text(out, value);
    out.push_str("</parameter>");
}

fn push_params(out: &mut String, params: &Params) {
    for (key, values) in params.iter() {
        for value in values {
            push_param(out, key, value);
        }
    }
}

fn push_request(out: &mut String, request: &SubRequest) {
    out.push_str("<request name=\"");
    escape_attr(out, request.name());
    out.push('"');
    if let Some(format) = request.format() {
        out.push_str(" format=\"");
        out.push_str(format.as_str());
        out.push('"');
    }
    if let Some(outcome) = request.outcome() {
        out.push_str(" status=\"");
        out.push_str(outcome.status().as_str());
        out.push('"');
    }
    out.push('>');

    if !request.params().is_empty() {
        out.push_str("<parameters>");
        push_params(out, request.params());
        out.push_str("</parameters>");
    }
    if let Some(raw) = request.data() {
        out.push_str("<data>");
        if request.effective_format(Format::Xml) == Format::Xml {
            out.push_str(raw);
        } else {
            escape_text(out, raw);
        }
        out.push_str("</data>");
    }
    if let Some(fault) = request.outcome().and_then(Outcome::fault) {
        out.push_str("<error code=\"");
        out.push_str(&fault.code.to_string());
        out.push_str("\">");
        if let Some(message) = fault.message() {
            out.push_str("<message>");
            escape_text(out, message);
            out.push_str("</message>");
        }
        if let Some(detail) = fault.detail() {
            out.push_str("<detail>");
            escape_text(out, detail);
            out.push_str("</detail>");
        }
        out.push_str("</error>");
    }
    out.push_str("</request>");
}

// ============================================================================
// Parsing
// ============================================================================

struct Parser<'a> {
    reader: Reader<'a>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            reader: Reader::new(src),
        }
    }

    fn eof(&self, open: &str) -> ProtocolError {
        unclosed(self.reader.source().len(), open)
    }

    /// Next token that is not inter-element whitespace.
    fn next_significant(&mut self, context: &str) -> Result<Option<Token<'a>>, ProtocolError> {
        loop {
            match self.reader.next_token()? {
                Some(Token::Text { raw, .. }) if raw.trim().is_empty() => {}
                Some(Token::Text { start, .. } | Token::CData { start, .. }) => {
                    return Err(unexpected(context, "character data", start));
                }
                other => return Ok(other),
            }
        }
    }

    fn envelope(mut self) -> Result<Envelope, ProtocolError> {
        let root = match self.next_significant("document")? {
            Some(token @ Token::Start { name: ROOT, .. }) => token,
            Some(Token::Start { name, start, .. }) => {
                return Err(unexpected("document", &format!("<{name}>"), start));
            }
            Some(Token::End { name, start }) => {
                return Err(ProtocolError::Unbalanced {
                    offset: start,
                    message: format!("unexpected </{name}>"),
                });
            }
            Some(_) | None => return Err(malformed(0, "missing <message> root element")),
        };

        let mut params = Params::new();
        let mut requests = None;
        if !matches!(root, Token::Start { empty: true, .. }) {
            loop {
                match self.next_significant(ROOT)? {
                    Some(token @ Token::Start { name: PARAMETER, .. }) => {
                        let (key, value) = self.parameter(&token)?;
                        params.append(key, value);
                    }
                    Some(token @ Token::Start { name: DATA_KEY, .. }) => {
                        if requests.is_some() {
                            let offset = start_offset(&token);
                            return Err(unexpected(ROOT, "second <data>", offset));
                        }
                        requests = Some(self.requests(&token)?);
                    }
                    Some(Token::End { name: ROOT, .. }) => break,
                    Some(Token::End { name, start }) => return Err(mismatch(start, ROOT, name)),
                    Some(Token::Start { name, start, .. }) => {
                        return Err(unexpected(ROOT, &format!("<{name}>"), start));
                    }
                    Some(_) => unreachable!("character data is rejected by next_significant"),
                    None => return Err(self.eof(ROOT)),
                }
            }
        }

        if let Some(token) = self.next_significant("document")? {
            return Err(malformed(
                start_offset(&token),
                "content after the root element",
            ));
        }

        let requests = requests.ok_or_else(|| ProtocolError::InvalidField {
            field: DATA_KEY.to_string(),
            message: "missing sub-request list".to_string(),
        })?;
        let mut builder = EnvelopeBuilder::new(Some(params)).xml();
        for request in requests {
            builder = builder.add(request);
        }
        builder.build()
    }

    fn parameter(&mut self, start: &Token<'a>) -> Result<(String, String), ProtocolError> {
        let key = start
            .attr("name")
            .ok_or_else(|| ProtocolError::InvalidField {
                field: PARAMETER.to_string(),
                message: "missing name attribute".to_string(),
            })?
            .to_string();
        let value = self.text_content(start, PARAMETER)?;
        Ok((key, value))
    }

    /// Unescaped character data up to the end tag of `start`.
    fn text_content(&mut self, start: &Token<'a>, tag: &str) -> Result<String, ProtocolError> {
        if matches!(start, Token::Start { empty: true, .. }) {
            return Ok(String::new());
        }
        let mut text = String::new();
        loop {
            match self.reader.next_token()? {
                Some(Token::Text { raw, start }) => text.push_str(&unescape(raw, start)?),
                Some(Token::CData { text: cdata, .. }) => text.push_str(cdata),
                Some(Token::End { name, start }) => {
                    if name != tag {
                        return Err(mismatch(start, tag, name));
                    }
                    return Ok(text);
                }
                Some(Token::Start { name, start, .. }) => {
                    return Err(unexpected(tag, &format!("<{name}>"), start));
                }
                None => return Err(self.eof(tag)),
            }
        }
    }

    /// Source text between the start tag and its matching end tag.
    fn raw_content(&mut self, start: &Token<'a>, tag: &str) -> Result<String, ProtocolError> {
        let content_start = match start {
            Token::Start { empty: true, .. } => return Ok(String::new()),
            Token::Start { end, .. } => *end,
            _ => return Err(malformed(0, "expected a start tag")),
        };
        let mut stack: Vec<&str> = Vec::new();
        loop {
            match self.reader.next_token()? {
                Some(Token::Start {
                    name, empty: false, ..
                }) => stack.push(name),
                Some(Token::End { name, start }) => match stack.pop() {
                    Some(open) if open == name => {}
                    Some(open) => return Err(mismatch(start, open, name)),
                    None if name == tag => {
                        return Ok(self.reader.source()[content_start..start].to_string());
                    }
                    None => return Err(mismatch(start, tag, name)),
                },
                Some(Token::Text { raw, start }) => {
                    unescape(raw, start)?;
                }
                Some(_) => {}
                None => return Err(self.eof(stack.last().copied().unwrap_or(tag))),
            }
        }
    }

    fn requests(&mut self, start: &Token<'a>) -> Result<Vec<SubRequest>, ProtocolError> {
        let mut requests = Vec::new();
        if matches!(start, Token::Start { empty: true, .. }) {
            return Ok(requests);
        }
        loop {
            match self.next_significant(DATA_KEY)? {
                Some(token @ Token::Start { name: REQUEST, .. }) => {
                    let index = requests.len();
                    requests.push(self.request(&token, index)?);
                }
                Some(Token::End { name: DATA_KEY, .. }) => return Ok(requests),
                Some(Token::End { name, start }) => return Err(mismatch(start, DATA_KEY, name)),
                Some(Token::Start { name, start, .. }) => {
                    return Err(unexpected(DATA_KEY, &format!("<{name}>"), start));
                }
                Some(_) => unreachable!("character data is rejected by next_significant"),
                None => return Err(self.eof(DATA_KEY)),
            }
        }
    }

    fn request(&mut self, start: &Token<'a>, index: usize) -> Result<SubRequest, ProtocolError> {
        let name = match start.attr("name") {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => return Err(ProtocolError::MissingName { index }),
        };
        let format = start.attr("format").map(Format::parse).transpose()?;
        let status = start.attr("status").map(Status::parse).transpose()?;
        let native = format.unwrap_or(Format::Xml) == Format::Xml;

        let mut params = Params::new();
        let mut data = None;
        let mut fault = None;
        if !matches!(start, Token::Start { empty: true, .. }) {
            loop {
                match self.next_significant(REQUEST)? {
                    Some(token @ Token::Start { name: PARAMETERS, .. }) => {
                        self.parameters(&token, &mut params)?;
                    }
                    Some(token @ Token::Start { name: DATA_KEY, .. }) => {
                        data = Some(if native {
                            self.raw_content(&token, DATA_KEY)?
                        } else {
                            self.text_content(&token, DATA_KEY)?
                        });
                    }
                    Some(token @ Token::Start { name: ERROR, .. }) => {
                        fault = Some(self.fault(&token)?);
                    }
                    Some(Token::End { name: REQUEST, .. }) => break,
                    Some(Token::End { name, start }) => return Err(mismatch(start, REQUEST, name)),
                    Some(Token::Start { name, start, .. }) => {
                        return Err(unexpected(REQUEST, &format!("<{name}>"), start));
                    }
                    Some(_) => unreachable!("character data is rejected by next_significant"),
                    None => return Err(self.eof(REQUEST)),
                }
            }
        }

        let mut builder = SubRequest::builder(name).params(params);
        if let Some(format) = format {
            builder = builder.format(format);
        }
        if let Some(data) = data {
            builder = builder.data(data);
        }
        if let Some(status) = status {
            builder = builder.outcome(match status {
                Status::Succeeded => Outcome::Succeeded,
                Status::Failed => Outcome::Failed(fault.unwrap_or_default()),
                Status::TimedOut => Outcome::TimedOut,
            });
        }
        builder
            .build()
            .map_err(|_| ProtocolError::MissingName { index })
    }

    fn parameters(&mut self, start: &Token<'a>, params: &mut Params) -> Result<(), ProtocolError> {
        if matches!(start, Token::Start { empty: true, .. }) {
            return Ok(());
        }
        loop {
            match self.next_significant(PARAMETERS)? {
                Some(token @ Token::Start { name: PARAMETER, .. }) => {
                    let (key, value) = self.parameter(&token)?;
                    params.append(key, value);
                }
                Some(Token::End { name: PARAMETERS, .. }) => return Ok(()),
                Some(Token::End { name, start }) => return Err(mismatch(start, PARAMETERS, name)),
                Some(Token::Start { name, start, .. }) => {
                    return Err(unexpected(PARAMETERS, &format!("<{name}>"), start));
                }
                Some(_) => unreachable!("character data is rejected by next_significant"),
                None => return Err(self.eof(PARAMETERS)),
            }
        }
    }

    fn fault(&mut self, start: &Token<'a>) -> Result<Fault, ProtocolError> {
        let code = match start.attr("code") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ProtocolError::InvalidField {
                field: "error code".to_string(),
                message: format!("'{raw}' is not a numeric code"),
            })?,
            None => Fault::GENERAL_ERROR,
        };
        let mut fault = Fault::new(code);
        if matches!(start, Token::Start { empty: true, .. }) {
            return Ok(fault);
        }
        loop {
            match self.next_significant(ERROR)? {
                Some(token @ Token::Start { name: "message", .. }) => {
                    fault.message = Some(self.text_content(&token, "message")?);
                }
                Some(token @ Token::Start { name: "detail", .. }) => {
                    fault.detail = Some(self.text_content(&token, "detail")?);
                }
                Some(Token::End { name: ERROR, .. }) => return Ok(fault),
                Some(Token::End { name, start }) => return Err(mismatch(start, ERROR, name)),
                Some(Token::Start { name, start, .. }) => {
                    return Err(unexpected(ERROR, &format!("<{name}>"), start));
                }
                Some(_) => unreachable!("character data is rejected by next_significant"),
                None => return Err(self.eof(ERROR)),
            }
        }
    }
}

fn start_offset(token: &Token<'_>) -> usize {
    match token {
        Token::Start { start, .. }
        | Token::End { start, .. }
        | Token::Text { start, .. }
        | Token::CData { start, .. } => *start,
    }
}

fn unexpected(context: &str, what: &str, offset: usize) -> ProtocolError {
    ProtocolError::InvalidField {
        field: context.to_string(),
        message: format!("unexpected {what} at byte {offset}"),
    }
}

fn mismatch(offset: usize, open: &str, found: &str) -> ProtocolError {
    ProtocolError::Unbalanced {
        offset,
        message: format!("expected </{open}>, found </{found}>"),
    }
}

fn unclosed(offset: usize, open: &str) -> ProtocolError {
    ProtocolError::Unbalanced {
        offset,
        message: format!("unclosed <{open}>"),
    }
}

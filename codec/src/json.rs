//! Canonical JSON codec.
//!
//! Parsing walks objects with hand-written visitors so that key order and
//! repeated keys survive; native `data` members are captured as
//! [`RawValue`]s and unwrapped back to the exact fragment text.

use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use serde_json::value::RawValue;

use plex_types::{
    DATA_KEY, Envelope, EnvelopeBuilder, Fault, Format, Outcome, Params, ProtocolError, Status,
    SubRequest,
};

use crate::Codec;

/// JSON serializer/parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn to_message(&self, envelope: &Envelope) -> String {
        let mut out = String::from("{");
        for (key, values) in envelope.params().iter() {
            push_str_literal(&mut out, key);
            out.push(':');
            match values {
                [single] => push_str_literal(&mut out, single),
                many => push_str_array(&mut out, many),
            }
            out.push(',');
        }
        push_str_literal(&mut out, DATA_KEY);
        out.push(':');
        out.push_str(&self.generate_data(envelope));
        out.push('}');
        out
    }

    fn generate_data(&self, envelope: &Envelope) -> String {
        let mut out = String::from("[");
        for (idx, request) in envelope.requests().iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            push_entry(&mut out, request);
        }
        out.push(']');
        out
    }

    fn parse(&self, text: &str) -> Result<Envelope, ProtocolError> {
        let wire: WireEnvelope = serde_json::from_str(text).map_err(malformed)?;
        let entries = wire.entries.ok_or_else(|| ProtocolError::InvalidField {
            field: DATA_KEY.to_string(),
            message: "missing sub-request list".to_string(),
        })?;

        let mut builder = EnvelopeBuilder::new(Some(wire.params)).json();
        for (index, entry) in entries.into_iter().enumerate() {
            builder = builder.add(entry.into_request(index)?);
        }
        builder.build()
    }

    fn validate_fragment(&self, raw: &str) -> Result<(), ProtocolError> {
        serde_json::from_str::<IgnoredAny>(&format!("{{{raw}}}"))
            .map(|_| ())
            .map_err(|err| ProtocolError::InvalidField {
                field: DATA_KEY.to_string(),
                message: format!("fragment is not a list of JSON members: {err}"),
            })
    }
}

fn malformed(err: serde_json::Error) -> ProtocolError {
    ProtocolError::Malformed {
        format: Format::Json,
        message: err.to_string(),
    }
}

fn push_str_literal(out: &mut String, value: &str) {
    out.push_str(&Value::from(value).to_string());
}

fn push_str_array(out: &mut String, values: &[String]) {
    out.push('[');
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        push_str_literal(out, value);
    }
    out.push(']');
}

fn push_entry(out: &mut String, request: &SubRequest) {
    out.push_str("{\"name\":");
    push_str_literal(out, request.name());

    if let Some(format) = request.format() {
        out.push_str(",\"format\":");
        push_str_literal(out, format.as_str());
    }
    if let Some(outcome) = request.outcome() {
        out.push_str(",\"status\":");
        push_str_literal(out, outcome.status().as_str());
    }
    if !request.params().is_empty() {
        out.push_str(",\"parameters\":{");
        for (idx, (key, values)) in request.params().iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            push_str_literal(out, key);
            out.push(':');
            push_str_array(out, values);
        }
        out.push('}');
    }
    if let Some(raw) = request.data() {
        out.push_str(",\"data\":");
        if request.effective_format(Format::Json) == Format::Json {
            out.push('{');
            out.push_str(raw);
            out.push('}');
        } else {
            push_str_literal(out, raw);
        }
    }
    if let Some(fault) = request.outcome().and_then(Outcome::fault) {
        out.push_str(",\"error\":{\"code\":");
        out.push_str(&fault.code.to_string());
        if let Some(message) = fault.message() {
            out.push_str(",\"message\":");
            push_str_literal(out, message);
        }
        if let Some(detail) = fault.detail() {
            out.push_str(",\"detail\":");
            push_str_literal(out, detail);
        }
        out.push('}');
    }
    out.push('}');
}

// ============================================================================
// Wire structures
// ============================================================================

struct WireEnvelope {
    params: Params,
    entries: Option<Vec<WireEntry>>,
}

struct WireEntry {
    name: Option<String>,
    format: Option<String>,
    status: Option<String>,
    params: Params,
    data: Option<Box<RawValue>>,
    error: Option<WireFault>,
}

#[derive(Deserialize)]
struct WireFault {
    code: u16,
    message: Option<String>,
    detail: Option<String>,
}

impl From<WireFault> for Fault {
    fn from(wire: WireFault) -> Self {
        Fault {
            code: wire.code,
            message: wire.message,
            detail: wire.detail,
        }
    }
}

impl WireEntry {
    fn into_request(self, index: usize) -> Result<SubRequest, ProtocolError> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(ProtocolError::MissingName { index }),
        };
        let format = self.format.as_deref().map(Format::parse).transpose()?;

        let mut builder = SubRequest::builder(name).params(self.params);
        if let Some(format) = format {
            builder = builder.format(format);
        }
        if let Some(raw) = self.data {
            let native = format.unwrap_or(Format::Json) == Format::Json;
            builder = builder.data(decode_data(raw.get(), native)?);
        }
        if let Some(status) = self.status.as_deref() {
            let outcome = match Status::parse(status)? {
                Status::Succeeded => Outcome::Succeeded,
                Status::Failed => {
                    Outcome::Failed(self.error.map(Fault::from).unwrap_or_default())
                }
                Status::TimedOut => Outcome::TimedOut,
            };
            builder = builder.outcome(outcome);
        }
        builder
            .build()
            .map_err(|_| ProtocolError::MissingName { index })
    }
}

/// Recover the fragment text from the raw `data` member.
fn decode_data(raw: &str, native: bool) -> Result<String, ProtocolError> {
    if native {
        return raw
            .strip_prefix('{')
            .and_then(|inner| inner.strip_suffix('}'))
            .map(ToString::to_string)
            .ok_or_else(|| ProtocolError::InvalidField {
                field: DATA_KEY.to_string(),
                message: "native JSON data must be an object".to_string(),
            });
    }
    serde_json::from_str::<String>(raw).map_err(|_| ProtocolError::InvalidField {
        field: DATA_KEY.to_string(),
        message: "foreign data must be a JSON string".to_string(),
    })
}

// ============================================================================
// Visitors
// ============================================================================

impl<'de> Deserialize<'de> for WireEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EnvelopeVisitor)
    }
}

struct EnvelopeVisitor;

impl<'de> Visitor<'de> for EnvelopeVisitor {
    type Value = WireEnvelope;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an envelope object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut params = Params::new();
        let mut entries = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == DATA_KEY {
                if entries.is_some() {
                    return Err(de::Error::duplicate_field("data"));
                }
                entries = Some(map.next_value::<Vec<WireEntry>>()?);
            } else {
                let ParamValues(values) = map.next_value()?;
                params.extend_key(key, values);
            }
        }
        Ok(WireEnvelope { params, entries })
    }
}

impl<'de> Deserialize<'de> for WireEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EntryVisitor)
    }
}

struct EntryVisitor;

impl<'de> Visitor<'de> for EntryVisitor {
    type Value = WireEntry;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sub-request object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entry = WireEntry {
            name: None,
            format: None,
            status: None,
            params: Params::new(),
            data: None,
            error: None,
        };
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "name" => entry.name = Some(map.next_value()?),
                "format" => entry.format = Some(map.next_value()?),
                "status" => entry.status = Some(map.next_value()?),
                "parameters" => map.next_value_seed(ParamsSeed(&mut entry.params))?,
                "data" => entry.data = Some(map.next_value()?),
                "error" => entry.error = Some(map.next_value()?),
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(entry)
    }
}

/// Appends an object of `key: value | [values]` into existing params.
struct ParamsSeed<'p>(&'p mut Params);

impl<'de> DeserializeSeed<'de> for ParamsSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ParamsSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a parameter object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            let ParamValues(values) = map.next_value()?;
            self.0.extend_key(key, values);
        }
        Ok(())
    }
}

/// A string or an array of strings.
struct ParamValues(Vec<String>);

impl<'de> Deserialize<'de> for ParamValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamValuesVisitor)
    }
}

struct ParamValuesVisitor;

impl<'de> Visitor<'de> for ParamValuesVisitor {
    type Value = ParamValues;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or an array of strings")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(ParamValues(vec![value.to_string()]))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(ParamValues(vec![value]))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element::<String>()? {
            values.push(value);
        }
        Ok(ParamValues(values))
    }
}

#[cfg(test)]
mod tests {
    use super::JsonCodec;
    use crate::Codec;
    use plex_types::{Envelope, Format, ProtocolError, SubRequest};
    use serde_json::Value;

    fn hello(raw: Option<&str>) -> SubRequest {
        let mut builder = SubRequest::builder("helloworld")
            .parameter("action", "sayhello")
            .parameter("name", "tom")
            .parameter("name", "nick");
        if let Some(raw) = raw {
            builder = builder.data(raw);
        }
        builder.build().unwrap()
    }

    #[test]
    fn canonical_shape() {
        let env = Envelope::builder()
            .parameter("target", "h")
            .add(hello(Some(r#""raw_json":{"l":"k"}"#)))
            .build()
            .unwrap();
        assert_eq!(
            JsonCodec.to_message(&env),
            r#"{"target":"h","data":[{"name":"helloworld","parameters":{"action":["sayhello"],"name":["tom","nick"]},"data":{"raw_json":{"l":"k"}}}]}"#
        );
    }

    #[test]
    fn repeated_top_level_params_render_as_array() {
        let env = Envelope::builder()
            .parameter("tag", "a")
            .parameter("tag", "b")
            .build()
            .unwrap();
        assert_eq!(JsonCodec.to_message(&env), r#"{"tag":["a","b"],"data":[]}"#);
    }

    #[test]
    fn hello_envelope_message_and_data_are_valid_json() {
        let env = Envelope::builder()
            .add(hello(Some(r#""raw_json":{"l":"k"}"#)))
            .add(hello(None))
            .add(hello(None))
            .build()
            .unwrap();
        let message = JsonCodec.to_message(&env);
        let data = JsonCodec.generate_data(&env);
        let parsed: Value = serde_json::from_str(&message).unwrap();
        let data_parsed: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(data_parsed.as_array().map(Vec::len), Some(3));
        assert_eq!(parsed["data"][0]["data"]["raw_json"]["l"], "k");
        assert!(message.contains(&data));
    }

    #[test]
    fn raw_fragment_whitespace_survives() {
        let raw = r#" "a" : [1, 2] , "b":{ } "#;
        let env = Envelope::builder().add(hello(Some(raw))).build().unwrap();
        let message = JsonCodec.to_message(&env);
        assert!(message.contains(raw));
        let parsed = JsonCodec.parse(&message).unwrap();
        assert_eq!(parsed.requests()[0].data(), Some(raw));
    }

    #[test]
    fn parse_accepts_whitespace_and_string_params() {
        let text = r#"
            {
              "target": "h",
              "connection-timeout": "50",
              "data": [
                { "name": "a", "parameters": { "k": "v", "m": ["1", "2"] } }
              ]
            }"#;
        let env = JsonCodec.parse(text).unwrap();
        assert_eq!(env.format(), Format::Json);
        assert_eq!(env.target(), Some("h"));
        assert_eq!(env.connection_timeout(), Some("50"));
        let req = &env.requests()[0];
        assert_eq!(req.params().get_all("k"), ["v"]);
        assert_eq!(req.params().get_all("m"), ["1", "2"]);
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = JsonCodec.parse("{\"data\": [").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn parse_rejects_non_object_top_level() {
        let err = JsonCodec.parse("[]").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn parse_rejects_missing_name() {
        let err = JsonCodec
            .parse(r#"{"data":[{"name":"a"},{"parameters":{}}]}"#)
            .unwrap_err();
        assert_eq!(err, ProtocolError::MissingName { index: 1 });
    }

    #[test]
    fn parse_rejects_missing_data_list() {
        let err = JsonCodec.parse(r#"{"target":"h"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { .. }));
    }

    #[test]
    fn parse_rejects_numeric_param_values() {
        let err = JsonCodec.parse(r#"{"timeout":5,"data":[]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn parse_rejects_non_object_native_data() {
        let err = JsonCodec
            .parse(r#"{"data":[{"name":"a","data":[1]}]}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { .. }));
    }

    #[test]
    fn empty_value_lists_round_trip() {
        let text = r#"{"empty":[],"data":[]}"#;
        let env = JsonCodec.parse(text).unwrap();
        assert!(env.params().contains_key("empty"));
        assert_eq!(JsonCodec.to_message(&env), text);
    }

    #[test]
    fn validate_fragment_checks_member_syntax() {
        assert!(JsonCodec.validate_fragment(r#""a":1,"b":[true]"#).is_ok());
        assert!(JsonCodec.validate_fragment("").is_ok());
        assert!(JsonCodec.validate_fragment(r#""a":"#).is_err());
        assert!(JsonCodec.validate_fragment("<xml/>").is_err());
    }
}

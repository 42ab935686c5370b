//! Wire format tests

use plex_codec::xml::validate_document;
use plex_codec::{MessageExt, parse};
use plex_types::{Envelope, Format, ProtocolError, SubRequest};

fn hello(raw: Option<&str>) -> SubRequest {
    let builder = SubRequest::builder("helloworld")
        .parameter("action", "sayhello")
        .parameter("name", "tom")
        .parameter("name", "nick");
    let builder = match raw {
        Some(raw) => builder.data(raw),
        None => builder,
    };
    builder.build().unwrap()
}

fn hello_envelope(format: Format, raw: &str) -> Envelope {
    Envelope::builder()
        .format(format)
        .parameter("target", "localhost")
        .parameter("connection-timeout", "1000")
        .add(hello(Some(raw)))
        .add(hello(None))
        .add(hello(None))
        .build()
        .unwrap()
}

#[test]
fn hello_envelope_outputs_are_valid_json() {
    let env = hello_envelope(Format::Json, r#""raw_json":{"l":"k"}"#);
    let message = env.to_message();
    let data = env.generate_data();

    let parsed: serde_json::Value = serde_json::from_str(&message).unwrap();
    serde_json::from_str::<serde_json::Value>(&data).unwrap();
    assert!(message.contains(&data));

    assert_eq!(parsed["target"], "localhost");
    assert_eq!(parsed["data"][0]["data"]["raw_json"]["l"], "k");
    assert_eq!(
        parsed["data"][0]["parameters"]["name"],
        serde_json::json!(["tom", "nick"])
    );
    assert_eq!(parsed["data"].as_array().unwrap().len(), 3);
}

#[test]
fn hello_envelope_outputs_are_valid_xml() {
    let env = hello_envelope(Format::Xml, "<raw_xml>hi</raw_xml>");
    let message = env.to_message();
    let data = env.generate_data();

    validate_document(&message).unwrap();
    validate_document(&data).unwrap();
    assert!(message.contains(&data));
    assert!(data.contains("<raw_xml>hi</raw_xml>"));
}

#[test]
fn both_formats_round_trip_with_foreign_fragments() {
    for (format, foreign) in [
        (Format::Json, "<raw_xml a=\"1\">hi &amp; bye</raw_xml>"),
        (Format::Xml, r#"{"raw_json":{"l":"<k>"}}"#),
    ] {
        let env = Envelope::builder()
            .format(format)
            .add(hello(None))
            .add(
                SubRequest::builder("echo")
                    .format(match format {
                        Format::Json => Format::Xml,
                        Format::Xml => Format::Json,
                    })
                    .data(foreign)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let message = env.to_message();
        assert!(message.contains(&env.generate_data()));
        let parsed = parse(&message, format).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.requests()[1].data(), Some(foreign));
    }
}

#[test]
fn duplicate_parameters_keep_order_under_one_key() {
    for format in [Format::Json, Format::Xml] {
        let env = Envelope::builder()
            .format(format)
            .add(hello(None))
            .build()
            .unwrap();
        let parsed = parse(&env.to_message(), format).unwrap();
        let params = parsed.requests()[0].params();
        assert_eq!(params.get_all("name"), ["tom", "nick"]);
        assert_eq!(params.keys().collect::<Vec<_>>(), ["action", "name"]);
    }
}

#[test]
fn parse_errors_are_protocol_errors() {
    let cases = [
        (Format::Json, "{\"data\":[{\"parameters\":{}}]}"),
        (Format::Json, "[1,2,3]"),
        (Format::Json, "{\"data\":["),
        (Format::Xml, "<message><data><request/></data></message>"),
        (Format::Xml, "<message><data></message>"),
        (Format::Xml, "<message>"),
    ];
    for (format, text) in cases {
        let err = parse(text, format).unwrap_err();
        assert!(
            matches!(
                err,
                ProtocolError::Malformed { .. }
                    | ProtocolError::MissingName { .. }
                    | ProtocolError::Unbalanced { .. }
                    | ProtocolError::InvalidField { .. }
            ),
            "{format}: {text} -> {err:?}"
        );
    }
}

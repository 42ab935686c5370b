//! End-to-end envelope handling tests

use std::sync::Arc;
use std::time::{Duration, Instant};

use plex_codec::parse;
use plex_codec::xml::validate_document;
use plex_core::{
    AuthError, Authenticator, Multiplexer, MuxError, Principal, RequestMeta, Settings,
};
use plex_dispatch::HandlerRegistry;
use plex_types::{Fault, Format, Outcome, Params};

use crate::common::{Behavior, TestRegistry, into_parts};

struct RequireToken;

impl Authenticator for RequireToken {
    fn auth(&self, params: &Params, _meta: &RequestMeta) -> Result<Principal, AuthError> {
        match params.first("token") {
            Some("secret") => Ok(Principal::new("tester")),
            _ => Err(AuthError::new("missing token").with_detail("token")),
        }
    }
}

fn builtins() -> Multiplexer {
    Multiplexer::new(Arc::new(HandlerRegistry::with_builtins().unwrap()), Settings::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn xml_envelope_against_builtins() {
    let text = concat!(
        "<message><parameter name=\"target\">localhost</parameter><data>",
        "<request name=\"helloworld\"><parameters>",
        "<parameter name=\"action\">sayhello</parameter>",
        "<parameter name=\"name\">tom</parameter>",
        "<parameter name=\"name\">nick</parameter>",
        "</parameters><data><raw_xml>hi</raw_xml></data></request>",
        "<request name=\"echo\"><data><raw_xml>hi</raw_xml></data></request>",
        "<request name=\"nope\"/>",
        "</data></message>"
    );
    let out = builtins()
        .handle(text, Format::Xml, &RequestMeta::default())
        .await
        .unwrap();
    validate_document(&out).unwrap();

    let response = parse(&out, Format::Xml).unwrap();
    assert_eq!(response.target(), Some("localhost"));
    let replies = response.requests();
    assert_eq!(replies.len(), 3);
    assert_eq!(
        replies[0].data(),
        Some("<greeting>Hello, tom!</greeting><greeting>Hello, nick!</greeting>")
    );
    assert_eq!(replies[1].data(), Some("<raw_xml>hi</raw_xml>"));
    assert!(matches!(
        replies[2].outcome(),
        Some(Outcome::Failed(f)) if f.code == Fault::NOT_FOUND
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connection_timeout_bounds_the_wait() {
    let (resolver, _) = into_parts(
        TestRegistry::new()
            .with("fast", Behavior::Reply("\"ok\":true"))
            .with("hang", Behavior::Hang),
    );
    let mux = Multiplexer::new(resolver, Settings::default());
    let text = r#"{"connection-timeout":"50","data":[{"name":"fast"},{"name":"hang"}]}"#;

    let started = Instant::now();
    let out = mux
        .handle(text, Format::Json, &RequestMeta::default())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(1000));

    let response: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(response["connection-timeout"], "50");
    assert_eq!(response["data"][0]["status"], "succeeded");
    assert_eq!(response["data"][1]["status"], "timed-out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn configured_default_timeout_applies_without_parameter() {
    let (resolver, _) = into_parts(TestRegistry::new().with("hang", Behavior::Hang));
    let settings = Settings {
        default_timeout_ms: 30,
        ..Settings::default()
    };
    let mux = Multiplexer::new(resolver, settings);
    let out = mux
        .handle(
            r#"{"data":[{"name":"hang"}]}"#,
            Format::Json,
            &RequestMeta::default(),
        )
        .await
        .unwrap();
    assert!(out.contains(r#""status":"timed-out""#), "{out}");
}

#[tokio::test]
async fn auth_failure_runs_no_handler() {
    let (resolver, counters) =
        into_parts(TestRegistry::new().with("a", Behavior::Reply("\"a\":1")));
    let mux = Multiplexer::new(resolver, Settings::default())
        .with_authenticator(Box::new(RequireToken), &Params::new())
        .unwrap();

    let err = mux
        .handle(
            r#"{"data":[{"name":"a"}]}"#,
            Format::Json,
            &RequestMeta::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::Auth(_)));
    assert_eq!(err.fault().code, Fault::UNAUTHORIZED);
    assert_eq!(counters.resolved(), 0);

    let out = mux
        .handle(
            r#"{"token":"secret","data":[{"name":"a"}]}"#,
            Format::Json,
            &RequestMeta::default(),
        )
        .await
        .unwrap();
    assert!(out.contains(r#""status":"succeeded""#));
    assert_eq!(counters.executed(), 1);
}

#[tokio::test]
async fn parse_failure_runs_no_handler() {
    let (resolver, counters) =
        into_parts(TestRegistry::new().with("a", Behavior::Reply("<a/>")));
    let mux = Multiplexer::new(resolver, Settings::default());

    let err = mux
        .handle(
            "<message><data><request name=\"a\"></data></message>",
            Format::Xml,
            &RequestMeta::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::Protocol(_)));
    assert_eq!(err.fault().code, Fault::BAD_REQUEST);
    assert_eq!(counters.resolved(), 0);
}

#[tokio::test]
async fn every_failure_still_produces_a_response() {
    let (resolver, _) = into_parts(
        TestRegistry::new()
            .with("fail", Behavior::Fail)
            .with("panic", Behavior::Panic),
    );
    let mux = Multiplexer::new(resolver, Settings::default());
    let out = mux
        .handle(
            r#"{"data":[{"name":"fail"},{"name":"panic"},{"name":"missing"}]}"#,
            Format::Json,
            &RequestMeta::default(),
        )
        .await
        .unwrap();
    let response = parse(&out, Format::Json).unwrap();
    let codes: Vec<u16> = response
        .requests()
        .iter()
        .map(|reply| reply.outcome().and_then(Outcome::fault).unwrap().code)
        .collect();
    assert_eq!(codes, [500, 500, 404]);
}

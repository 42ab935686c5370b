//! Dispatch pool and completion tests

use std::time::{Duration, Instant};

use plex_dispatch::{CompletionEntry, Deadline, Dispatcher};
use plex_types::{Envelope, Fault, Outcome, SubRequest};

use crate::common::{Behavior, TestRegistry, into_parts};

fn envelope(names: &[&str]) -> Envelope {
    let mut builder = Envelope::builder().parameter("target", "localhost");
    for name in names {
        builder = builder.add(SubRequest::builder(*name).build().unwrap());
    }
    builder.build().unwrap()
}

fn outcomes(response: &Envelope) -> Vec<Outcome> {
    response
        .requests()
        .iter()
        .map(|reply| reply.outcome().cloned().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unresolvable_handler_fails_in_place() {
    let (resolver, _) = into_parts(
        TestRegistry::new()
            .with("a", Behavior::Reply("\"a\":1"))
            .with("c", Behavior::Reply("\"c\":3")),
    );
    let dispatcher = Dispatcher::new(resolver);

    let started = Instant::now();
    let response = dispatcher
        .dispatch(&envelope(&["a", "b", "c"]), Deadline::from_millis(1000))
        .await;
    assert!(started.elapsed() < Duration::from_millis(1000));

    let outcomes = outcomes(&response);
    assert_eq!(outcomes[0], Outcome::Succeeded);
    assert!(matches!(&outcomes[1], Outcome::Failed(f) if f.code == Fault::NOT_FOUND));
    assert_eq!(outcomes[2], Outcome::Succeeded);
    assert_eq!(response.requests()[2].data(), Some("\"c\":3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hung_handler_times_out_without_blocking_siblings() {
    let (resolver, counters) = into_parts(
        TestRegistry::new()
            .with("fast", Behavior::Reply("\"ok\":true"))
            .with("hang", Behavior::Hang),
    );
    let dispatcher = Dispatcher::new(resolver);

    let started = Instant::now();
    let response = dispatcher
        .dispatch(&envelope(&["fast", "hang", "fast"]), Deadline::from_millis(50))
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "{elapsed:?}");
    assert_eq!(
        outcomes(&response),
        [Outcome::Succeeded, Outcome::TimedOut, Outcome::Succeeded]
    );
    assert_eq!(counters.executed(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn response_order_follows_request_order() {
    let (resolver, _) = into_parts(
        TestRegistry::new()
            .with("slow", Behavior::Delay(Duration::from_millis(40), "\"n\":\"slow\""))
            .with("mid", Behavior::Delay(Duration::from_millis(20), "\"n\":\"mid\""))
            .with("fast", Behavior::Reply("\"n\":\"fast\"")),
    );
    let dispatcher = Dispatcher::new(resolver);
    let response = dispatcher
        .dispatch(&envelope(&["slow", "mid", "fast"]), Deadline::Never)
        .await;

    let names: Vec<&str> = response.requests().iter().map(SubRequest::name).collect();
    assert_eq!(names, ["slow", "mid", "fast"]);
    let data: Vec<_> = response
        .requests()
        .iter()
        .map(|reply| reply.data().unwrap())
        .collect();
    assert_eq!(data, ["\"n\":\"slow\"", "\"n\":\"mid\"", "\"n\":\"fast\""]);
    assert_eq!(response.params(), envelope(&[]).params());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn release_runs_for_every_resolved_handler() {
    let (resolver, counters) = into_parts(
        TestRegistry::new()
            .with("ok", Behavior::Reply("\"ok\":1"))
            .with("fail", Behavior::Fail)
            .with("panic", Behavior::Panic),
    );
    let dispatcher = Dispatcher::new(resolver);
    let state = dispatcher.spawn(&envelope(&["ok", "fail", "panic", "unknown"]));
    assert!(state.await_done(Deadline::Never).await);

    assert_eq!(counters.resolved(), 4);
    assert_eq!(counters.executed(), 3);
    assert_eq!(counters.released(), 3);

    let entries = state.snapshot();
    assert!(matches!(&entries[1], CompletionEntry::Failed(f) if f.message() == Some("test failure")));
    assert!(matches!(&entries[2], CompletionEntry::Failed(f) if f.code == Fault::GENERAL_ERROR));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stragglers_release_after_the_deadline() {
    let (resolver, counters) = into_parts(
        TestRegistry::new().with("late", Behavior::Delay(Duration::from_millis(60), "\"x\":1")),
    );
    let dispatcher = Dispatcher::new(resolver);
    let state = dispatcher.spawn(&envelope(&["late"]));

    assert!(!state.await_done(Deadline::from_millis(10)).await);
    assert_eq!(counters.released(), 0);

    assert!(state.await_done(Deadline::Never).await);
    assert_eq!(counters.released(), 1);
    assert_eq!(
        state.snapshot(),
        [CompletionEntry::Succeeded("\"x\":1".to_string())]
    );
}

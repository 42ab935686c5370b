//! The envelope pipeline: limits, parse, auth, dispatch, aggregate, serialize.

use std::sync::Arc;
use std::time::Instant;

use plex_codec::codec_for;
use plex_dispatch::{Deadline, Dispatcher, Resolver};
use plex_types::{Envelope, Fault, Format, Outcome, Params, SubRequest};

use crate::{AllowAll, AuthError, Authenticator, MuxError, RequestMeta, Settings};

/// Handles whole envelopes against one resolver and one authenticator.
pub struct Multiplexer {
    dispatcher: Dispatcher,
    authenticator: Box<dyn Authenticator>,
    settings: Settings,
}

impl Multiplexer {
    /// Multiplexer that lets every caller through.
    pub fn new(resolver: Arc<dyn Resolver>, settings: Settings) -> Self {
        Self {
            dispatcher: Dispatcher::new(resolver),
            authenticator: Box::new(AllowAll),
            settings,
        }
    }

    /// Install `authenticator`, running its `initialize` with `config`.
    pub fn with_authenticator(
        mut self,
        mut authenticator: Box<dyn Authenticator>,
        config: &Params,
    ) -> Result<Self, AuthError> {
        authenticator.initialize(config)?;
        self.authenticator.destroy();
        self.authenticator = authenticator;
        Ok(self)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle raw wire text in `format` and return the serialized response.
    ///
    /// Errors are fatal for the whole envelope and no handler has run.
    /// Every other failure is reported inside the response.
    pub async fn handle(
        &self,
        text: &str,
        format: Format,
        meta: &RequestMeta,
    ) -> Result<String, MuxError> {
        let limit = self.settings.max_message_bytes;
        if text.len() > limit {
            return Err(MuxError::TooLarge {
                size: text.len(),
                limit,
            });
        }
        let codec = codec_for(format);
        let envelope = codec.parse(text)?;
        let response = self.process(&envelope, meta).await?;
        Ok(codec.to_message(&response))
    }

    /// Run a parsed envelope through auth and dispatch.
    pub async fn process(
        &self,
        envelope: &Envelope,
        meta: &RequestMeta,
    ) -> Result<Envelope, MuxError> {
        let started = Instant::now();
        if envelope.len() > self.settings.max_requests {
            return Err(MuxError::TooManyRequests {
                count: envelope.len(),
                limit: self.settings.max_requests,
            });
        }
        let deadline = Deadline::from_param(
            envelope.connection_timeout(),
            self.settings.default_timeout_ms,
        )?;
        let principal = self.authenticator.auth(envelope.params(), meta)?;
        tracing::debug!(
            principal = principal.name(),
            host = envelope.target(),
            requests = envelope.len(),
            "Dispatching envelope"
        );

        let response = self.dispatcher.dispatch(envelope, deadline).await;
        let response = check_native_outputs(response);

        let (mut succeeded, mut failed, mut timed_out) = (0usize, 0usize, 0usize);
        for reply in response.requests() {
            match reply.outcome() {
                Some(Outcome::Succeeded) => succeeded += 1,
                Some(Outcome::Failed(_)) => failed += 1,
                Some(Outcome::TimedOut) | None => timed_out += 1,
            }
        }
        tracing::info!(
            format = %envelope.format(),
            requests = envelope.len(),
            succeeded,
            failed,
            timed_out,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Handled envelope"
        );
        Ok(response)
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.authenticator.destroy();
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Handler output embedded verbatim must not break the response document.
/// Outputs that would are turned into failures.
fn check_native_outputs(response: Envelope) -> Envelope {
    let format = response.format();
    let codec = codec_for(format);
    let replies = response
        .requests()
        .iter()
        .map(|reply| {
            let native = reply.effective_format(format) == format;
            match (reply.outcome(), reply.data()) {
                (Some(Outcome::Succeeded), Some(raw)) if native => {
                    match codec.validate_fragment(raw) {
                        Ok(()) => reply.clone(),
                        Err(err) => {
                            tracing::warn!(
                                handler = reply.name(),
                                %err,
                                "Discarding invalid handler output"
                            );
                            invalid_output(reply, &err.to_string())
                        }
                    }
                }
                _ => reply.clone(),
            }
        })
        .collect();
    response.respond(replies)
}

fn invalid_output(reply: &SubRequest, detail: &str) -> SubRequest {
    let fault = Fault::general("invalid handler output").with_detail(detail);
    reply.respond(Outcome::Failed(fault), None)
}

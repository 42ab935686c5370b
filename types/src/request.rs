//! Single-target requests and their builder.

use crate::{Format, Outcome, Params, ProtocolError};

/// One named, parameterized call inside an envelope.
///
/// Immutable once built. Response envelopes reuse this type; their entries
/// carry an [`Outcome`] and, on success, the handler output as `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRequest {
    name: String,
    params: Params,
    data: Option<String>,
    format: Option<Format>,
    outcome: Option<Outcome>,
}

impl SubRequest {
    pub fn builder(name: impl Into<String>) -> SubRequestBuilder {
        SubRequestBuilder::new(name)
    }

    /// Handler identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Raw payload fragment, exactly as supplied.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Explicit format override, if any.
    #[must_use]
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Format of the raw payload inside an envelope of `envelope` format.
    #[must_use]
    pub fn effective_format(&self, envelope: Format) -> Format {
        self.format.unwrap_or(envelope)
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Response entry for this request: same name and format override,
    /// no parameters.
    #[must_use]
    pub fn respond(&self, outcome: Outcome, data: Option<String>) -> SubRequest {
        SubRequest {
            name: self.name.clone(),
            params: Params::new(),
            data,
            format: self.format,
            outcome: Some(outcome),
        }
    }
}

/// Staging area for a [`SubRequest`].
#[derive(Debug, Clone)]
pub struct SubRequestBuilder {
    name: String,
    params: Params,
    data: Option<String>,
    format: Option<Format>,
    outcome: Option<Outcome>,
}

impl SubRequestBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
            data: None,
            format: None,
            outcome: None,
        }
    }

    /// Append a parameter; existing values for `key` are kept.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.append(key, value);
        self
    }

    /// Replace the staged parameters wholesale.
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set the raw payload. Stored verbatim; well-formedness is not checked.
    pub fn data(mut self, raw: impl Into<String>) -> Self {
        self.data = Some(raw.into());
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn xml(self) -> Self {
        self.format(Format::Xml)
    }

    pub fn json(self) -> Self {
        self.format(Format::Json)
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn build(self) -> Result<SubRequest, ProtocolError> {
        if self.name.trim().is_empty() {
            return Err(ProtocolError::EmptyName);
        }
        Ok(SubRequest {
            name: self.name,
            params: self.params,
            data: self.data,
            format: self.format,
            outcome: self.outcome,
        })
    }
}

//! Multiplexed envelopes and their builder.

use crate::{
    CONNECTION_TIMEOUT_PARAM, DATA_KEY, Format, Params, ProtocolError, SubRequest, TARGET_PARAM,
};

/// Ordered sub-requests plus shared top-level parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    params: Params,
    requests: Vec<SubRequest>,
    format: Format,
}

impl Envelope {
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new(None)
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[must_use]
    pub fn requests(&self) -> &[SubRequest] {
        &self.requests
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.params.first(TARGET_PARAM)
    }

    /// Raw `connection-timeout` value, unparsed.
    #[must_use]
    pub fn connection_timeout(&self) -> Option<&str> {
        self.params.first(CONNECTION_TIMEOUT_PARAM)
    }

    /// Response envelope carrying `replies`, keeping this envelope's
    /// parameters and format.
    #[must_use]
    pub fn respond(&self, replies: Vec<SubRequest>) -> Envelope {
        Envelope {
            params: self.params.clone(),
            requests: replies,
            format: self.format,
        }
    }
}

/// Staging area for an [`Envelope`]. Defaults to JSON.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    params: Params,
    requests: Vec<SubRequest>,
    format: Format,
}

impl EnvelopeBuilder {
    /// Start from optional target parameters.
    pub fn new(params: Option<Params>) -> Self {
        Self {
            params: params.unwrap_or_default(),
            requests: Vec::new(),
            format: Format::default(),
        }
    }

    /// Append a top-level parameter; existing values for `key` are kept.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.append(key, value);
        self
    }

    pub fn add(mut self, request: SubRequest) -> Self {
        self.requests.push(request);
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn xml(self) -> Self {
        self.format(Format::Xml)
    }

    pub fn json(self) -> Self {
        self.format(Format::Json)
    }

    /// Freeze the staged envelope. Zero sub-requests is allowed.
    pub fn build(self) -> Result<Envelope, ProtocolError> {
        if self.params.contains_key(DATA_KEY) {
            return Err(ProtocolError::ReservedParameter {
                key: DATA_KEY.to_string(),
            });
        }
        Ok(Envelope {
            params: self.params,
            requests: self.requests,
            format: self.format,
        })
    }
}

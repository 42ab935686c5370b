//! Wire codecs for Plex envelopes.
//!
//! Two interchangeable serializations share the envelope model:
//!
//! - **JSON** ([`JsonCodec`]): `{"<param>": "<v>", ..., "data": [<entry>, ...]}`
//! - **XML** ([`XmlCodec`]): `<message><parameter name="..">..</parameter>...<data>..</data></message>`
//!
//! Both produce canonical text (no insignificant whitespace) and both uphold
//! the same contract: [`Codec::generate_data`] is a literal substring of
//! [`Codec::to_message`], and parsing serialized text yields an equal
//! envelope. Raw fragments whose format matches the envelope are embedded
//! verbatim; fragments of the other format travel as escaped text.

mod json;
pub mod xml;

use plex_types::{Envelope, Format, ProtocolError};

pub use json::JsonCodec;
pub use xml::XmlCodec;

/// One serializer/parser pair for a wire format.
pub trait Codec: Send + Sync {
    fn format(&self) -> Format;

    /// Canonical text of the whole envelope.
    ///
    /// The envelope is rendered in this codec's format; sub-requests without
    /// an override are treated as carrying native fragments.
    fn to_message(&self, envelope: &Envelope) -> String;

    /// Canonical text of the sub-request list alone.
    fn generate_data(&self, envelope: &Envelope) -> String;

    fn parse(&self, text: &str) -> Result<Envelope, ProtocolError>;

    /// Check that `raw` can be embedded verbatim as a native fragment
    /// without breaking the surrounding document.
    fn validate_fragment(&self, raw: &str) -> Result<(), ProtocolError>;
}

/// Codec for `format`.
#[must_use]
pub fn codec_for(format: Format) -> &'static dyn Codec {
    match format {
        Format::Json => &JsonCodec,
        Format::Xml => &XmlCodec,
    }
}

/// Parse wire text expected to be in `format`.
pub fn parse(text: &str, format: Format) -> Result<Envelope, ProtocolError> {
    codec_for(format).parse(text)
}

/// Serialization helpers on [`Envelope`], using the envelope's own format.
pub trait MessageExt {
    fn to_message(&self) -> String;
    fn generate_data(&self) -> String;
}

impl MessageExt for Envelope {
    fn to_message(&self) -> String {
        codec_for(self.format()).to_message(self)
    }

    fn generate_data(&self) -> String {
        codec_for(self.format()).generate_data(self)
    }
}

//! Envelope handling for Plex.
//!
//! [`Multiplexer`] is the entry point a transport calls with raw wire text.
//! It enforces size limits, parses, authenticates, dispatches every
//! sub-request concurrently and serializes the response in the request's
//! format.

mod auth;
pub mod errors;
mod service;
mod settings;

pub use auth::{AllowAll, AuthError, Authenticator, Principal, RequestMeta};
pub use errors::{MuxError, format_error};
pub use service::Multiplexer;
pub use settings::Settings;

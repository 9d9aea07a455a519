//! Attribute-based signature and disclosure session server.
//!
//! Requestors open sessions with signed request envelopes; client apps
//! fetch the proof request, produce proofs, and submit them; requestors
//! poll status and collect results. The protocol state machine lives in
//! `attesta-proto`; this crate binds it to configuration, Ed25519 request
//! authentication, policy, proof verification, and the HTTP surface.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod policy;
pub mod verifier;

pub use auth::{seal_envelope, seal_envelope_at, EnvelopeAuthenticator, StaticKeys};
pub use config::{AttestorConfig, RequestorConfig, SchemeConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use http::{build_router, spawn_sweeper, AppState};
pub use policy::ConfiguredPolicy;
pub use verifier::{attest, BoundVerifier};

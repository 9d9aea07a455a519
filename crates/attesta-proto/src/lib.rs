//! Session handshake protocol for attribute-based signature and disclosure
//! sessions: one generic endpoint, two payload flavors.

pub mod disclosure;
pub mod flavor;
pub mod resource;
pub mod signature;

pub use disclosure::DisclosureFlavor;
pub use flavor::{ClientRequest, Flavor, ProofRequest, ProofResultPayload, ProofVerifier};
pub use resource::{
    RawSessionRequest, ResourceConfig, SessionPointer, SessionResource, API_VERSION,
    PROTOCOL_VERSION,
};
pub use signature::{check_signature, SignatureFlavor, SignatureVerifier};

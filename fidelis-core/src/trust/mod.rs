//! Trust decisions: anchor resolution, certificate-path validation, and
//! the self-attestation policy gate.

mod anchor;
mod certpath;
mod self_attestation;

pub use anchor::{
    AnchorLoadError, InMemoryTrustAnchorRepository, TrustAnchorRepository, TrustAnchorSet,
};
pub use certpath::CertPathTrustworthinessVerifier;
pub use self_attestation::SelfAttestationTrustworthinessVerifier;

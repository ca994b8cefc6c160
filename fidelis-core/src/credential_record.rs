//! The caller-owned record produced by a successful registration.

use crate::attestation::AttestationStatement;
use crate::authenticator_data::AttestedCredentialData;

/// A boolean whose value may be unknown.
///
/// Credential records created before WebAuthn Level 3 never stored the
/// user-verification or backup flags; modelling "absent" explicitly keeps
/// that branch visible at every call site instead of hiding it behind a
/// nullable boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Known(bool),
    Unknown,
}

impl TriState {
    pub fn is_known(self) -> bool {
        matches!(self, TriState::Known(_))
    }

    pub fn known_value(self) -> Option<bool> {
        match self {
            TriState::Known(v) => Some(v),
            TriState::Unknown => None,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        TriState::Known(value)
    }
}

/// The persisted output of a successful registration verification.
///
/// Created once by the registration verifier; the engine never mutates it
/// afterwards. After each successful authentication the caller updates
/// `sign_count` (and, per [`crate::authentication::AuthenticationResult`],
/// `backed_up` / `uv_initialized`) and persists the record itself.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub attested_credential_data: AttestedCredentialData,
    pub attestation_statement: AttestationStatement,
    pub sign_count: u32,
    pub uv_initialized: TriState,
    pub backup_eligible: TriState,
    pub backed_up: TriState,
    pub transports: Vec<String>,
    /// Raw `clientDataJSON` snapshot from the registration ceremony, when
    /// the caller wants to retain it for audit.
    pub client_data: Option<Vec<u8>>,
}

impl CredentialRecord {
    pub fn credential_id(&self) -> &[u8] {
        &self.attested_credential_data.credential_id
    }
}

/// The subset of a stored [`CredentialRecord`] that authentication
/// verification needs. Implemented by whatever storage shape the caller
/// uses; `CredentialRecord` itself implements it.
pub trait StoredCredential {
    fn credential_id(&self) -> &[u8];
    fn cose_key(&self) -> &crate::cose::CoseKey;
    fn sign_count(&self) -> u32;
    fn backup_eligible(&self) -> TriState;
}

impl StoredCredential for CredentialRecord {
    fn credential_id(&self) -> &[u8] {
        &self.attested_credential_data.credential_id
    }

    fn cose_key(&self) -> &crate::cose::CoseKey {
        &self.attested_credential_data.cose_key
    }

    fn sign_count(&self) -> u32 {
        self.sign_count
    }

    fn backup_eligible(&self) -> TriState {
        self.backup_eligible
    }
}

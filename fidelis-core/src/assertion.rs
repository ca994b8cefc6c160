//! Assertion signature verification.

use tracing::trace;

use crate::cose::CoseKey;
use crate::error::{VerificationError, VerifyResult};

/// Verifies the signature of an authentication assertion against the
/// stored credential public key.
///
/// The signed data is `authenticatorData ‖ SHA-256(clientDataJSON)`.
/// Every failure mode — unsupported algorithm, malformed key material,
/// cryptographic mismatch — surfaces as the same
/// [`VerificationError::BadSignature`], so callers cannot be used as an
/// oracle for why a signature was rejected.
pub struct AssertionSignatureVerifier;

impl AssertionSignatureVerifier {
    pub fn verify(
        &self,
        authenticator_data_bytes: &[u8],
        client_data_hash: &[u8; 32],
        signature: &[u8],
        cose_key: &CoseKey,
    ) -> VerifyResult<()> {
        let mut signed_data =
            Vec::with_capacity(authenticator_data_bytes.len() + client_data_hash.len());
        signed_data.extend_from_slice(authenticator_data_bytes);
        signed_data.extend_from_slice(client_data_hash);

        if cose_key.verify_signature(signature, &signed_data) {
            Ok(())
        } else {
            trace!("assertion signature did not verify");
            Err(VerificationError::BadSignature)
        }
    }
}

//! The independent rule checks shared by the two ceremonies.
//!
//! Each check takes exactly what it needs and returns the specific error
//! named by the protocol; the orchestrators sequence them and stop at the
//! first failure.

use openssl::sha::sha256;

use crate::authenticator_data::AuthenticatorData;
use crate::client_data::CollectedClientData;
use crate::cose::CoseAlgorithm;
use crate::credential_record::TriState;
use crate::error::{VerificationError, VerifyResult};
use crate::server_property::ServerProperty;

/// How stored tri-state flags whose value is unknown are treated during
/// authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFlagPolicy {
    /// An unknown stored flag skips the comparison. Records created before
    /// the backup flags existed keep authenticating.
    #[default]
    Lenient,
    /// An unknown stored flag is treated as known-false and compared.
    Strict,
}

pub(crate) fn verify_client_data_type(
    presented: &str,
    expected: &'static str,
) -> VerifyResult<()> {
    if presented == expected {
        Ok(())
    } else {
        Err(VerificationError::InconsistentClientDataType {
            presented: presented.to_string(),
            expected,
        })
    }
}

pub(crate) fn verify_challenge(
    client_data: &CollectedClientData,
    server_property: &ServerProperty,
) -> VerifyResult<()> {
    if client_data.challenge == *server_property.challenge() {
        Ok(())
    } else {
        Err(VerificationError::BadChallenge)
    }
}

pub(crate) fn verify_origin(
    client_data: &CollectedClientData,
    server_property: &ServerProperty,
) -> VerifyResult<()> {
    if server_property.origin_predicate().test(&client_data.origin) {
        Ok(())
    } else {
        Err(VerificationError::BadOrigin(client_data.origin.to_string()))
    }
}

/// Cross-origin and top-origin policy. A ceremony that ran in a
/// cross-origin iframe is acceptable only when a top-origin predicate is
/// configured and accepts the presented top origin, and cross-origin use
/// is not force-blocked outright.
pub(crate) fn verify_top_origin(
    client_data: &CollectedClientData,
    server_property: &ServerProperty,
    force_block_cross_origin: bool,
) -> VerifyResult<()> {
    if client_data.cross_origin != Some(true) {
        return Ok(());
    }
    if force_block_cross_origin {
        return Err(VerificationError::CrossOrigin);
    }
    let presented = client_data
        .top_origin
        .as_ref()
        .ok_or_else(|| VerificationError::BadTopOrigin("<absent>".into()))?;
    match server_property.top_origin_predicate() {
        Some(predicate) if predicate.test(presented) => Ok(()),
        _ => Err(VerificationError::BadTopOrigin(presented.to_string())),
    }
}

pub(crate) fn verify_token_binding(
    client_data: &CollectedClientData,
    server_property: &ServerProperty,
) -> VerifyResult<()> {
    let Some(token_binding) = &client_data.token_binding else {
        return Ok(());
    };
    match token_binding.status.as_str() {
        "present" => {
            let matches = match (&token_binding.id, server_property.token_binding_id()) {
                (Some(presented), Some(expected)) => presented == expected,
                _ => false,
            };
            if matches {
                Ok(())
            } else {
                Err(VerificationError::TokenBinding)
            }
        }
        // "supported" and "not-supported" assert nothing about this
        // connection.
        _ => Ok(()),
    }
}

pub(crate) fn verify_rp_id_hash(
    rp_id_hash: &[u8; 32],
    server_property: &ServerProperty,
) -> VerifyResult<()> {
    let expected = sha256(server_property.rp_id().as_bytes());
    if rp_id_hash == &expected {
        Ok(())
    } else {
        Err(VerificationError::BadRpIdHash)
    }
}

pub(crate) fn verify_up_uv_flags(
    authenticator_data: &AuthenticatorData,
    user_presence_required: bool,
    user_verification_required: bool,
) -> VerifyResult<()> {
    if user_presence_required && !authenticator_data.is_user_present() {
        return Err(VerificationError::UserNotPresent);
    }
    if user_verification_required && !authenticator_data.is_user_verified() {
        return Err(VerificationError::UserNotVerified);
    }
    Ok(())
}

/// A credential cannot be backed up without being backup-eligible.
pub(crate) fn verify_be_bs_consistency(
    authenticator_data: &AuthenticatorData,
) -> VerifyResult<()> {
    if authenticator_data.is_backed_up() && !authenticator_data.is_backup_eligible() {
        Err(VerificationError::IllegalBackupState)
    } else {
        Ok(())
    }
}

/// Backup eligibility is fixed at registration; a stored known value must
/// match the presented BE bit on every subsequent authentication.
pub(crate) fn verify_stored_backup_eligibility(
    stored: TriState,
    authenticator_data: &AuthenticatorData,
    policy: UnknownFlagPolicy,
) -> VerifyResult<()> {
    let expected = match (stored, policy) {
        (TriState::Known(value), _) => value,
        (TriState::Unknown, UnknownFlagPolicy::Lenient) => return Ok(()),
        (TriState::Unknown, UnknownFlagPolicy::Strict) => false,
    };
    if authenticator_data.is_backup_eligible() == expected {
        Ok(())
    } else {
        Err(VerificationError::BadBackupEligibleFlag)
    }
}

/// Sign-count regression signals a possible cloned credential. A presented
/// counter of zero is exempt: authenticators without counters always
/// report zero.
pub(crate) fn verify_sign_count(presented: u32, stored: u32) -> VerifyResult<()> {
    if presented != 0 && stored != 0 && presented <= stored {
        Err(VerificationError::MaliciousCounterValue { presented, stored })
    } else {
        Ok(())
    }
}

pub(crate) fn verify_algorithm_allowed(
    algorithm: CoseAlgorithm,
    allowed: Option<&[CoseAlgorithm]>,
) -> VerifyResult<()> {
    match allowed {
        Some(list) if !list.contains(&algorithm) => {
            Err(VerificationError::NotAllowedAlgorithm)
        }
        _ => Ok(()),
    }
}

pub(crate) fn verify_credential_id_allowed(
    credential_id: &[u8],
    allowed: Option<&[Vec<u8>]>,
) -> VerifyResult<()> {
    match allowed {
        Some(list) if !list.iter().any(|id| id == credential_id) => {
            Err(VerificationError::NotAllowedCredentialId)
        }
        _ => Ok(()),
    }
}

pub(crate) fn verify_credential_id_length(
    credential_id: &[u8],
    max_length: usize,
) -> VerifyResult<()> {
    if credential_id.len() > max_length {
        Err(VerificationError::CredentialIdTooLong(
            credential_id.len(),
            max_length,
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator_data::{FLAG_BE, FLAG_BS, FLAG_UP, FLAG_UV};

    fn auth_data(flags: u8) -> AuthenticatorData {
        AuthenticatorData {
            rp_id_hash: [0u8; 32],
            flags,
            sign_count: 0,
            attested_credential_data: None,
            extensions: None,
        }
    }

    #[test]
    fn up_uv_rules() {
        assert!(verify_up_uv_flags(&auth_data(FLAG_UP), true, false).is_ok());
        assert!(matches!(
            verify_up_uv_flags(&auth_data(0), true, false).unwrap_err(),
            VerificationError::UserNotPresent
        ));
        assert!(matches!(
            verify_up_uv_flags(&auth_data(FLAG_UP), true, true).unwrap_err(),
            VerificationError::UserNotVerified
        ));
        assert!(verify_up_uv_flags(&auth_data(FLAG_UP | FLAG_UV), true, true).is_ok());
        // Not required: flags are ignored.
        assert!(verify_up_uv_flags(&auth_data(0), false, false).is_ok());
    }

    #[test]
    fn backed_up_requires_backup_eligible() {
        assert!(matches!(
            verify_be_bs_consistency(&auth_data(FLAG_BS)).unwrap_err(),
            VerificationError::IllegalBackupState
        ));
        assert!(verify_be_bs_consistency(&auth_data(FLAG_BE | FLAG_BS)).is_ok());
        assert!(verify_be_bs_consistency(&auth_data(FLAG_BE)).is_ok());
        assert!(verify_be_bs_consistency(&auth_data(0)).is_ok());
    }

    #[test]
    fn stored_backup_eligibility_comparison() {
        let eligible = auth_data(FLAG_BE);
        let not_eligible = auth_data(0);

        for policy in [UnknownFlagPolicy::Lenient, UnknownFlagPolicy::Strict] {
            assert!(verify_stored_backup_eligibility(
                TriState::Known(true),
                &eligible,
                policy
            )
            .is_ok());
            assert!(matches!(
                verify_stored_backup_eligibility(TriState::Known(true), &not_eligible, policy)
                    .unwrap_err(),
                VerificationError::BadBackupEligibleFlag
            ));
        }

        // Unknown: lenient skips, strict treats as known-false.
        assert!(verify_stored_backup_eligibility(
            TriState::Unknown,
            &eligible,
            UnknownFlagPolicy::Lenient
        )
        .is_ok());
        assert!(matches!(
            verify_stored_backup_eligibility(
                TriState::Unknown,
                &eligible,
                UnknownFlagPolicy::Strict
            )
            .unwrap_err(),
            VerificationError::BadBackupEligibleFlag
        ));
    }

    #[test]
    fn sign_count_regression() {
        // Equal nonzero counters: cloning signal.
        assert!(matches!(
            verify_sign_count(5, 5).unwrap_err(),
            VerificationError::MaliciousCounterValue {
                presented: 5,
                stored: 5
            }
        ));
        assert!(matches!(
            verify_sign_count(4, 5).unwrap_err(),
            VerificationError::MaliciousCounterValue { .. }
        ));
        assert!(verify_sign_count(6, 5).is_ok());
        // Zero presented counter is always exempt.
        assert!(verify_sign_count(0, 5).is_ok());
        assert!(verify_sign_count(0, 0).is_ok());
        // First nonzero counter after a zero stored value.
        assert!(verify_sign_count(1, 0).is_ok());
    }

    #[test]
    fn allow_lists() {
        assert!(verify_algorithm_allowed(CoseAlgorithm::Es256, None).is_ok());
        assert!(verify_algorithm_allowed(
            CoseAlgorithm::Es256,
            Some(&[CoseAlgorithm::Es256, CoseAlgorithm::Rs256])
        )
        .is_ok());
        assert!(matches!(
            verify_algorithm_allowed(CoseAlgorithm::EdDsa, Some(&[CoseAlgorithm::Es256]))
                .unwrap_err(),
            VerificationError::NotAllowedAlgorithm
        ));

        let allowed = vec![vec![1u8, 2, 3]];
        assert!(verify_credential_id_allowed(&[1, 2, 3], Some(&allowed)).is_ok());
        assert!(matches!(
            verify_credential_id_allowed(&[9], Some(&allowed)).unwrap_err(),
            VerificationError::NotAllowedCredentialId
        ));
        assert!(verify_credential_id_allowed(&[9], None).is_ok());
    }

    #[test]
    fn credential_id_length_limit() {
        assert!(verify_credential_id_length(&[0u8; 1023], 1023).is_ok());
        assert!(matches!(
            verify_credential_id_length(&[0u8; 1024], 1023).unwrap_err(),
            VerificationError::CredentialIdTooLong(1024, 1023)
        ));
    }
}

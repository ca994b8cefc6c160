//! Certificate-path trustworthiness verification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::{X509VerifyFlags, X509VerifyParam};
use openssl::x509::{X509StoreContext, X509VerifyResult, X509};
use tracing::debug;

use crate::attestation::{certificate, AttestationStatement};
use crate::authenticator_data::Aaguid;
use crate::error::{VerificationError, VerifyResult};
use crate::trust::TrustAnchorRepository;

/// Validates that an attestation certificate chain leads to a registered
/// trust anchor.
///
/// Anchor resolution: FIDO-U2F statements are looked up by the end-entity
/// certificate's subject-key-identifier, every other format by AAGUID.
pub struct CertPathTrustworthinessVerifier {
    repository: Arc<dyn TrustAnchorRepository>,
    full_chain_prohibited: bool,
    revocation_check_enabled: bool,
    policy_qualifiers_rejected: bool,
}

impl CertPathTrustworthinessVerifier {
    pub fn new(repository: Arc<dyn TrustAnchorRepository>) -> Self {
        CertPathTrustworthinessVerifier {
            repository,
            full_chain_prohibited: false,
            revocation_check_enabled: false,
            policy_qualifiers_rejected: false,
        }
    }

    /// Reject chains that include the trust anchor itself.
    pub fn full_chain_prohibited(mut self, prohibited: bool) -> Self {
        self.full_chain_prohibited = prohibited;
        self
    }

    /// Enable CRL-based revocation checking during path validation.
    /// Off by default: attestation certificate status is usually obtained
    /// through metadata services instead.
    pub fn revocation_check(mut self, enabled: bool) -> Self {
        self.revocation_check_enabled = enabled;
        self
    }

    /// Require certificate policies to be processed during path
    /// validation. Off by default.
    pub fn policy_qualifiers_rejected(mut self, rejected: bool) -> Self {
        self.policy_qualifiers_rejected = rejected;
        self
    }

    /// Verify the statement's certificate path at the given verification
    /// timestamp. The timestamp is pinned into path validation so that
    /// recorded (back-dated) responses can be verified.
    pub fn verify(
        &self,
        aaguid: &Aaguid,
        statement: &AttestationStatement,
        timestamp: DateTime<Utc>,
    ) -> VerifyResult<()> {
        let x5c = statement.x5c().ok_or_else(|| {
            VerificationError::BadAttestationStatement(
                "attestation statement carries no certificate path".into(),
            )
        })?;
        if x5c.is_empty() {
            return Err(VerificationError::BadAttestationStatement(
                "attestation statement carries an empty certificate path".into(),
            ));
        }

        let anchors = match statement {
            AttestationStatement::FidoU2f(_) => {
                let leaf = certificate::parse(&x5c[0])?;
                let key_id = certificate::subject_key_identifier(&leaf);
                self.repository.find_by_key_id(&key_id)
            }
            _ => self.repository.find_by_aaguid(aaguid),
        };

        if anchors.is_empty() {
            return Err(VerificationError::TrustAnchorNotFound);
        }

        let chain = certificate::openssl_chain(x5c)?;

        // A single presented certificate that is itself a registered
        // anchor is trusted directly, without path validation.
        if chain.len() == 1 {
            let presented = chain[0].to_der()?;
            for anchor in &anchors {
                if anchor.to_der()? == presented {
                    return Ok(());
                }
            }
        }

        let root_der = self.validate_path(&chain, &anchors, timestamp)?;

        if self.full_chain_prohibited {
            for cert in &chain {
                if cert.to_der()? == root_der {
                    return Err(VerificationError::Certificate(
                        "certificate path must not contain the trust anchor".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Run openssl path validation; returns the DER of the anchor the
    /// built chain terminated at.
    fn validate_path(
        &self,
        chain: &[X509],
        anchors: &[X509],
        timestamp: DateTime<Utc>,
    ) -> VerifyResult<Vec<u8>> {
        let (leaf, intermediates) = chain
            .split_first()
            .ok_or_else(|| VerificationError::CertPath("certificate path is empty".into()))?;

        let mut chain_stack = Stack::new()?;
        for cert in intermediates {
            chain_stack.push(cert.clone())?;
        }

        let mut store_builder = X509StoreBuilder::new()?;
        for anchor in anchors {
            store_builder.add_cert(anchor.clone())?;
        }

        let mut param = X509VerifyParam::new()?;
        param.set_time(timestamp.timestamp());
        let mut flags = X509VerifyFlags::empty();
        if self.revocation_check_enabled {
            flags |= X509VerifyFlags::CRL_CHECK | X509VerifyFlags::CRL_CHECK_ALL;
        }
        if self.policy_qualifiers_rejected {
            flags |= X509VerifyFlags::POLICY_CHECK;
        }
        param.set_flags(flags)?;
        store_builder.set_param(&param)?;
        let store = store_builder.build();

        let mut context = X509StoreContext::new()?;
        let root_der = context.init(&store, leaf, &chain_stack, |context| {
            context.verify_cert().map(|_| {
                let result = context.error();
                if result == X509VerifyResult::OK {
                    context
                        .chain()
                        .and_then(|built| built.iter().last())
                        .and_then(|root| root.to_der().ok())
                        .ok_or_else(|| {
                            VerificationError::CertPath(
                                "validated chain has no trust anchor".into(),
                            )
                        })
                } else {
                    debug!(
                        error = %result,
                        depth = context.error_depth(),
                        "certificate path validation failed"
                    );
                    Err(VerificationError::CertPath(result.to_string()))
                }
            })
        })??;

        Ok(root_der)
    }
}

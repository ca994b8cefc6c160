//! Packed attestation (WebAuthn §8.2).

use ciborium::value::Value;
use tracing::trace;

use crate::attestation::{
    certificate, decode_x5c, encode_x5c, att_to_be_signed, AttestationStatement, AttestationType,
    PackedStatement,
};
use crate::cbor;
use crate::cose::{self, CoseAlgorithm};
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub(super) fn decode_statement(entries: &[(Value, Value)]) -> DecodeResult<AttestationStatement> {
    let alg = CoseAlgorithm::from_registry_value(cbor::as_i64(
        cbor::text_entry(entries, "alg").ok_or(DecodeError::MissingField("alg"))?,
        "alg",
    )?)?;
    let sig = cbor::as_bytes(
        cbor::text_entry(entries, "sig").ok_or(DecodeError::MissingField("sig"))?,
        "sig",
    )?
    .to_vec();
    let x5c = match cbor::text_entry(entries, "x5c") {
        Some(value) => Some(decode_x5c(value)?),
        None => None,
    };
    let ecdaa_key_id = match cbor::text_entry(entries, "ecdaaKeyId") {
        Some(value) => Some(cbor::as_bytes(value, "ecdaaKeyId")?.to_vec()),
        None => None,
    };
    Ok(AttestationStatement::Packed(PackedStatement {
        alg,
        sig,
        x5c,
        ecdaa_key_id,
    }))
}

pub(super) fn encode_statement(statement: &PackedStatement) -> Vec<(Value, Value)> {
    let mut entries = vec![
        (
            Value::Text("alg".into()),
            Value::Integer(statement.alg.registry_value().into()),
        ),
        (Value::Text("sig".into()), Value::Bytes(statement.sig.clone())),
    ];
    if let Some(x5c) = &statement.x5c {
        entries.push((Value::Text("x5c".into()), encode_x5c(x5c)));
    }
    if let Some(id) = &statement.ecdaa_key_id {
        entries.push((Value::Text("ecdaaKeyId".into()), Value::Bytes(id.clone())));
    }
    entries
}

pub struct PackedAttestationStatementVerifier;

impl PackedAttestationStatementVerifier {
    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let AttestationStatement::Packed(statement) = &object.attestation_object.statement
        else {
            return Err(VerificationError::BadAttestationStatement(
                "packed attestation statement is not found".into(),
            ));
        };

        let signed_data = att_to_be_signed(object);

        match (&statement.x5c, &statement.ecdaa_key_id) {
            (Some(x5c), _) => self.verify_x5c(object, statement, x5c, &signed_data),
            (None, Some(_)) => Err(VerificationError::BadAttestationStatement(
                "ECDAA attestation is not supported".into(),
            )),
            (None, None) => self.verify_self_attestation(object, statement, &signed_data),
        }
    }

    fn verify_x5c(
        &self,
        object: &RegistrationObject<'_>,
        statement: &PackedStatement,
        x5c: &[Vec<u8>],
        signed_data: &[u8],
    ) -> VerifyResult<AttestationType> {
        let leaf_der = x5c.first().ok_or_else(|| {
            VerificationError::BadAttestationStatement(
                "no attestation certificate is found in packed attestation statement".into(),
            )
        })?;
        let chain = certificate::openssl_chain(x5c)?;
        let att_cert = &chain[0];

        let valid = cose::verify_with_key(
            statement.alg,
            &*att_cert.public_key()?,
            &statement.sig,
            signed_data,
        )
        .unwrap_or(false);
        if !valid {
            trace!("packed x5c attestation signature did not verify");
            return Err(VerificationError::BadSignature);
        }

        let parsed = certificate::parse(leaf_der)?;
        verify_attestation_certificate_requirements(&parsed)?;

        // When the certificate pins an AAGUID it must match the one in
        // authenticator data.
        let acd = object.attested_credential_data()?;
        if let Some(aaguid) = certificate::aaguid_extension(&parsed)? {
            if aaguid != acd.aaguid {
                return Err(VerificationError::BadAttestationStatement(
                    "AAGUID in attestation certificate doesn't match the AAGUID in authenticator data"
                        .into(),
                ));
            }
        }

        Ok(AttestationType::Basic)
    }

    fn verify_self_attestation(
        &self,
        object: &RegistrationObject<'_>,
        statement: &PackedStatement,
        signed_data: &[u8],
    ) -> VerifyResult<AttestationType> {
        let acd = object.attested_credential_data()?;

        // alg must match the algorithm of the credential public key.
        if statement.alg != acd.cose_key.algorithm() {
            return Err(VerificationError::BadAlgorithm(
                "`alg` in attestation statement doesn't match the credential public key algorithm"
                    .into(),
            ));
        }

        if !acd.cose_key.verify_signature(&statement.sig, signed_data) {
            trace!("packed self attestation signature did not verify");
            return Err(VerificationError::BadSignature);
        }

        Ok(AttestationType::Self_)
    }
}

/// Packed attestation statement certificate requirements (WebAuthn §8.2.1).
fn verify_attestation_certificate_requirements(
    cert: &x509_parser::certificate::X509Certificate<'_>,
) -> VerifyResult<()> {
    if !certificate::is_version_3(cert) {
        return Err(VerificationError::Certificate(
            "attestation certificate must be version 3".into(),
        ));
    }
    if certificate::subject_country(cert).map_or(true, |c| c.is_empty()) {
        return Err(VerificationError::Certificate(
            "attestation certificate Subject-C must be present".into(),
        ));
    }
    if certificate::subject_organization(cert).map_or(true, |o| o.is_empty()) {
        return Err(VerificationError::Certificate(
            "attestation certificate Subject-O must be present".into(),
        ));
    }
    if certificate::subject_organizational_unit(cert).as_deref() != Some("Authenticator Attestation")
    {
        return Err(VerificationError::Certificate(
            "attestation certificate Subject-OU must be 'Authenticator Attestation'".into(),
        ));
    }
    if certificate::subject_common_name(cert).map_or(true, |cn| cn.is_empty()) {
        return Err(VerificationError::Certificate(
            "attestation certificate Subject-CN must be present".into(),
        ));
    }
    if certificate::is_ca(cert) {
        return Err(VerificationError::Certificate(
            "attestation certificate must not be a CA certificate".into(),
        ));
    }
    Ok(())
}

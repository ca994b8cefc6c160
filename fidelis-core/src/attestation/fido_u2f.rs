//! FIDO-U2F attestation (WebAuthn §8.6).

use ciborium::value::Value;
use tracing::trace;

use crate::attestation::{
    certificate, decode_x5c, encode_x5c, AttestationStatement, AttestationType, FidoU2fStatement,
};
use crate::authenticator_data::Aaguid;
use crate::cbor;
use crate::cose::{self, CoseAlgorithm, CoseKey};
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub(super) fn decode_statement(entries: &[(Value, Value)]) -> DecodeResult<AttestationStatement> {
    let sig = cbor::as_bytes(
        cbor::text_entry(entries, "sig").ok_or(DecodeError::MissingField("sig"))?,
        "sig",
    )?
    .to_vec();
    let x5c = decode_x5c(
        cbor::text_entry(entries, "x5c").ok_or(DecodeError::MissingField("x5c"))?,
    )?;
    Ok(AttestationStatement::FidoU2f(FidoU2fStatement { sig, x5c }))
}

pub(super) fn encode_statement(statement: &FidoU2fStatement) -> Vec<(Value, Value)> {
    vec![
        (Value::Text("sig".into()), Value::Bytes(statement.sig.clone())),
        (Value::Text("x5c".into()), encode_x5c(&statement.x5c)),
    ]
}

pub struct FidoU2fAttestationStatementVerifier;

impl FidoU2fAttestationStatementVerifier {
    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let AttestationStatement::FidoU2f(statement) = &object.attestation_object.statement
        else {
            return Err(VerificationError::BadAttestationStatement(
                "fido-u2f attestation statement is not found".into(),
            ));
        };

        let acd = object.attested_credential_data()?;

        // U2F authenticators predate AAGUIDs; the field must be all zero.
        if acd.aaguid != Aaguid::ZERO {
            return Err(VerificationError::BadAaguid);
        }

        // x5c carries exactly one certificate.
        if statement.x5c.len() != 1 {
            return Err(VerificationError::BadAttestationStatement(
                "fido-u2f attestation requires exactly one certificate in x5c".into(),
            ));
        }
        let chain = certificate::openssl_chain(&statement.x5c)?;
        let att_cert = &chain[0];

        // The certificate public key must be an EC key over P-256; the
        // signature algorithm is fixed to ES256.
        let public_key = att_cert.public_key()?;
        let is_p256 = public_key
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            .map(|nid| nid == openssl::nid::Nid::X9_62_PRIME256V1)
            .unwrap_or(false);
        if !is_p256 {
            return Err(VerificationError::BadAttestationStatement(
                "fido-u2f attestation certificate public key must be EC P-256".into(),
            ));
        }

        // publicKeyU2F: the credential key in raw ANSI X9.62 form.
        let public_key_u2f = match &acd.cose_key {
            key @ CoseKey::Ec2 { .. } => key
                .uncompressed_ec_point()
                .ok_or(VerificationError::BadSignature)?,
            _ => {
                return Err(VerificationError::BadAttestationStatement(
                    "fido-u2f credential public key must be EC2".into(),
                ))
            }
        };

        // verificationData =
        //   0x00 ‖ rpIdHash ‖ clientDataHash ‖ credentialId ‖ publicKeyU2F
        let auth_data = &object.attestation_object.auth_data;
        let mut verification_data = Vec::with_capacity(
            1 + 32 + 32 + acd.credential_id.len() + public_key_u2f.len(),
        );
        verification_data.push(0x00);
        verification_data.extend_from_slice(&auth_data.rp_id_hash);
        verification_data.extend_from_slice(&object.client_data_hash);
        verification_data.extend_from_slice(&acd.credential_id);
        verification_data.extend_from_slice(&public_key_u2f);

        let valid = cose::verify_with_key(
            CoseAlgorithm::Es256,
            &public_key,
            &statement.sig,
            &verification_data,
        )
        .unwrap_or(false);
        if !valid {
            trace!("fido-u2f attestation signature did not verify");
            return Err(VerificationError::BadSignature);
        }

        Ok(AttestationType::Basic)
    }
}

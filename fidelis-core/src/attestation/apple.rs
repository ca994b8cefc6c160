//! Apple anonymous attestation (WebAuthn §8.8).

use ciborium::value::Value;
use openssl::sha::sha256;

use crate::attestation::{
    certificate, decode_x5c, encode_x5c, att_to_be_signed, AppleStatement, AttestationStatement,
    AttestationType,
};
use crate::cbor;
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub(super) fn decode_statement(entries: &[(Value, Value)]) -> DecodeResult<AttestationStatement> {
    let x5c = decode_x5c(
        cbor::text_entry(entries, "x5c").ok_or(DecodeError::MissingField("x5c"))?,
    )?;
    Ok(AttestationStatement::Apple(AppleStatement { x5c }))
}

pub(super) fn encode_statement(statement: &AppleStatement) -> Vec<(Value, Value)> {
    vec![(Value::Text("x5c".into()), encode_x5c(&statement.x5c))]
}

pub struct AppleAnonymousAttestationStatementVerifier;

impl AppleAnonymousAttestationStatementVerifier {
    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let AttestationStatement::Apple(statement) = &object.attestation_object.statement else {
            return Err(VerificationError::BadAttestationStatement(
                "apple attestation statement is not found".into(),
            ));
        };

        let leaf_der = statement.x5c.first().ok_or_else(|| {
            VerificationError::BadAttestationStatement(
                "no attestation certificate is found in apple attestation statement".into(),
            )
        })?;

        // nonce = SHA-256(authenticatorData ‖ clientDataHash); it must equal
        // the value of the Apple nonce certificate extension, which proves
        // the attestation is live and binds it to this ceremony.
        let nonce = sha256(&att_to_be_signed(object));

        let parsed = certificate::parse(leaf_der)?;
        let extension = certificate::find_extension(&parsed, &certificate::OID_APPLE_NONCE)
            .ok_or_else(|| {
                VerificationError::BadAttestationStatement(
                    "apple attestation certificate is missing the nonce extension".into(),
                )
            })?;
        let embedded = parse_nonce_extension(extension)?;
        if embedded != nonce {
            return Err(VerificationError::BadAttestationStatement(
                "nonce in apple attestation certificate doesn't match".into(),
            ));
        }

        // The credential public key must equal the leaf's subject key.
        let acd = object.attested_credential_data()?;
        let chain = certificate::openssl_chain(&statement.x5c)?;
        let leaf_key = chain[0].public_key()?;
        if !acd.cose_key.matches_public_key(&leaf_key) {
            return Err(VerificationError::BadAttestationStatement(
                "credential public key doesn't match the apple attestation certificate".into(),
            ));
        }

        Ok(AttestationType::AnonCa)
    }
}

/// The extension value is `SEQUENCE { [1] EXPLICIT OCTET STRING }`.
fn parse_nonce_extension(value: &[u8]) -> VerifyResult<[u8; 32]> {
    use der_parser::der::{
        parse_der_container, parse_der_octetstring, parse_der_tagged_explicit, Class, Header, Tag,
    };
    use der_parser::error::BerError;

    let result = parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        let (i, tagged_nonce) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
        let (class, _tag, nonce) = tagged_nonce.as_tagged()?;
        if class != Class::ContextSpecific {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        let nonce: [u8; 32] = nonce
            .as_slice()?
            .try_into()
            .map_err(|_| BerError::InvalidLength)?;
        Ok((i, nonce))
    })(value);

    match result {
        Ok((_, nonce)) => Ok(nonce),
        Err(_) => Err(VerificationError::BadAttestationStatement(
            "malformed apple nonce extension".into(),
        )),
    }
}

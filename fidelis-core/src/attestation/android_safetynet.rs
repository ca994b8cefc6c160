//! Android SafetyNet attestation (WebAuthn §8.5).
//!
//! The statement wraps a signed JWS produced by Google Play services. The
//! compact JWS form is parsed by hand: it is attacker-controlled wire
//! data, and the only pieces verification needs are the header's `alg`
//! and `x5c`, the payload claims, and the signature.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ciborium::value::Value;
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::sha::sha256;
use serde::Deserialize;
use tracing::trace;

use crate::attestation::{
    certificate, att_to_be_signed, AndroidSafetyNetStatement, AttestationStatement,
    AttestationType,
};
use crate::cbor;
use crate::cose::{self, CoseAlgorithm};
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub(super) fn decode_statement(entries: &[(Value, Value)]) -> DecodeResult<AttestationStatement> {
    let ver = cbor::as_text(
        cbor::text_entry(entries, "ver").ok_or(DecodeError::MissingField("ver"))?,
        "ver",
    )?
    .to_string();
    let response = cbor::as_bytes(
        cbor::text_entry(entries, "response").ok_or(DecodeError::MissingField("response"))?,
        "response",
    )?;
    let response = Jws::parse(response)?;
    Ok(AttestationStatement::AndroidSafetyNet(
        AndroidSafetyNetStatement { ver, response },
    ))
}

pub(super) fn encode_statement(statement: &AndroidSafetyNetStatement) -> Vec<(Value, Value)> {
    vec![
        (Value::Text("ver".into()), Value::Text(statement.ver.clone())),
        (
            Value::Text("response".into()),
            Value::Bytes(statement.response.raw.clone()),
        ),
    ]
}

/// The SafetyNet attestation response claims.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetResponse {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub apk_package_name: Option<String>,
    #[serde(default)]
    pub apk_certificate_digest_sha256: Vec<String>,
    #[serde(default)]
    pub cts_profile_match: Option<bool>,
    #[serde(default)]
    pub basic_integrity: Option<bool>,
    #[serde(default)]
    pub evaluation_type: Option<String>,
}

#[derive(Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

/// A parsed compact JWS with a SafetyNet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    pub alg: String,
    /// DER certificates from the protected header, leaf first.
    pub x5c: Vec<Vec<u8>>,
    pub payload: SafetyNetResponse,
    pub signature: Vec<u8>,
    /// `base64url(header) ‖ "." ‖ base64url(payload)` — the signed bytes.
    signing_input: Vec<u8>,
    /// The original compact form, kept for re-encoding.
    pub(crate) raw: Vec<u8>,
}

impl Jws {
    pub fn parse(bytes: &[u8]) -> DecodeResult<Self> {
        let text =
            std::str::from_utf8(bytes).map_err(|_| DecodeError::Jws("response is not UTF-8"))?;
        let mut parts = text.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(DecodeError::Jws("compact JWS must have three segments")),
            };

        let header_bytes = URL_SAFE_NO_PAD.decode(header_b64)?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)?;
        let x5c = header
            .x5c
            .iter()
            .map(|encoded| {
                let der = STANDARD.decode(encoded)?;
                openssl::x509::X509::from_der(&der)
                    .map_err(|_| DecodeError::Jws("x5c entry is not a certificate"))?;
                Ok(der)
            })
            .collect::<DecodeResult<Vec<_>>>()?;

        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64)?;
        let payload: SafetyNetResponse = serde_json::from_slice(&payload_bytes)?;

        let signature = URL_SAFE_NO_PAD.decode(signature_b64)?;
        let signing_input = format!("{header_b64}.{payload_b64}").into_bytes();

        Ok(Jws {
            alg: header.alg,
            x5c,
            payload,
            signature,
            signing_input,
            raw: bytes.to_vec(),
        })
    }

    /// Verify the JWS signature against the leaf certificate of `x5c`.
    pub fn is_valid_signature(&self) -> bool {
        let Some(leaf_der) = self.x5c.first() else {
            return false;
        };
        let Ok(leaf) = openssl::x509::X509::from_der(leaf_der) else {
            return false;
        };
        let Ok(key) = leaf.public_key() else {
            return false;
        };
        match self.alg.as_str() {
            "RS256" => {
                cose::verify_with_key(CoseAlgorithm::Rs256, &key, &self.signature, &self.signing_input)
                    .unwrap_or(false)
            }
            "ES256" => {
                // JWS ECDSA signatures are raw r ‖ s; openssl wants DER.
                let Some(der) = jws_signature_to_der(&self.signature) else {
                    return false;
                };
                cose::verify_with_key(CoseAlgorithm::Es256, &key, &der, &self.signing_input)
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}

fn jws_signature_to_der(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return None;
    }
    let half = raw.len() / 2;
    let r = BigNum::from_slice(&raw[..half]).ok()?;
    let s = BigNum::from_slice(&raw[half..]).ok()?;
    EcdsaSig::from_private_components(r, s)
        .ok()?
        .to_der()
        .ok()
}

pub struct AndroidSafetyNetAttestationStatementVerifier {
    backward_threshold: Duration,
    forward_threshold: Duration,
}

impl Default for AndroidSafetyNetAttestationStatementVerifier {
    fn default() -> Self {
        // Inherited defaults: the response may be up to 60 s old and must
        // not be from the future. Deployments with skewed clocks should
        // widen these explicitly.
        AndroidSafetyNetAttestationStatementVerifier {
            backward_threshold: Duration::seconds(60),
            forward_threshold: Duration::zero(),
        }
    }
}

impl AndroidSafetyNetAttestationStatementVerifier {
    pub fn with_thresholds(backward: Duration, forward: Duration) -> Self {
        AndroidSafetyNetAttestationStatementVerifier {
            backward_threshold: backward,
            forward_threshold: forward,
        }
    }

    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let AttestationStatement::AndroidSafetyNet(statement) =
            &object.attestation_object.statement
        else {
            return Err(VerificationError::BadAttestationStatement(
                "android-safetynet attestation statement is not found".into(),
            ));
        };
        let response = &statement.response;

        if response.x5c.is_empty() {
            return Err(VerificationError::BadAttestationStatement(
                "no attestation certificate is found in android-safetynet attestation statement"
                    .into(),
            ));
        }

        // ver must be a parseable non-negative Google Play services version.
        if statement.ver.is_empty() || statement.ver.parse::<u64>().is_err() {
            return Err(VerificationError::BadAttestationStatement(format!(
                "`ver` {:?} is not a valid Google Play services version",
                statement.ver
            )));
        }

        // nonce == SHA-256(authenticatorData ‖ clientDataHash), base64.
        let expected_nonce = sha256(&att_to_be_signed(object));
        let nonce = response.payload.nonce.as_deref().ok_or_else(|| {
            VerificationError::BadAttestationStatement("nonce must not be null".into())
        })?;
        let presented_nonce = STANDARD.decode(nonce).map_err(|_| {
            VerificationError::BadAttestationStatement("nonce is not valid base64".into())
        })?;
        if presented_nonce != expected_nonce {
            return Err(VerificationError::BadAttestationStatement(
                "nonce in the android-safetynet response doesn't match".into(),
            ));
        }

        // The response must come from the SafetyNet service itself.
        let leaf = certificate::parse(&response.x5c[0])?;
        if certificate::subject_common_name(&leaf).as_deref() != Some("attest.android.com") {
            return Err(VerificationError::BadAttestationStatement(
                "the attestation certificate is not issued to 'attest.android.com'".into(),
            ));
        }

        if response.payload.cts_profile_match != Some(true) {
            return Err(VerificationError::BadAttestationStatement(
                "the device doesn't match a profile that has passed the Android CTS".into(),
            ));
        }

        let timestamp_ms = response.payload.timestamp_ms.ok_or_else(|| {
            VerificationError::BadAttestationStatement("timestampMs must not be null".into())
        })?;
        let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms as i64)
            .ok_or_else(|| {
                VerificationError::BadAttestationStatement("timestampMs is out of range".into())
            })?;
        if timestamp < object.timestamp - self.backward_threshold {
            return Err(VerificationError::BadAttestationStatement(
                "timestampMs violates the backward threshold".into(),
            ));
        }
        if timestamp > object.timestamp + self.forward_threshold {
            return Err(VerificationError::BadAttestationStatement(
                "timestampMs violates the forward threshold".into(),
            ));
        }

        if !response.is_valid_signature() {
            trace!("android-safetynet JWS signature did not verify");
            return Err(VerificationError::BadSignature);
        }

        Ok(AttestationType::Basic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_jws() {
        assert!(Jws::parse(b"only.two").is_err());
        assert!(Jws::parse(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn jws_signature_to_der_handles_raw_pairs() {
        let raw = [1u8; 64];
        assert!(jws_signature_to_der(&raw).is_some());
        assert!(jws_signature_to_der(&raw[..63]).is_none());
        assert!(jws_signature_to_der(&[]).is_none());
    }
}

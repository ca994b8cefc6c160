//! Attestation statements and their per-format verifiers.
//!
//! The statement is a tagged union over the attestation format string; the
//! registry maps each format discriminator to its verifier. Dispatch is by
//! the discriminator only — there is no type-based branching anywhere in
//! the verification path.

pub(crate) mod certificate;

mod android_key;
mod android_safetynet;
mod apple;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

pub use android_key::AndroidKeyAttestationStatementVerifier;
pub use android_safetynet::{
    AndroidSafetyNetAttestationStatementVerifier, Jws, SafetyNetResponse,
};
pub use apple::AppleAnonymousAttestationStatementVerifier;
pub use fido_u2f::FidoU2fAttestationStatementVerifier;
pub use none::NoneAttestationStatementVerifier;
pub use packed::PackedAttestationStatementVerifier;
pub use tpm::{
    TpmAttestationStatementVerifier, TpmEccParms, TpmRsaParms, TpmsAttest, TpmsCertifyInfo,
    TpmsClockInfo, TpmtHa, TpmtPublic, TpmuPublicId, TpmuPublicParms,
};

use ciborium::value::Value;

use crate::authenticator_data::AuthenticatorData;
use crate::cbor;
use crate::cose::CoseAlgorithm;
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub const FORMAT_NONE: &str = "none";
pub const FORMAT_FIDO_U2F: &str = "fido-u2f";
pub const FORMAT_PACKED: &str = "packed";
pub const FORMAT_ANDROID_KEY: &str = "android-key";
pub const FORMAT_ANDROID_SAFETYNET: &str = "android-safetynet";
pub const FORMAT_TPM: &str = "tpm";
pub const FORMAT_APPLE: &str = "apple";

/// The attestation type a statement verifier reports on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationType {
    None,
    Basic,
    Self_,
    AttCa,
    AnonCa,
}

impl AttestationType {
    /// Whether this result implies an attestation certificate path that
    /// must chain to a trust anchor.
    pub fn requires_trust_path(self) -> bool {
        matches!(
            self,
            AttestationType::Basic | AttestationType::AttCa | AttestationType::AnonCa
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidoU2fStatement {
    pub sig: Vec<u8>,
    /// Exactly one attestation certificate, DER encoded.
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStatement {
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    /// Attestation certificate chain; absent for self attestation.
    pub x5c: Option<Vec<Vec<u8>>>,
    /// Retained only so ECDAA statements can be rejected explicitly.
    pub ecdaa_key_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidKeyStatement {
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSafetyNetStatement {
    pub ver: String,
    pub response: Jws,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmStatement {
    pub ver: String,
    pub alg: CoseAlgorithm,
    pub x5c: Option<Vec<Vec<u8>>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
    pub sig: Vec<u8>,
    pub cert_info: TpmsAttest,
    pub cert_info_raw: Vec<u8>,
    pub pub_area: TpmtPublic,
    pub pub_area_raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleStatement {
    pub x5c: Vec<Vec<u8>>,
}

/// An attestation statement, tagged by format.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationStatement {
    None,
    FidoU2f(FidoU2fStatement),
    Packed(PackedStatement),
    AndroidKey(AndroidKeyStatement),
    AndroidSafetyNet(AndroidSafetyNetStatement),
    Tpm(TpmStatement),
    Apple(AppleStatement),
    /// A format the data layer does not model. The statement contents are
    /// dropped; the registry rejects the format at verification time with
    /// [`VerificationError::UnsupportedAttestationFormat`].
    Unsupported { format: String },
}

impl AttestationStatement {
    pub fn format(&self) -> &str {
        match self {
            AttestationStatement::None => FORMAT_NONE,
            AttestationStatement::FidoU2f(_) => FORMAT_FIDO_U2F,
            AttestationStatement::Packed(_) => FORMAT_PACKED,
            AttestationStatement::AndroidKey(_) => FORMAT_ANDROID_KEY,
            AttestationStatement::AndroidSafetyNet(_) => FORMAT_ANDROID_SAFETYNET,
            AttestationStatement::Tpm(_) => FORMAT_TPM,
            AttestationStatement::Apple(_) => FORMAT_APPLE,
            AttestationStatement::Unsupported { format } => format,
        }
    }

    /// The DER certificate chain carried by the statement, if any. The
    /// first element is the end-entity attestation certificate.
    pub fn x5c(&self) -> Option<&[Vec<u8>]> {
        match self {
            AttestationStatement::FidoU2f(s) => Some(&s.x5c),
            AttestationStatement::Packed(s) => s.x5c.as_deref(),
            AttestationStatement::AndroidKey(s) => Some(&s.x5c),
            AttestationStatement::AndroidSafetyNet(s) => Some(&s.response.x5c),
            AttestationStatement::Tpm(s) => s.x5c.as_deref(),
            AttestationStatement::Apple(s) => Some(&s.x5c),
            AttestationStatement::None | AttestationStatement::Unsupported { .. } => None,
        }
    }

    fn decode(format: &str, entries: &[(Value, Value)]) -> DecodeResult<Self> {
        match format {
            FORMAT_NONE => Ok(AttestationStatement::None),
            FORMAT_FIDO_U2F => fido_u2f::decode_statement(entries),
            FORMAT_PACKED => packed::decode_statement(entries),
            FORMAT_ANDROID_KEY => android_key::decode_statement(entries),
            FORMAT_ANDROID_SAFETYNET => android_safetynet::decode_statement(entries),
            FORMAT_TPM => tpm::decode_statement(entries),
            FORMAT_APPLE => apple::decode_statement(entries),
            other => Ok(AttestationStatement::Unsupported {
                format: other.to_string(),
            }),
        }
    }

    fn to_cbor_map(&self) -> Vec<(Value, Value)> {
        match self {
            AttestationStatement::None | AttestationStatement::Unsupported { .. } => Vec::new(),
            AttestationStatement::FidoU2f(s) => fido_u2f::encode_statement(s),
            AttestationStatement::Packed(s) => packed::encode_statement(s),
            AttestationStatement::AndroidKey(s) => android_key::encode_statement(s),
            AttestationStatement::AndroidSafetyNet(s) => android_safetynet::encode_statement(s),
            AttestationStatement::Tpm(s) => tpm::encode_statement(s),
            AttestationStatement::Apple(s) => apple::encode_statement(s),
        }
    }
}

/// The root decoded structure of a registration response.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub auth_data: AuthenticatorData,
    /// The exact authenticator-data bytes as received; attestation
    /// signatures are computed over these, not over a re-encoding.
    pub auth_data_bytes: Vec<u8>,
    pub format: String,
    pub statement: AttestationStatement,
}

impl AttestationObject {
    /// Decode the CBOR attestation object `{"authData", "fmt", "attStmt"}`.
    /// Unknown top-level keys are ignored; missing required keys are
    /// errors.
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let value = cbor::parse(bytes, "attestation object")?;
        let entries = cbor::as_map(&value, "attestation object")?;

        let format = cbor::as_text(
            cbor::text_entry(entries, "fmt").ok_or(DecodeError::MissingField("fmt"))?,
            "fmt",
        )?
        .to_string();
        let auth_data_bytes = cbor::as_bytes(
            cbor::text_entry(entries, "authData").ok_or(DecodeError::MissingField("authData"))?,
            "authData",
        )?
        .to_vec();
        let att_stmt = cbor::as_map(
            cbor::text_entry(entries, "attStmt").ok_or(DecodeError::MissingField("attStmt"))?,
            "attStmt",
        )?;

        let auth_data = AuthenticatorData::decode(&auth_data_bytes)?;
        let statement = AttestationStatement::decode(&format, att_stmt)?;

        Ok(AttestationObject {
            auth_data,
            auth_data_bytes,
            format,
            statement,
        })
    }

    /// Encode back to the CBOR wire form.
    pub fn encode(&self) -> Vec<u8> {
        let map = Value::Map(vec![
            (
                Value::Text("fmt".into()),
                Value::Text(self.format.clone()),
            ),
            (
                Value::Text("attStmt".into()),
                Value::Map(self.statement.to_cbor_map()),
            ),
            (
                Value::Text("authData".into()),
                Value::Bytes(self.auth_data_bytes.clone()),
            ),
        ]);
        cbor::encode(&map)
    }
}

/// One configured verifier, tagged by the format it serves.
pub enum FormatVerifier {
    None(NoneAttestationStatementVerifier),
    FidoU2f(FidoU2fAttestationStatementVerifier),
    Packed(PackedAttestationStatementVerifier),
    AndroidKey(AndroidKeyAttestationStatementVerifier),
    AndroidSafetyNet(AndroidSafetyNetAttestationStatementVerifier),
    Tpm(TpmAttestationStatementVerifier),
    Apple(AppleAnonymousAttestationStatementVerifier),
}

impl FormatVerifier {
    fn format(&self) -> &'static str {
        match self {
            FormatVerifier::None(_) => FORMAT_NONE,
            FormatVerifier::FidoU2f(_) => FORMAT_FIDO_U2F,
            FormatVerifier::Packed(_) => FORMAT_PACKED,
            FormatVerifier::AndroidKey(_) => FORMAT_ANDROID_KEY,
            FormatVerifier::AndroidSafetyNet(_) => FORMAT_ANDROID_SAFETYNET,
            FormatVerifier::Tpm(_) => FORMAT_TPM,
            FormatVerifier::Apple(_) => FORMAT_APPLE,
        }
    }

    fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        match self {
            FormatVerifier::None(v) => v.verify(object),
            FormatVerifier::FidoU2f(v) => v.verify(object),
            FormatVerifier::Packed(v) => v.verify(object),
            FormatVerifier::AndroidKey(v) => v.verify(object),
            FormatVerifier::AndroidSafetyNet(v) => v.verify(object),
            FormatVerifier::Tpm(v) => v.verify(object),
            FormatVerifier::Apple(v) => v.verify(object),
        }
    }
}

/// Immutable table mapping the attestation format discriminator to its
/// verifier. Built once at startup and shared read-only across concurrent
/// verification calls.
pub struct StatementVerifierRegistry {
    entries: Vec<FormatVerifier>,
}

impl StatementVerifierRegistry {
    /// A registry covering every format the engine implements, with each
    /// verifier in its default configuration.
    pub fn all_formats() -> Self {
        StatementVerifierRegistry {
            entries: vec![
                FormatVerifier::None(NoneAttestationStatementVerifier),
                FormatVerifier::FidoU2f(FidoU2fAttestationStatementVerifier),
                FormatVerifier::Packed(PackedAttestationStatementVerifier),
                FormatVerifier::AndroidKey(AndroidKeyAttestationStatementVerifier::default()),
                FormatVerifier::AndroidSafetyNet(
                    AndroidSafetyNetAttestationStatementVerifier::default(),
                ),
                FormatVerifier::Tpm(TpmAttestationStatementVerifier),
                FormatVerifier::Apple(AppleAnonymousAttestationStatementVerifier),
            ],
        }
    }

    /// An empty registry; every format is rejected until registered.
    pub fn empty() -> Self {
        StatementVerifierRegistry { entries: Vec::new() }
    }

    /// Register a verifier, replacing any existing entry for its format.
    pub fn register(mut self, verifier: FormatVerifier) -> Self {
        self.entries.retain(|e| e.format() != verifier.format());
        self.entries.push(verifier);
        self
    }

    pub fn supports(&self, format: &str) -> bool {
        self.entries.iter().any(|e| e.format() == format)
    }

    /// Dispatch to the verifier registered for the response's format.
    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let format = object.attestation_object.format.as_str();
        let verifier = self
            .entries
            .iter()
            .find(|e| e.format() == format)
            .ok_or_else(|| {
                VerificationError::UnsupportedAttestationFormat(format.to_string())
            })?;
        verifier.verify(object)
    }
}

/// The data every certificate-based statement signs:
/// `authenticatorData ‖ clientDataHash`.
pub(crate) fn att_to_be_signed(object: &RegistrationObject<'_>) -> Vec<u8> {
    let auth_data = &object.attestation_object.auth_data_bytes;
    let mut data = Vec::with_capacity(auth_data.len() + object.client_data_hash.len());
    data.extend_from_slice(auth_data);
    data.extend_from_slice(&object.client_data_hash);
    data
}

/// Decode the `x5c` entry of a statement map into DER certificates,
/// verifying each one parses as X.509.
pub(crate) fn decode_x5c(value: &Value) -> DecodeResult<Vec<Vec<u8>>> {
    let items = cbor::as_array(value, "x5c")?;
    items
        .iter()
        .map(|item| {
            let der = cbor::as_bytes(item, "x5c entry")?;
            openssl::x509::X509::from_der(der)?;
            Ok(der.to_vec())
        })
        .collect()
}

pub(crate) fn encode_x5c(certs: &[Vec<u8>]) -> Value {
    Value::Array(certs.iter().map(|der| Value::Bytes(der.clone())).collect())
}

use thiserror::Error;

/// Failure to decode raw bytes into a typed structure.
///
/// A `DecodeError` means the input is structurally malformed: it cannot be
/// understood as CBOR, JSON or the fixed binary layouts WebAuthn defines.
/// It is never produced for structurally valid input that merely fails a
/// protocol or trust check — that is [`VerificationError`] territory — so a
/// caller can always distinguish "malformed request" from "untrusted or
/// forged response".
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid CBOR: {0}")]
    Cbor(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: input ended after {actual} bytes, {expected} required")]
    UnexpectedEnd {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{0}: input contains {1} surplus bytes")]
    SurplusBytes(&'static str, usize),

    #[error("attestation object: required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("attestation object: field `{0}` has an unexpected type")]
    UnexpectedType(&'static str),

    #[error("COSE key: unsupported key type {0}")]
    UnsupportedKeyType(i64),

    #[error("COSE key: unsupported elliptic curve {0}")]
    UnsupportedCurve(i64),

    #[error("COSE key: unsupported algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("COSE key: {0}")]
    InvalidCoseKey(&'static str),

    #[error("TPM structure: {0}")]
    Tpm(&'static str),

    #[error("JWS: {0}")]
    Jws(&'static str),

    #[error("invalid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid origin `{0}`")]
    InvalidOrigin(String),

    #[error("X.509 certificate: {0}")]
    Certificate(#[from] openssl::error::ErrorStack),
}

/// Failure of a protocol or trust check on structurally valid input.
///
/// Each variant corresponds to one rule of the registration or
/// authentication ceremony. Every check fails fast: the first failing
/// check's error is the one the caller sees, with no aggregation and no
/// internal retries.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("attestation statement is invalid: {0}")]
    BadAttestationStatement(String),

    #[error("attestation statement format `{0}` is not supported")]
    UnsupportedAttestationFormat(String),

    #[error("signature is invalid")]
    BadSignature,

    #[error("algorithm mismatch: {0}")]
    BadAlgorithm(String),

    #[error("certificate path validation failed: {0}")]
    CertPath(String),

    #[error("no trust anchors are registered for the presented attestation")]
    TrustAnchorNotFound,

    #[error("certificate is unacceptable: {0}")]
    Certificate(String),

    #[error("sign count {presented} is not greater than the stored sign count {stored}; the credential may be cloned")]
    MaliciousCounterValue { presented: u32, stored: u32 },

    #[error("aaguid is invalid for this attestation format")]
    BadAaguid,

    #[error("user presence flag is not set")]
    UserNotPresent,

    #[error("user verification flag is not set")]
    UserNotVerified,

    #[error("backup state flag is set while backup eligibility flag is not")]
    IllegalBackupState,

    #[error("backup eligibility flag does not match the stored credential record")]
    BadBackupEligibleFlag,

    #[error("challenge does not match")]
    BadChallenge,

    #[error("origin `{0}` is not accepted")]
    BadOrigin(String),

    #[error("cross-origin request is prohibited")]
    CrossOrigin,

    #[error("top origin `{0}` is not accepted")]
    BadTopOrigin(String),

    #[error("rpIdHash does not match the SHA-256 hash of the relying party id")]
    BadRpIdHash,

    #[error("credential algorithm is not among the allowed public key parameters")]
    NotAllowedAlgorithm,

    #[error("credential id is not among the allowed credentials")]
    NotAllowedCredentialId,

    #[error("credential id length {0} exceeds the configured maximum {1}")]
    CredentialIdTooLong(usize, usize),

    #[error("android key description is invalid: {0}")]
    KeyDescriptionValidation(String),

    #[error("client data type `{presented}` does not match `{expected}`")]
    InconsistentClientDataType {
        presented: String,
        expected: &'static str,
    },

    #[error("token binding does not match")]
    TokenBinding,

    #[error("self attestation is not acceptable under the configured policy")]
    SelfAttestationProhibited,

    #[error("attested credential data must be present on registration")]
    MissingAttestedCredentialData,

    #[error("attested credential data must be absent on authentication")]
    UnexpectedAttestedCredentialData,

    #[error("openssl failure: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

/// Either side of the two-taxonomy split, for the top-level API that both
/// decodes and verifies in one call.
#[derive(Error, Debug)]
pub enum WebauthnError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
pub type VerifyResult<T> = std::result::Result<T, VerificationError>;

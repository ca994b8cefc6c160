//! COSE public keys (RFC 9052) as used by WebAuthn credentials.
//!
//! A credential public key arrives as a CBOR map with integer labels. The
//! decoder here is explicit about every label and rejects keys whose
//! parameters are inconsistent (wrong coordinate length, curve/type
//! mismatch), since the encoding is supplied by the authenticator and must
//! be treated as untrusted.

use ciborium::value::Value;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};

use crate::cbor;
use crate::error::{DecodeError, DecodeResult};

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_N: i64 = -1;
const LABEL_E: i64 = -2;

/// COSE algorithm identifiers supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Rs1,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
}

impl CoseAlgorithm {
    pub fn from_registry_value(value: i64) -> DecodeResult<Self> {
        match value {
            -7 => Ok(CoseAlgorithm::Es256),
            -35 => Ok(CoseAlgorithm::Es384),
            -36 => Ok(CoseAlgorithm::Es512),
            -8 => Ok(CoseAlgorithm::EdDsa),
            -65535 => Ok(CoseAlgorithm::Rs1),
            -257 => Ok(CoseAlgorithm::Rs256),
            -258 => Ok(CoseAlgorithm::Rs384),
            -259 => Ok(CoseAlgorithm::Rs512),
            -37 => Ok(CoseAlgorithm::Ps256),
            other => Err(DecodeError::UnsupportedAlgorithm(other)),
        }
    }

    pub fn registry_value(self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::Es384 => -35,
            CoseAlgorithm::Es512 => -36,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Rs1 => -65535,
            CoseAlgorithm::Rs256 => -257,
            CoseAlgorithm::Rs384 => -258,
            CoseAlgorithm::Rs512 => -259,
            CoseAlgorithm::Ps256 => -37,
        }
    }

    /// The message digest paired with this algorithm. `None` for EdDSA,
    /// which hashes internally.
    pub(crate) fn message_digest(self) -> Option<MessageDigest> {
        match self {
            CoseAlgorithm::Es256 | CoseAlgorithm::Rs256 | CoseAlgorithm::Ps256 => {
                Some(MessageDigest::sha256())
            }
            CoseAlgorithm::Es384 | CoseAlgorithm::Rs384 => Some(MessageDigest::sha384()),
            CoseAlgorithm::Es512 | CoseAlgorithm::Rs512 => Some(MessageDigest::sha512()),
            CoseAlgorithm::Rs1 => Some(MessageDigest::sha1()),
            CoseAlgorithm::EdDsa => None,
        }
    }
}

/// Elliptic curves accepted in COSE keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseEllipticCurve {
    P256,
    P384,
    P521,
    Ed25519,
}

impl CoseEllipticCurve {
    fn from_registry_value(value: i64) -> DecodeResult<Self> {
        match value {
            1 => Ok(CoseEllipticCurve::P256),
            2 => Ok(CoseEllipticCurve::P384),
            3 => Ok(CoseEllipticCurve::P521),
            6 => Ok(CoseEllipticCurve::Ed25519),
            other => Err(DecodeError::UnsupportedCurve(other)),
        }
    }

    fn registry_value(self) -> i64 {
        match self {
            CoseEllipticCurve::P256 => 1,
            CoseEllipticCurve::P384 => 2,
            CoseEllipticCurve::P521 => 3,
            CoseEllipticCurve::Ed25519 => 6,
        }
    }

    /// Field size in bytes; coordinate byte strings must match exactly.
    pub(crate) fn coordinate_size(self) -> usize {
        match self {
            CoseEllipticCurve::P256 => 32,
            CoseEllipticCurve::P384 => 48,
            CoseEllipticCurve::P521 => 66,
            CoseEllipticCurve::Ed25519 => 32,
        }
    }

    fn nid(self) -> Option<Nid> {
        match self {
            CoseEllipticCurve::P256 => Some(Nid::X9_62_PRIME256V1),
            CoseEllipticCurve::P384 => Some(Nid::SECP384R1),
            CoseEllipticCurve::P521 => Some(Nid::SECP521R1),
            CoseEllipticCurve::Ed25519 => None,
        }
    }
}

/// A credential public key, tagged by COSE key type.
///
/// Immutable once decoded. Each variant can reconstruct its openssl
/// public key and verify signatures with the algorithm it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 {
        curve: CoseEllipticCurve,
        alg: CoseAlgorithm,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        alg: CoseAlgorithm,
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Okp {
        curve: CoseEllipticCurve,
        alg: CoseAlgorithm,
        x: Vec<u8>,
    },
}

impl CoseKey {
    /// Decode a COSE key from a CBOR value.
    pub fn from_cbor_value(value: &Value) -> DecodeResult<Self> {
        let entries = cbor::as_map(value, "COSE key")?;

        let kty = cbor::as_i64(
            cbor::int_entry(entries, LABEL_KTY).ok_or(DecodeError::InvalidCoseKey("kty missing"))?,
            "kty",
        )?;
        let alg = cbor::as_i64(
            cbor::int_entry(entries, LABEL_ALG).ok_or(DecodeError::InvalidCoseKey("alg missing"))?,
            "alg",
        )?;
        let alg = CoseAlgorithm::from_registry_value(alg)?;

        match kty {
            KTY_EC2 => {
                let curve = CoseEllipticCurve::from_registry_value(cbor::as_i64(
                    cbor::int_entry(entries, LABEL_CRV)
                        .ok_or(DecodeError::InvalidCoseKey("crv missing"))?,
                    "crv",
                )?)?;
                if curve == CoseEllipticCurve::Ed25519 {
                    return Err(DecodeError::InvalidCoseKey("Ed25519 is not an EC2 curve"));
                }
                let x = cbor::as_bytes(
                    cbor::int_entry(entries, LABEL_X)
                        .ok_or(DecodeError::InvalidCoseKey("x missing"))?,
                    "x",
                )?
                .to_vec();
                let y = cbor::as_bytes(
                    cbor::int_entry(entries, LABEL_Y)
                        .ok_or(DecodeError::InvalidCoseKey("y missing"))?,
                    "y",
                )?
                .to_vec();
                if x.len() != curve.coordinate_size() || y.len() != curve.coordinate_size() {
                    return Err(DecodeError::InvalidCoseKey(
                        "EC2 coordinate length does not match the curve field size",
                    ));
                }
                Ok(CoseKey::Ec2 { curve, alg, x, y })
            }
            KTY_RSA => {
                let n = cbor::as_bytes(
                    cbor::int_entry(entries, LABEL_N)
                        .ok_or(DecodeError::InvalidCoseKey("n missing"))?,
                    "n",
                )?
                .to_vec();
                let e = cbor::as_bytes(
                    cbor::int_entry(entries, LABEL_E)
                        .ok_or(DecodeError::InvalidCoseKey("e missing"))?,
                    "e",
                )?
                .to_vec();
                if n.is_empty() || e.is_empty() {
                    return Err(DecodeError::InvalidCoseKey("RSA parameters must not be empty"));
                }
                Ok(CoseKey::Rsa { alg, n, e })
            }
            KTY_OKP => {
                let curve = CoseEllipticCurve::from_registry_value(cbor::as_i64(
                    cbor::int_entry(entries, LABEL_CRV)
                        .ok_or(DecodeError::InvalidCoseKey("crv missing"))?,
                    "crv",
                )?)?;
                if curve != CoseEllipticCurve::Ed25519 {
                    return Err(DecodeError::InvalidCoseKey("OKP curve must be Ed25519"));
                }
                let x = cbor::as_bytes(
                    cbor::int_entry(entries, LABEL_X)
                        .ok_or(DecodeError::InvalidCoseKey("x missing"))?,
                    "x",
                )?
                .to_vec();
                if x.len() != curve.coordinate_size() {
                    return Err(DecodeError::InvalidCoseKey("OKP public key must be 32 bytes"));
                }
                Ok(CoseKey::Okp { curve, alg, x })
            }
            other => Err(DecodeError::UnsupportedKeyType(other)),
        }
    }

    /// Decode a COSE key from raw CBOR bytes.
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let value = cbor::parse(bytes, "COSE key")?;
        Self::from_cbor_value(&value)
    }

    /// Encode back to the CBOR map form.
    pub fn to_cbor_value(&self) -> Value {
        let int = |i: i64| Value::Integer(i.into());
        let entries = match self {
            CoseKey::Ec2 { curve, alg, x, y } => vec![
                (int(LABEL_KTY), int(KTY_EC2)),
                (int(LABEL_ALG), int(alg.registry_value())),
                (int(LABEL_CRV), int(curve.registry_value())),
                (int(LABEL_X), Value::Bytes(x.clone())),
                (int(LABEL_Y), Value::Bytes(y.clone())),
            ],
            CoseKey::Rsa { alg, n, e } => vec![
                (int(LABEL_KTY), int(KTY_RSA)),
                (int(LABEL_ALG), int(alg.registry_value())),
                (int(LABEL_N), Value::Bytes(n.clone())),
                (int(LABEL_E), Value::Bytes(e.clone())),
            ],
            CoseKey::Okp { curve, alg, x } => vec![
                (int(LABEL_KTY), int(KTY_OKP)),
                (int(LABEL_ALG), int(alg.registry_value())),
                (int(LABEL_CRV), int(curve.registry_value())),
                (int(LABEL_X), Value::Bytes(x.clone())),
            ],
        };
        Value::Map(entries)
    }

    /// Encode to raw CBOR bytes.
    pub fn encode(&self) -> Vec<u8> {
        cbor::encode(&self.to_cbor_value())
    }

    /// The signature algorithm this key declares.
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2 { alg, .. } | CoseKey::Rsa { alg, .. } | CoseKey::Okp { alg, .. } => *alg,
        }
    }

    /// Reconstruct the openssl public key.
    pub(crate) fn public_key(&self) -> Result<PKey<Public>, ErrorStack> {
        match self {
            CoseKey::Ec2 { curve, x, y, .. } => {
                // Checked at decode time, but EC2 keys can also be built by
                // callers; fall back to an openssl error on a bad curve.
                let nid = curve.nid().ok_or_else(ErrorStack::get)?;
                let group = EcGroup::from_curve_name(nid)?;
                let x = BigNum::from_slice(x)?;
                let y = BigNum::from_slice(y)?;
                let ec = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
                PKey::from_ec_key(ec)
            }
            CoseKey::Rsa { n, e, .. } => {
                let n = BigNum::from_slice(n)?;
                let e = BigNum::from_slice(e)?;
                let rsa = Rsa::from_public_components(n, e)?;
                PKey::from_rsa(rsa)
            }
            CoseKey::Okp { x, .. } => PKey::public_key_from_raw_bytes(x, Id::ED25519),
        }
    }

    /// Verify `signature` over `data` with this key and its declared
    /// algorithm. All failure modes (unsupported parameters, malformed
    /// signatures, cryptographic mismatch) collapse to `false` so callers
    /// surface a single undifferentiated signature error.
    pub fn verify_signature(&self, signature: &[u8], data: &[u8]) -> bool {
        let Ok(key) = self.public_key() else {
            return false;
        };
        verify_with_key(self.algorithm(), &key, signature, data).unwrap_or(false)
    }

    /// The ANSI X9.62 uncompressed point `0x04 ‖ x ‖ y`, as required by the
    /// FIDO-U2F signed-data layout. Only meaningful for EC2 keys.
    pub fn uncompressed_ec_point(&self) -> Option<Vec<u8>> {
        match self {
            CoseKey::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    /// Whether this key equals the subject public key of `other`.
    pub(crate) fn matches_public_key(&self, other: &PKeyRef<Public>) -> bool {
        match self.public_key() {
            Ok(key) => key.public_eq(other),
            Err(_) => false,
        }
    }
}

/// Verify a signature with an arbitrary public key (typically one taken
/// from an attestation certificate) and a COSE algorithm.
pub(crate) fn verify_with_key(
    alg: CoseAlgorithm,
    key: &PKeyRef<Public>,
    signature: &[u8],
    data: &[u8],
) -> Result<bool, ErrorStack> {
    match alg {
        CoseAlgorithm::EdDsa => {
            let mut verifier = Verifier::new_without_digest(key)?;
            verifier.verify_oneshot(signature, data)
        }
        CoseAlgorithm::Ps256 => {
            let digest = MessageDigest::sha256();
            let mut verifier = Verifier::new(digest, key)?;
            verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
            verifier.set_rsa_mgf1_md(digest)?;
            verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            verifier.update(data)?;
            verifier.verify(signature)
        }
        _ => {
            let Some(digest) = alg.message_digest() else {
                return Ok(false);
            };
            let mut verifier = Verifier::new(digest, key)?;
            verifier.update(data)?;
            verifier.verify(signature)
        }
    }
}

//! TPM attestation (WebAuthn §8.3).
//!
//! The statement embeds two TPM 2.0 binary structures: `TPMS_ATTEST`
//! (what the TPM certified) and `TPMT_PUBLIC` (the key it certified).
//! Both are parsed with explicit big-endian cursors; surplus bytes are
//! rejected.

use ciborium::value::Value;
use openssl::hash::{hash, MessageDigest};
use tracing::trace;

use crate::attestation::{
    certificate, decode_x5c, encode_x5c, att_to_be_signed, AttestationStatement, AttestationType,
    TpmStatement,
};
use crate::cbor;
use crate::cose::{self, CoseAlgorithm, CoseEllipticCurve, CoseKey};
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_SHA1: u16 = 0x0004;
pub const TPM_ALG_SHA256: u16 = 0x000b;
pub const TPM_ALG_SHA384: u16 = 0x000c;
pub const TPM_ALG_SHA512: u16 = 0x000d;
pub const TPM_ALG_ECC: u16 = 0x0023;

pub const TPM_ECC_NIST_P256: u16 = 0x0003;
pub const TPM_ECC_NIST_P384: u16 = 0x0004;
pub const TPM_ECC_NIST_P521: u16 = 0x0005;

const VERSION_2_0: &str = "2.0";

/// Big-endian cursor over a TPM structure.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.bytes.len() < self.pos + n {
            return Err(DecodeError::Tpm("structure is truncated"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> DecodeResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// A TPM2B sized buffer: 2-byte length prefix followed by the data.
    fn sized_buffer(&mut self) -> DecodeResult<Vec<u8>> {
        let len = self.u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self, context: &'static str) -> DecodeResult<()> {
        if self.pos < self.bytes.len() {
            Err(DecodeError::SurplusBytes(context, self.bytes.len() - self.pos))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
}

/// A TPMT_HA: hash algorithm id plus digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtHa {
    pub hash_alg: u16,
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCertifyInfo {
    pub name: TpmtHa,
    pub qualified_name: TpmtHa,
}

/// TPMS_ATTEST (TPMv2-Part2 §10.12.8), restricted to TPM_ST_ATTEST_CERTIFY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub attest_type: u16,
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock_info: TpmsClockInfo,
    pub firmware_version: u64,
    pub attested: TpmsCertifyInfo,
}

impl TpmsAttest {
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        let attest_type = r.u16()?;
        if attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(DecodeError::Tpm(
                "only TPM_ST_ATTEST_CERTIFY attestation is supported",
            ));
        }
        let qualified_signer = r.sized_buffer()?;
        let extra_data = r.sized_buffer()?;
        let clock_info = TpmsClockInfo {
            clock: r.u64()?,
            reset_count: r.u32()?,
            restart_count: r.u32()?,
            safe: r.u8()? != 0,
        };
        let firmware_version = r.u64()?;
        let attested = TpmsCertifyInfo {
            name: Self::decode_tpmt_ha(&mut r)?,
            qualified_name: Self::decode_tpmt_ha(&mut r)?,
        };
        r.finish("TPMS_ATTEST")?;
        Ok(TpmsAttest {
            magic,
            attest_type,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            attested,
        })
    }

    /// A TPM2B_NAME holding a TPMT_HA: the sized buffer starts with the
    /// 2-byte hash algorithm, the rest is the digest.
    fn decode_tpmt_ha(r: &mut Reader<'_>) -> DecodeResult<TpmtHa> {
        let size = r.u16()? as usize;
        if size < 2 {
            return Err(DecodeError::Tpm("TPMT_HA must carry a hash algorithm"));
        }
        let hash_alg = r.u16()?;
        let digest = r.take(size - 2)?.to_vec();
        Ok(TpmtHa { hash_alg, digest })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmRsaParms {
    pub symmetric: u16,
    pub scheme: u16,
    pub key_bits: u16,
    pub exponent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmEccParms {
    pub symmetric: u16,
    pub scheme: u16,
    pub curve_id: u16,
    pub kdf: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicParms {
    Rsa(TpmRsaParms),
    Ecc(TpmEccParms),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    Rsa { modulus: Vec<u8> },
    Ecc { x: Vec<u8>, y: Vec<u8> },
}

/// TPMT_PUBLIC (TPMv2-Part2 §12.2.4), restricted to RSA and ECC keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub key_type: u16,
    pub name_alg: u16,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub parameters: TpmuPublicParms,
    pub unique: TpmuPublicId,
}

impl TpmtPublic {
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(bytes);
        let key_type = r.u16()?;
        let name_alg = r.u16()?;
        let object_attributes = r.u32()?;
        let auth_policy = r.sized_buffer()?;
        let (parameters, unique) = match key_type {
            TPM_ALG_RSA => {
                let parms = TpmRsaParms {
                    symmetric: r.u16()?,
                    scheme: r.u16()?,
                    key_bits: r.u16()?,
                    exponent: r.u32()?,
                };
                let modulus = r.sized_buffer()?;
                (TpmuPublicParms::Rsa(parms), TpmuPublicId::Rsa { modulus })
            }
            TPM_ALG_ECC => {
                let parms = TpmEccParms {
                    symmetric: r.u16()?,
                    scheme: r.u16()?,
                    curve_id: r.u16()?,
                    kdf: r.u16()?,
                };
                let x = r.sized_buffer()?;
                let y = r.sized_buffer()?;
                (TpmuPublicParms::Ecc(parms), TpmuPublicId::Ecc { x, y })
            }
            _ => return Err(DecodeError::Tpm("unsupported TPMI_ALG_PUBLIC key type")),
        };
        r.finish("TPMT_PUBLIC")?;
        Ok(TpmtPublic {
            key_type,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        })
    }
}

pub(super) fn decode_statement(entries: &[(Value, Value)]) -> DecodeResult<AttestationStatement> {
    let ver = cbor::as_text(
        cbor::text_entry(entries, "ver").ok_or(DecodeError::MissingField("ver"))?,
        "ver",
    )?
    .to_string();
    let alg = CoseAlgorithm::from_registry_value(cbor::as_i64(
        cbor::text_entry(entries, "alg").ok_or(DecodeError::MissingField("alg"))?,
        "alg",
    )?)?;
    let sig = cbor::as_bytes(
        cbor::text_entry(entries, "sig").ok_or(DecodeError::MissingField("sig"))?,
        "sig",
    )?
    .to_vec();
    let cert_info_raw = cbor::as_bytes(
        cbor::text_entry(entries, "certInfo").ok_or(DecodeError::MissingField("certInfo"))?,
        "certInfo",
    )?
    .to_vec();
    let pub_area_raw = cbor::as_bytes(
        cbor::text_entry(entries, "pubArea").ok_or(DecodeError::MissingField("pubArea"))?,
        "pubArea",
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

    let cert_info = TpmsAttest::decode(&cert_info_raw)?;
    let pub_area = TpmtPublic::decode(&pub_area_raw)?;

    Ok(AttestationStatement::Tpm(TpmStatement {
        ver,
        alg,
        x5c,
        ecdaa_key_id,
        sig,
        cert_info,
        cert_info_raw,
        pub_area,
        pub_area_raw,
    }))
}

pub(super) fn encode_statement(statement: &TpmStatement) -> Vec<(Value, Value)> {
    let mut entries = vec![
        (Value::Text("ver".into()), Value::Text(statement.ver.clone())),
        (
            Value::Text("alg".into()),
            Value::Integer(statement.alg.registry_value().into()),
        ),
    ];
    if let Some(x5c) = &statement.x5c {
        entries.push((Value::Text("x5c".into()), encode_x5c(x5c)));
    }
    if let Some(id) = &statement.ecdaa_key_id {
        entries.push((Value::Text("ecdaaKeyId".into()), Value::Bytes(id.clone())));
    }
    entries.push((Value::Text("sig".into()), Value::Bytes(statement.sig.clone())));
    entries.push((
        Value::Text("certInfo".into()),
        Value::Bytes(statement.cert_info_raw.clone()),
    ));
    entries.push((
        Value::Text("pubArea".into()),
        Value::Bytes(statement.pub_area_raw.clone()),
    ));
    entries
}

pub struct TpmAttestationStatementVerifier;

impl TpmAttestationStatementVerifier {
    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let AttestationStatement::Tpm(statement) = &object.attestation_object.statement else {
            return Err(VerificationError::BadAttestationStatement(
                "tpm attestation statement is not found".into(),
            ));
        };

        if statement.ver != VERSION_2_0 {
            return Err(VerificationError::BadAttestationStatement(
                "TPM version is not supported".into(),
            ));
        }

        // The key the TPM certified must be the credential key.
        let acd = object.attested_credential_data()?;
        verify_public_key_equality(&statement.pub_area, &acd.cose_key)?;

        let cert_info = &statement.cert_info;
        if cert_info.magic != TPM_GENERATED_VALUE {
            return Err(VerificationError::BadAttestationStatement(
                "magic must be TPM_GENERATED_VALUE".into(),
            ));
        }
        if cert_info.attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(VerificationError::BadAttestationStatement(
                "type must be TPM_ST_ATTEST_CERTIFY".into(),
            ));
        }

        // extraData must be the hash of attToBeSigned under the statement
        // algorithm's digest.
        let att_to_be_signed = att_to_be_signed(object);
        let digest = statement.alg.message_digest().ok_or_else(|| {
            VerificationError::BadAttestationStatement(
                "statement algorithm has no digest usable for extraData".into(),
            )
        })?;
        let expected_extra_data = hash(digest, &att_to_be_signed)?;
        if cert_info.extra_data != expected_extra_data.as_ref() {
            return Err(VerificationError::BadAttestationStatement(
                "extraData must equal the hash of attToBeSigned".into(),
            ));
        }

        // attested.name must be the nameAlg hash of pubArea.
        let name_digest = tpm_hash(cert_info.attested.name.hash_alg, &statement.pub_area_raw)
            .ok_or_else(|| {
                VerificationError::BadAttestationStatement(
                    "name hash algorithm is not supported".into(),
                )
            })??;
        if cert_info.attested.name.digest != name_digest {
            return Err(VerificationError::BadAttestationStatement(
                "hash of pubArea doesn't match the name field of certInfo".into(),
            ));
        }

        match (&statement.x5c, &statement.ecdaa_key_id) {
            (Some(x5c), _) => {
                self.verify_x5c(object, statement, x5c)?;
                Ok(AttestationType::AttCa)
            }
            (None, Some(_)) => Err(VerificationError::BadAttestationStatement(
                "ECDAA attestation is not supported".into(),
            )),
            (None, None) => Err(VerificationError::BadAttestationStatement(
                "`x5c` or `ecdaaKeyId` must be present".into(),
            )),
        }
    }

    fn verify_x5c(
        &self,
        object: &RegistrationObject<'_>,
        statement: &TpmStatement,
        x5c: &[Vec<u8>],
    ) -> VerifyResult<()> {
        let leaf_der = x5c.first().ok_or_else(|| {
            VerificationError::BadAttestationStatement(
                "no attestation certificate is found in tpm attestation statement".into(),
            )
        })?;
        let chain = certificate::openssl_chain(x5c)?;
        let aik_cert = &chain[0];

        // The signature covers certInfo, not attToBeSigned.
        let valid = cose::verify_with_key(
            statement.alg,
            &*aik_cert.public_key()?,
            &statement.sig,
            &statement.cert_info_raw,
        )
        .unwrap_or(false);
        if !valid {
            trace!("tpm attestation signature did not verify");
            return Err(VerificationError::BadSignature);
        }

        let parsed = certificate::parse(leaf_der)?;
        verify_aik_certificate_requirements(&parsed)?;

        let acd = object.attested_credential_data()?;
        if let Some(aaguid) = certificate::aaguid_extension(&parsed)? {
            if aaguid != acd.aaguid {
                return Err(VerificationError::BadAttestationStatement(
                    "AAGUID in aik certificate doesn't match the AAGUID in authenticator data"
                        .into(),
                ));
            }
        }
        Ok(())
    }
}

/// Whether the key in pubArea equals the credential public key.
fn verify_public_key_equality(pub_area: &TpmtPublic, cose_key: &CoseKey) -> VerifyResult<()> {
    let matches = match (&pub_area.parameters, &pub_area.unique, cose_key) {
        (
            TpmuPublicParms::Rsa(parms),
            TpmuPublicId::Rsa { modulus },
            CoseKey::Rsa { n, e, .. },
        ) => {
            // A zero exponent in pubArea means the default 2^16 + 1.
            let tpm_exponent = if parms.exponent == 0 {
                65537
            } else {
                parms.exponent
            };
            int_eq(n, modulus) && int_value(e) == Some(u64::from(tpm_exponent))
        }
        (
            TpmuPublicParms::Ecc(parms),
            TpmuPublicId::Ecc { x, y },
            CoseKey::Ec2 {
                curve,
                x: cose_x,
                y: cose_y,
                ..
            },
        ) => {
            let curve_matches = matches!(
                (curve, parms.curve_id),
                (CoseEllipticCurve::P256, TPM_ECC_NIST_P256)
                    | (CoseEllipticCurve::P384, TPM_ECC_NIST_P384)
                    | (CoseEllipticCurve::P521, TPM_ECC_NIST_P521)
            );
            curve_matches && int_eq(cose_x, x) && int_eq(cose_y, y)
        }
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(VerificationError::BadAttestationStatement(
            "public key in authenticator data and public key in pubArea don't match".into(),
        ))
    }
}

/// TPM attestation certificate requirements (WebAuthn §8.3.1).
fn verify_aik_certificate_requirements(
    cert: &x509_parser::certificate::X509Certificate<'_>,
) -> VerifyResult<()> {
    if !certificate::is_version_3(cert) {
        return Err(VerificationError::Certificate(
            "aik certificate must be version 3".into(),
        ));
    }
    if !certificate::subject_is_empty(cert) {
        return Err(VerificationError::Certificate(
            "aik certificate subject must be empty".into(),
        ));
    }
    if !certificate::has_subject_alternative_name(cert) {
        return Err(VerificationError::Certificate(
            "aik certificate must carry a Subject Alternative Name extension".into(),
        ));
    }
    if !certificate::has_aik_extended_key_usage(cert) {
        return Err(VerificationError::Certificate(
            "aik certificate doesn't contain the tcg-kp-AIKCertificate OID".into(),
        ));
    }
    if certificate::is_ca(cert) {
        return Err(VerificationError::Certificate(
            "aik certificate must not be a CA certificate".into(),
        ));
    }
    Ok(())
}

/// Compare two big-endian unsigned integers ignoring leading zeros.
fn int_eq(a: &[u8], b: &[u8]) -> bool {
    let trim = |v: &[u8]| {
        let start = v.iter().position(|&b| b != 0).unwrap_or(v.len());
        v[start..].to_vec()
    };
    trim(a) == trim(b)
}

/// A short big-endian unsigned integer as u64, when it fits.
fn int_value(bytes: &[u8]) -> Option<u64> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let trimmed = &bytes[start..];
    if trimmed.len() > 8 {
        return None;
    }
    let mut value = 0u64;
    for &b in trimmed {
        value = value << 8 | u64::from(b);
    }
    Some(value)
}

fn tpm_hash(alg: u16, data: &[u8]) -> Option<Result<Vec<u8>, openssl::error::ErrorStack>> {
    let digest = match alg {
        TPM_ALG_SHA1 => MessageDigest::sha1(),
        TPM_ALG_SHA256 => MessageDigest::sha256(),
        TPM_ALG_SHA384 => MessageDigest::sha384(),
        TPM_ALG_SHA512 => MessageDigest::sha512(),
        _ => return None,
    };
    Some(hash(digest, data).map(|d| d.to_vec()))
}

//! A miniature authenticator emulator: fabricates authenticator data,
//! COSE keys, attestation certificates and signatures so the verifiers can
//! be driven end to end without hardware.

#![allow(dead_code)]

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::ec::EcKeyRef;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::sha::sha256;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};

use fidelis_core::attestation::{AttestationObject, AttestationStatement};
use fidelis_core::authenticator_data::{
    AttestedCredentialData, AuthenticatorData, FLAG_AT, FLAG_UP,
};
use fidelis_core::{Aaguid, CoseAlgorithm, CoseEllipticCurve, CoseKey};

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://example.com";
pub const CHALLENGE: &[u8] = b"fidelis integration challenge";

pub struct P256KeyPair {
    pub private: EcKey<Private>,
    pub cose_key: CoseKey,
}

pub fn p256_keypair() -> P256KeyPair {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let private = EcKey::generate(&group).unwrap();
    let mut ctx = BigNumContext::new().unwrap();
    let mut x = BigNum::new().unwrap();
    let mut y = BigNum::new().unwrap();
    private
        .public_key()
        .affine_coordinates(&group, &mut x, &mut y, &mut ctx)
        .unwrap();
    let cose_key = CoseKey::Ec2 {
        curve: CoseEllipticCurve::P256,
        alg: CoseAlgorithm::Es256,
        x: x.to_vec_padded(32).unwrap(),
        y: y.to_vec_padded(32).unwrap(),
    };
    P256KeyPair { private, cose_key }
}

pub fn sign_es256(key: &EcKeyRef<Private>, data: &[u8]) -> Vec<u8> {
    EcdsaSig::sign(&sha256(data), key).unwrap().to_der().unwrap()
}

pub fn client_data_json(type_: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    format!(
        r#"{{"type":"{type_}","challenge":"{}","origin":"{origin}","crossOrigin":false}}"#,
        URL_SAFE_NO_PAD.encode(challenge)
    )
    .into_bytes()
}

pub fn client_data_hash(client_data: &[u8]) -> [u8; 32] {
    sha256(client_data)
}

pub fn attested_credential_data(
    aaguid: Aaguid,
    credential_id: &[u8],
    cose_key: &CoseKey,
) -> AttestedCredentialData {
    AttestedCredentialData {
        aaguid,
        credential_id: credential_id.to_vec(),
        cose_key: cose_key.clone(),
    }
}

pub fn registration_auth_data(
    flags_extra: u8,
    sign_count: u32,
    acd: AttestedCredentialData,
) -> AuthenticatorData {
    AuthenticatorData {
        rp_id_hash: sha256(RP_ID.as_bytes()),
        flags: FLAG_UP | FLAG_AT | flags_extra,
        sign_count,
        attested_credential_data: Some(acd),
        extensions: None,
    }
}

pub fn assertion_auth_data(flags: u8, sign_count: u32) -> AuthenticatorData {
    AuthenticatorData {
        rp_id_hash: sha256(RP_ID.as_bytes()),
        flags,
        sign_count,
        attested_credential_data: None,
        extensions: None,
    }
}

pub fn attestation_object_bytes(
    auth_data: &AuthenticatorData,
    statement: AttestationStatement,
) -> Vec<u8> {
    let auth_data_bytes = auth_data.encode();
    AttestationObject {
        auth_data: auth_data.clone(),
        auth_data_bytes,
        format: statement.format().to_string(),
        statement,
    }
    .encode()
}

pub struct CertificateAuthority {
    pub key: PKey<Private>,
    pub cert: X509,
}

pub fn certificate_authority() -> CertificateAuthority {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "Fidelis Test Root CA")
        .unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(3650).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    CertificateAuthority {
        key,
        cert: builder.build(),
    }
}

/// Extra material to put into an issued end-entity certificate.
#[derive(Default)]
pub struct LeafOptions {
    /// (oid, raw DER value) custom extensions.
    pub custom_extensions: Vec<(String, Vec<u8>)>,
    pub aik_profile: bool,
}

pub fn issue_leaf(
    ca: &CertificateAuthority,
    subject: Option<&X509Name>,
    public_key: &PKeyRef<Private>,
    options: &LeafOptions,
) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    if let Some(subject) = subject {
        builder.set_subject_name(subject).unwrap();
    }
    builder
        .set_issuer_name(ca.cert.subject_name())
        .unwrap();
    builder.set_pubkey(public_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().build().unwrap())
        .unwrap();
    if options.aik_profile {
        let san = {
            let context = builder.x509v3_context(Some(&ca.cert), None);
            SubjectAlternativeName::new()
                .dns("tpm.fidelis.test")
                .build(&context)
                .unwrap()
        };
        builder.append_extension(san).unwrap();
        builder
            .append_extension(ExtendedKeyUsage::new().other("2.23.133.8.3").build().unwrap())
            .unwrap();
    }
    for (oid, der) in &options.custom_extensions {
        let oid = Asn1Object::from_str(oid).unwrap();
        let contents = Asn1OctetString::new_from_bytes(der).unwrap();
        let extension =
            openssl::x509::X509Extension::new_from_der(&oid, false, &contents).unwrap();
        builder.append_extension(extension).unwrap();
    }
    builder.sign(&ca.key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// Subject satisfying the packed attestation certificate requirements.
pub fn packed_subject() -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COUNTRYNAME, "US").unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Fidelis Test")
        .unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, "Authenticator Attestation")
        .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "Fidelis Packed Attestation")
        .unwrap();
    name.build()
}

pub fn common_name(name: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, name).unwrap();
    builder.build()
}

// --- minimal DER builders for the android keymaster extension ---

pub fn der_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x100 {
        vec![0x81, len as u8]
    } else {
        vec![0x82, (len >> 8) as u8, len as u8]
    }
}

pub fn der_primitive(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&der_len(contents.len()));
    out.extend_from_slice(contents);
    out
}

pub fn der_integer(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    let mut contents = bytes[start..].to_vec();
    if contents[0] & 0x80 != 0 {
        contents.insert(0, 0);
    }
    der_primitive(0x02, &contents)
}

pub fn der_enumerated(value: u8) -> Vec<u8> {
    der_primitive(0x0a, &[value])
}

pub fn der_octet_string(contents: &[u8]) -> Vec<u8> {
    der_primitive(0x04, contents)
}

pub fn der_sequence(children: &[Vec<u8>]) -> Vec<u8> {
    let contents: Vec<u8> = children.iter().flatten().copied().collect();
    let mut out = vec![0x30];
    out.extend_from_slice(&der_len(contents.len()));
    out.extend_from_slice(&contents);
    out
}

pub fn der_set(children: &[Vec<u8>]) -> Vec<u8> {
    let contents: Vec<u8> = children.iter().flatten().copied().collect();
    let mut out = vec![0x31];
    out.extend_from_slice(&der_len(contents.len()));
    out.extend_from_slice(&contents);
    out
}

/// Context-specific constructed tag, supporting the keymaster high tag
/// numbers (600, 702).
pub fn der_context_tag(tag_number: u32, contents: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    if tag_number < 31 {
        out.push(0xa0 | tag_number as u8);
    } else {
        out.push(0xbf);
        // base-128 with continuation bits
        let mut stack = Vec::new();
        let mut n = tag_number;
        loop {
            stack.push((n & 0x7f) as u8);
            n >>= 7;
            if n == 0 {
                break;
            }
        }
        while stack.len() > 1 {
            out.push(stack.pop().unwrap() | 0x80);
        }
        out.push(stack.pop().unwrap());
    }
    out.extend_from_slice(&der_len(contents.len()));
    out.extend_from_slice(contents);
    out
}

/// The keymaster KeyDescription extension value used by android-key
/// attestation tests.
pub fn key_description(
    challenge: &[u8],
    tee_origin: Option<u32>,
    tee_purposes: &[u32],
    all_applications: bool,
) -> Vec<u8> {
    let mut tee_entries: Vec<Vec<u8>> = Vec::new();
    if !tee_purposes.is_empty() {
        let purposes: Vec<Vec<u8>> =
            tee_purposes.iter().map(|&p| der_integer(p)).collect();
        tee_entries.push(der_context_tag(1, &der_set(&purposes)));
    }
    if all_applications {
        tee_entries.push(der_context_tag(600, &der_primitive(0x05, &[])));
    }
    if let Some(origin) = tee_origin {
        tee_entries.push(der_context_tag(702, &der_integer(origin)));
    }

    der_sequence(&[
        der_integer(3),                 // attestationVersion
        der_enumerated(1),              // attestationSecurityLevel: TEE
        der_integer(4),                 // keymasterVersion
        der_enumerated(1),              // keymasterSecurityLevel: TEE
        der_octet_string(challenge),    // attestationChallenge
        der_octet_string(&[]),          // uniqueId
        der_sequence(&[]),              // softwareEnforced
        der_sequence(&tee_entries),     // teeEnforced
    ])
}

// --- SafetyNet JWS fabrication ---

pub struct SafetyNetFixture {
    pub jws: Vec<u8>,
    pub ca: CertificateAuthority,
}

pub fn safetynet_jws(
    nonce: &[u8],
    timestamp_ms: u64,
    cts_profile_match: bool,
    hostname: &str,
) -> SafetyNetFixture {
    let ca = certificate_authority();
    let rsa = Rsa::generate(2048).unwrap();
    let leaf_key = PKey::from_rsa(rsa).unwrap();
    let leaf = issue_leaf(
        &ca,
        Some(&common_name(hostname)),
        &leaf_key,
        &LeafOptions::default(),
    );

    let header = format!(
        r#"{{"alg":"RS256","x5c":["{}","{}"]}}"#,
        STANDARD.encode(leaf.to_der().unwrap()),
        STANDARD.encode(ca.cert.to_der().unwrap())
    );
    let payload = format!(
        r#"{{"nonce":"{}","timestampMs":{timestamp_ms},"apkPackageName":"com.google.android.gms","apkDigestSha256":"","apkCertificateDigestSha256":[],"ctsProfileMatch":{cts_profile_match},"basicIntegrity":true,"evaluationType":"BASIC"}}"#,
        STANDARD.encode(nonce)
    );

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.as_bytes()),
        URL_SAFE_NO_PAD.encode(payload.as_bytes())
    );
    let mut signer = Signer::new(MessageDigest::sha256(), &leaf_key).unwrap();
    signer.update(signing_input.as_bytes()).unwrap();
    let signature = signer.sign_to_vec().unwrap();

    let jws = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature));
    SafetyNetFixture {
        jws: jws.into_bytes(),
        ca,
    }
}

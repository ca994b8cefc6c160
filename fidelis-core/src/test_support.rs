//! Shared fixtures for unit tests: key pairs and self-signed certificates
//! fabricated with openssl.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use crate::cose::{CoseAlgorithm, CoseEllipticCurve, CoseKey};

/// A fresh P-256 key pair with its COSE public key form.
pub(crate) fn p256_cose_keypair() -> (EcKey<Private>, CoseKey) {
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
    (private, cose_key)
}

/// A self-signed EC certificate with the given common name. Returns the
/// certificate and its DER encoding.
pub(crate) fn self_signed_ec_cert(common_name: &str, v3: bool) -> (X509, Vec<u8>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)
        .unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    if v3 {
        builder.set_version(2).unwrap();
    }
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();
    let der = cert.to_der().unwrap();
    (cert, der)
}

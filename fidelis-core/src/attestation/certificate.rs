//! X.509 helpers shared by the statement verifiers.
//!
//! Structural inspection (subject fields, extensions, version) goes
//! through `x509-parser` on the DER bytes; `openssl` is used only where
//! cryptography is involved (public keys, signatures, path building).

use openssl::sha::sha1;
use openssl::x509::X509;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::oid_registry::Oid;
use x509_parser::prelude::{FromDer, X509Version};

use crate::authenticator_data::Aaguid;
use crate::error::{VerificationError, VerifyResult};

// id-fido-gen-ce-aaguid
pub(crate) const OID_FIDO_GEN_CE_AAGUID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);
// Android key attestation key description
pub(crate) const OID_ANDROID_KEY_DESCRIPTION: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);
// Apple anonymous attestation nonce
pub(crate) const OID_APPLE_NONCE: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);
// tcg-kp-AIKCertificate
pub(crate) const OID_TCG_KP_AIK_CERTIFICATE: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

pub(crate) fn parse(der: &[u8]) -> VerifyResult<X509Certificate<'_>> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| VerificationError::Certificate(format!("malformed certificate: {e}")))
}

/// Re-hydrate a DER chain into openssl certificates for crypto use.
pub(crate) fn openssl_chain(x5c: &[Vec<u8>]) -> VerifyResult<Vec<X509>> {
    x5c.iter()
        .map(|der| X509::from_der(der).map_err(VerificationError::from))
        .collect()
}

/// The raw extnValue contents of the extension with the given OID.
pub(crate) fn find_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &Oid<'_>,
) -> Option<&'a [u8]> {
    cert.extensions()
        .iter()
        .find(|ext| &ext.oid == oid)
        .map(|ext| ext.value)
}

/// The AAGUID carried in the id-fido-gen-ce-aaguid extension, when present.
pub(crate) fn aaguid_extension(cert: &X509Certificate<'_>) -> VerifyResult<Option<Aaguid>> {
    let Some(value) = find_extension(cert, &OID_FIDO_GEN_CE_AAGUID) else {
        return Ok(None);
    };
    let (_, octets) = der_parser::der::parse_der_octetstring(value).map_err(|_| {
        VerificationError::Certificate("malformed id-fido-gen-ce-aaguid extension".into())
    })?;
    let bytes: [u8; 16] = octets
        .as_slice()
        .map_err(|_| {
            VerificationError::Certificate("malformed id-fido-gen-ce-aaguid extension".into())
        })?
        .try_into()
        .map_err(|_| {
            VerificationError::Certificate("id-fido-gen-ce-aaguid must be 16 bytes".into())
        })?;
    Ok(Some(Aaguid(bytes)))
}

pub(crate) fn is_version_3(cert: &X509Certificate<'_>) -> bool {
    cert.version() == X509Version::V3
}

pub(crate) fn is_ca(cert: &X509Certificate<'_>) -> bool {
    cert.extensions().iter().any(|ext| {
        matches!(ext.parsed_extension(), ParsedExtension::BasicConstraints(bc) if bc.ca)
    })
}

pub(crate) fn has_aik_extended_key_usage(cert: &X509Certificate<'_>) -> bool {
    cert.extensions().iter().any(|ext| {
        matches!(
            ext.parsed_extension(),
            ParsedExtension::ExtendedKeyUsage(eku)
                if eku.other.iter().any(|oid| oid == &OID_TCG_KP_AIK_CERTIFICATE)
        )
    })
}

pub(crate) fn has_subject_alternative_name(cert: &X509Certificate<'_>) -> bool {
    cert.extensions()
        .iter()
        .any(|ext| matches!(ext.parsed_extension(), ParsedExtension::SubjectAlternativeName(_)))
}

pub(crate) fn subject_common_name(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

pub(crate) fn subject_country(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_country()
        .next()
        .and_then(|c| c.as_str().ok())
        .map(str::to_string)
}

pub(crate) fn subject_organization(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organization()
        .next()
        .and_then(|o| o.as_str().ok())
        .map(str::to_string)
}

pub(crate) fn subject_organizational_unit(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organizational_unit()
        .next()
        .and_then(|ou| ou.as_str().ok())
        .map(str::to_string)
}

pub(crate) fn subject_is_empty(cert: &X509Certificate<'_>) -> bool {
    cert.subject().iter().next().is_none()
}

/// Subject key identifier used for FIDO-U2F anchor resolution: the SHA-1
/// digest of the certificate's subjectPublicKey bit string (RFC 5280
/// method 1).
pub(crate) fn subject_key_identifier(cert: &X509Certificate<'_>) -> Vec<u8> {
    sha1(cert.public_key().subject_public_key.data.as_ref()).to_vec()
}

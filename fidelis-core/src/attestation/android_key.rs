//! Android key attestation (WebAuthn §8.4).
//!
//! Beyond the signature check this format requires parsing the Android
//! keymaster key-description X.509 extension and proving that the attested
//! key was generated in the keymaster for signing, scoped to this RP.

use ciborium::value::Value;
use tracing::trace;

use crate::attestation::{
    certificate, decode_x5c, encode_x5c, att_to_be_signed, AndroidKeyStatement,
    AttestationStatement, AttestationType,
};
use crate::cbor;
use crate::cose::{self, CoseAlgorithm};
use crate::error::{DecodeError, DecodeResult, VerificationError, VerifyResult};
use crate::registration::RegistrationObject;

pub(super) fn decode_statement(entries: &[(Value, Value)]) -> DecodeResult<AttestationStatement> {
    let alg = CoseAlgorithm::from_registry_value(cbor::as_i64(
        cbor::text_entry(entries, "alg").ok_or(DecodeError::MissingField("alg"))?,
        "alg",
    )?)?;
    let sig = cbor::as_bytes(
        cbor::text_entry(entries, "sig").ok_or(DecodeError::MissingField("sig"))?,
        "sig",
    )?
    .to_vec();
    let x5c = decode_x5c(
        cbor::text_entry(entries, "x5c").ok_or(DecodeError::MissingField("x5c"))?,
    )?;
    Ok(AttestationStatement::AndroidKey(AndroidKeyStatement {
        alg,
        sig,
        x5c,
    }))
}

pub(super) fn encode_statement(statement: &AndroidKeyStatement) -> Vec<(Value, Value)> {
    vec![
        (
            Value::Text("alg".into()),
            Value::Integer(statement.alg.registry_value().into()),
        ),
        (Value::Text("sig".into()), Value::Bytes(statement.sig.clone())),
        (Value::Text("x5c".into()), encode_x5c(&statement.x5c)),
    ]
}

pub const KM_ORIGIN_GENERATED: u32 = 0;
pub const KM_PURPOSE_SIGN: u32 = 2;

const KM_TAG_PURPOSE: u32 = 1;
const KM_TAG_ALL_APPLICATIONS: u32 = 600;
const KM_TAG_ORIGIN: u32 = 702;

/// One keymaster authorization list (softwareEnforced / teeEnforced).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AuthorizationList {
    pub all_applications: bool,
    pub origin: Option<u32>,
    pub purposes: Vec<u32>,
}

impl AuthorizationList {
    fn generated_for_signing(&self) -> bool {
        self.origin == Some(KM_ORIGIN_GENERATED) && self.purposes.contains(&KM_PURPOSE_SIGN)
    }
}

/// The parsed key-description extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyDescription {
    pub attestation_challenge: Vec<u8>,
    pub software_enforced: AuthorizationList,
    pub tee_enforced: AuthorizationList,
}

pub struct AndroidKeyAttestationStatementVerifier {
    tee_enforced_only: bool,
}

impl Default for AndroidKeyAttestationStatementVerifier {
    fn default() -> Self {
        AndroidKeyAttestationStatementVerifier {
            tee_enforced_only: true,
        }
    }
}

impl AndroidKeyAttestationStatementVerifier {
    /// Accept keys whose keymaster guarantees come from the software
    /// authorization list as well as the TEE one. The default accepts TEE
    /// keys only.
    pub fn allow_software_enforced(mut self) -> Self {
        self.tee_enforced_only = false;
        self
    }

    pub fn verify(&self, object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        let AttestationStatement::AndroidKey(statement) = &object.attestation_object.statement
        else {
            return Err(VerificationError::BadAttestationStatement(
                "android-key attestation statement is not found".into(),
            ));
        };

        let leaf_der = statement.x5c.first().ok_or_else(|| {
            VerificationError::BadAttestationStatement(
                "no attestation certificate is found in android-key attestation statement".into(),
            )
        })?;
        let chain = certificate::openssl_chain(&statement.x5c)?;
        let att_cert = &chain[0];

        // Signature over authenticatorData ‖ clientDataHash with the leaf
        // certificate key.
        let signed_data = att_to_be_signed(object);
        let valid = cose::verify_with_key(
            statement.alg,
            &*att_cert.public_key()?,
            &statement.sig,
            &signed_data,
        )
        .unwrap_or(false);
        if !valid {
            trace!("android-key attestation signature did not verify");
            return Err(VerificationError::BadSignature);
        }

        // The key embedded in the certificate must be the credential key.
        let acd = object.attested_credential_data()?;
        if !acd.cose_key.matches_public_key(&*att_cert.public_key()?) {
            return Err(VerificationError::BadAttestationStatement(
                "credential public key doesn't match the android-key attestation certificate"
                    .into(),
            ));
        }

        // Key description extension checks.
        let parsed = certificate::parse(leaf_der)?;
        let extension =
            certificate::find_extension(&parsed, &certificate::OID_ANDROID_KEY_DESCRIPTION)
                .ok_or_else(|| {
                    VerificationError::KeyDescriptionValidation(
                        "key description extension is missing".into(),
                    )
                })?;
        let description = parse_key_description(extension)?;
        self.verify_key_description(&description, &object.client_data_hash)?;

        Ok(AttestationType::Basic)
    }

    fn verify_key_description(
        &self,
        description: &KeyDescription,
        client_data_hash: &[u8],
    ) -> VerifyResult<()> {
        if description.attestation_challenge != client_data_hash {
            return Err(VerificationError::KeyDescriptionValidation(
                "attestation challenge doesn't match".into(),
            ));
        }

        // The key must be scoped to the RP: neither list may carry
        // allApplications.
        if description.software_enforced.all_applications
            || description.tee_enforced.all_applications
        {
            return Err(VerificationError::KeyDescriptionValidation(
                "key is not scoped properly".into(),
            ));
        }

        let tee_ok = description.tee_enforced.generated_for_signing();
        let software_ok = description.software_enforced.generated_for_signing();
        let acceptable = if self.tee_enforced_only {
            tee_ok
        } else {
            tee_ok || software_ok
        };
        if !acceptable {
            return Err(VerificationError::KeyDescriptionValidation(
                "key was not generated in the keymaster for signing".into(),
            ));
        }
        Ok(())
    }
}

/// Parse the keymaster KeyDescription ASN.1 structure:
/// `SEQUENCE { attestationVersion, attestationSecurityLevel,
/// keymasterVersion, keymasterSecurityLevel, attestationChallenge,
/// uniqueId, softwareEnforced, teeEnforced }`.
pub(crate) fn parse_key_description(value: &[u8]) -> VerifyResult<KeyDescription> {
    use der_parser::der::{
        parse_der_container, parse_der_enum, parse_der_integer, parse_der_octetstring, Header, Tag,
    };
    use der_parser::error::BerError;

    let result = parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }
        let (i, _attestation_version) = parse_der_integer(i)?;
        let (i, _attestation_security_level) = parse_der_enum(i)?;
        let (i, _keymaster_version) = parse_der_integer(i)?;
        let (i, _keymaster_security_level) = parse_der_enum(i)?;

        let (i, attestation_challenge) = parse_der_octetstring(i)?;
        let attestation_challenge = attestation_challenge.as_slice()?.to_vec();

        let (i, _unique_id) = parse_der_octetstring(i)?;

        let (i, software_enforced) = parse_authorization_list(i)?;
        let (i, tee_enforced) = parse_authorization_list(i)?;

        Ok((
            i,
            KeyDescription {
                attestation_challenge,
                software_enforced,
                tee_enforced,
            },
        ))
    })(value);

    match result {
        Ok((_, description)) => Ok(description),
        Err(e) => Err(VerificationError::KeyDescriptionValidation(format!(
            "malformed key description extension: {e}"
        ))),
    }
}

/// Parse an AuthorizationList, picking out the tags verification needs
/// (purpose, allApplications, origin) and skipping everything else.
fn parse_authorization_list(
    input: &[u8],
) -> der_parser::error::BerResult<'_, AuthorizationList> {
    use der_parser::ber::BerObjectContent;
    use der_parser::der::{parse_der, parse_der_container, parse_der_integer, Header, Tag};
    use der_parser::error::BerError;

    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(der_parser::nom::Err::Error(BerError::BerTypeError));
        }

        let mut list = AuthorizationList::default();

        let mut i = i;
        while let Ok((rest, obj)) = parse_der(i) {
            i = rest;
            if obj.content == BerObjectContent::Optional(None) {
                continue;
            }
            match obj.tag() {
                Tag(KM_TAG_ALL_APPLICATIONS) => {
                    list.all_applications = true;
                }
                Tag(KM_TAG_ORIGIN) => {
                    if let BerObjectContent::Unknown(any) = &obj.content {
                        let (_, val) = parse_der_integer(any.data)?;
                        list.origin = Some(val.as_u32()?);
                    }
                }
                Tag(KM_TAG_PURPOSE) => {
                    // purpose is [1] EXPLICIT SET OF INTEGER
                    if let BerObjectContent::Unknown(any) = &obj.content {
                        let (_, purposes) = parse_der_container(|mut inner: &[u8], _| {
                            let mut values = Vec::new();
                            while !inner.is_empty() {
                                let (rest, val) = parse_der_integer(inner)?;
                                values.push(val.as_u32()?);
                                inner = rest;
                            }
                            Ok((inner, values))
                        })(any.data)?;
                        list.purposes = purposes;
                    }
                }
                _ => continue,
            }
        }

        Ok((i, list))
    })(input)
}

//! Registration ceremony scenarios, driven end to end with fabricated
//! authenticator responses.

mod common;

use std::sync::Arc;

use chrono::Utc;
use openssl::sha::sha256;

use common::*;
use fidelis_core::attestation::{
    AndroidKeyStatement, AndroidSafetyNetStatement, AttestationStatement, AttestationType,
    FidoU2fStatement, Jws, PackedStatement, StatementVerifierRegistry, TpmStatement, TpmsAttest,
    TpmtPublic,
};
use fidelis_core::authenticator_data::{FLAG_BE, FLAG_BS};
use fidelis_core::{
    Aaguid, CertPathTrustworthinessVerifier, Challenge, CoseAlgorithm, CoseKey,
    InMemoryTrustAnchorRepository, Origin, RegistrationData, RegistrationObject,
    RegistrationParameters, RegistrationRequest, RegistrationVerifier, ServerProperty,
    TrustAnchorSet, VerificationError,
};

fn verifier_with_anchors(anchors: TrustAnchorSet) -> RegistrationVerifier {
    RegistrationVerifier::new(
        StatementVerifierRegistry::all_formats(),
        CertPathTrustworthinessVerifier::new(Arc::new(InMemoryTrustAnchorRepository::new(
            anchors,
        ))),
    )
}

fn server_property() -> ServerProperty {
    ServerProperty::builder(RP_ID, Challenge::new(CHALLENGE.to_vec()))
        .origin(Origin::parse(ORIGIN).unwrap())
        .build()
}

fn parameters() -> RegistrationParameters {
    RegistrationParameters::new(server_property())
}

fn parse(attestation_object: Vec<u8>, client_data: Vec<u8>) -> RegistrationData {
    RegistrationData::parse(&RegistrationRequest::new(attestation_object, client_data)).unwrap()
}

/// Build a complete fido-u2f registration response. Returns the response
/// plus the attestation certificate for anchor registration.
fn u2f_response() -> (Vec<u8>, Vec<u8>, openssl::x509::X509) {
    let credential_key = p256_keypair();
    let attestation = certificate_authority();

    let credential_id = b"u2f-credential-0001".to_vec();
    let acd = attested_credential_data(Aaguid::ZERO, &credential_id, &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);

    let public_key_u2f = credential_key.cose_key.uncompressed_ec_point().unwrap();
    let mut verification_data = vec![0x00];
    verification_data.extend_from_slice(&auth_data.rp_id_hash);
    verification_data.extend_from_slice(&cdh);
    verification_data.extend_from_slice(&credential_id);
    verification_data.extend_from_slice(&public_key_u2f);
    let attestation_ec_key = attestation.key.ec_key().unwrap();
    let sig = sign_es256(&attestation_ec_key, &verification_data);

    let statement = AttestationStatement::FidoU2f(FidoU2fStatement {
        sig,
        x5c: vec![attestation.cert.to_der().unwrap()],
    });
    (
        attestation_object_bytes(&auth_data, statement),
        client_data,
        attestation.cert,
    )
}

#[test]
fn fido_u2f_registration_returns_basic_and_zero_sign_count() {
    let (attestation_object, client_data, att_cert) = u2f_response();

    let mut anchors = TrustAnchorSet::new();
    anchors.add_global(att_cert);
    let verifier = verifier_with_anchors(anchors);

    let data = parse(attestation_object, client_data.clone());

    // The statement verifier itself reports Basic.
    let property = server_property();
    let object = RegistrationObject {
        attestation_object: &data.attestation_object,
        collected_client_data: &data.collected_client_data,
        client_data_bytes: &client_data,
        client_data_hash: sha256(&client_data),
        server_property: &property,
        timestamp: Utc::now(),
        transports: &[],
    };
    let attestation_type = StatementVerifierRegistry::all_formats()
        .verify(&object)
        .unwrap();
    assert_eq!(attestation_type, AttestationType::Basic);

    let record = verifier.verify(&data, &parameters()).unwrap();
    assert_eq!(record.sign_count, 0);
    assert_eq!(record.credential_id(), b"u2f-credential-0001");
}

#[test]
fn fido_u2f_flipped_signature_bit_is_bad_signature() {
    let (attestation_object, client_data, att_cert) = u2f_response();
    let mut anchors = TrustAnchorSet::new();
    anchors.add_global(att_cert);
    let verifier = verifier_with_anchors(anchors);

    let mut data = parse(attestation_object, client_data);
    let AttestationStatement::FidoU2f(statement) = &mut data.attestation_object.statement else {
        panic!("expected fido-u2f statement");
    };
    let last = statement.sig.len() - 1;
    statement.sig[last] ^= 0x01;

    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadSignature
    ));
}

#[test]
fn missing_trust_anchor_is_reported_not_silently_accepted() {
    let (attestation_object, client_data, _att_cert) = u2f_response();
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::TrustAnchorNotFound
    ));
}

fn packed_self_response(flags_extra: u8, sign_count: u32) -> (Vec<u8>, Vec<u8>) {
    let credential_key = p256_keypair();
    let acd = attested_credential_data(
        Aaguid([0x11; 16]),
        b"packed-self-credential",
        &credential_key.cose_key,
    );
    let auth_data = registration_auth_data(flags_extra, sign_count, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);

    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);
    let sig = sign_es256(&credential_key.private, &signed);

    let statement = AttestationStatement::Packed(PackedStatement {
        alg: CoseAlgorithm::Es256,
        sig,
        x5c: None,
        ecdaa_key_id: None,
    });
    (attestation_object_bytes(&auth_data, statement), client_data)
}

#[test]
fn packed_self_attestation_verifies_without_anchors() {
    let (attestation_object, client_data) = packed_self_response(0, 7);
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object, client_data);
    let record = verifier.verify(&data, &parameters()).unwrap();
    assert_eq!(record.sign_count, 7);
    assert!(matches!(
        record.attestation_statement,
        AttestationStatement::Packed(_)
    ));
}

#[test]
fn packed_self_attestation_flipped_signature_is_bad_signature() {
    let (attestation_object, client_data) = packed_self_response(0, 7);
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let mut data = parse(attestation_object, client_data);
    let AttestationStatement::Packed(statement) = &mut data.attestation_object.statement else {
        panic!("expected packed statement");
    };
    statement.sig[0] ^= 0x80;
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadSignature
    ));
}

#[test]
fn backed_up_without_backup_eligible_is_rejected() {
    let (attestation_object, client_data) = packed_self_response(FLAG_BS, 0);
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::IllegalBackupState
    ));
}

#[test]
fn backup_eligible_and_backed_up_is_recorded() {
    let (attestation_object, client_data) = packed_self_response(FLAG_BE | FLAG_BS, 0);
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object, client_data);
    let record = verifier.verify(&data, &parameters()).unwrap();
    assert_eq!(record.backup_eligible, fidelis_core::TriState::Known(true));
    assert_eq!(record.backed_up, fidelis_core::TriState::Known(true));
}

#[test]
fn origin_mismatch_is_rejected_and_default_port_is_equal() {
    // Client claims a different origin than the server accepts.
    let credential_key = p256_keypair();
    let acd = attested_credential_data(Aaguid([0x11; 16]), b"cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let evil_client_data = client_data_json("webauthn.create", CHALLENGE, "https://evil.com");
    let cdh = client_data_hash(&evil_client_data);
    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);
    let statement = AttestationStatement::Packed(PackedStatement {
        alg: CoseAlgorithm::Es256,
        sig: sign_es256(&credential_key.private, &signed),
        x5c: None,
        ecdaa_key_id: None,
    });
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(
        attestation_object_bytes(&auth_data, statement),
        evil_client_data,
    );
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadOrigin(_)
    ));

    // The same ceremony with an explicit default port is accepted.
    let explicit_port_origin = "https://example.com:443";
    let client_data = client_data_json("webauthn.create", CHALLENGE, explicit_port_origin);
    let cdh = client_data_hash(&client_data);
    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);
    let statement = AttestationStatement::Packed(PackedStatement {
        alg: CoseAlgorithm::Es256,
        sig: sign_es256(&credential_key.private, &signed),
        x5c: None,
        ecdaa_key_id: None,
    });
    let data = parse(attestation_object_bytes(&auth_data, statement), client_data);
    assert!(verifier.verify(&data, &parameters()).is_ok());
}

#[test]
fn challenge_mismatch_is_rejected() {
    // The response is self-consistent (signature covers the presented
    // client data) but the challenge is not the one the server issued.
    let credential_key = p256_keypair();
    let acd = attested_credential_data(Aaguid([0x11; 16]), b"cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", b"a different challenge", ORIGIN);
    let cdh = client_data_hash(&client_data);
    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);
    let statement = AttestationStatement::Packed(PackedStatement {
        alg: CoseAlgorithm::Es256,
        sig: sign_es256(&credential_key.private, &signed),
        x5c: None,
        ecdaa_key_id: None,
    });
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object_bytes(&auth_data, statement), client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadChallenge
    ));
}

#[test]
fn packed_full_chain_verifies_against_aaguid_anchor() {
    let aaguid = Aaguid([0x22; 16]);
    let credential_key = p256_keypair();
    let attestation_key = p256_keypair();
    let ca = certificate_authority();
    let leaf = issue_leaf(
        &ca,
        Some(&packed_subject()),
        &openssl::pkey::PKey::from_ec_key(attestation_key.private.clone()).unwrap(),
        &LeafOptions::default(),
    );

    let acd = attested_credential_data(aaguid, b"packed-x5c-cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 3, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);
    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);

    let statement = AttestationStatement::Packed(PackedStatement {
        alg: CoseAlgorithm::Es256,
        sig: sign_es256(&attestation_key.private, &signed),
        x5c: Some(vec![leaf.to_der().unwrap(), ca.cert.to_der().unwrap()]),
        ecdaa_key_id: None,
    });

    let mut anchors = TrustAnchorSet::new();
    anchors.add_for_aaguid(aaguid, ca.cert.clone());
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object_bytes(&auth_data, statement), client_data);
    let record = verifier.verify(&data, &parameters()).unwrap();
    assert_eq!(record.sign_count, 3);
}

fn android_key_response(challenge_in_extension: Option<&[u8]>) -> (Vec<u8>, Vec<u8>, TrustAnchorSet, Aaguid) {
    let aaguid = Aaguid([0x33; 16]);
    let credential_key = p256_keypair();
    let ca = certificate_authority();

    let acd = attested_credential_data(aaguid, b"android-key-cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 1, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);

    let extension_challenge = challenge_in_extension.unwrap_or(&cdh);
    let description = key_description(
        extension_challenge,
        Some(0), // KM_ORIGIN_GENERATED
        &[2],    // KM_PURPOSE_SIGN
        false,
    );
    // The certificate must carry the credential public key itself.
    let leaf = issue_leaf(
        &ca,
        Some(&common_name("Android Keystore Key")),
        &openssl::pkey::PKey::from_ec_key(credential_key.private.clone()).unwrap(),
        &LeafOptions {
            custom_extensions: vec![("1.3.6.1.4.1.11129.2.1.17".to_string(), description)],
            aik_profile: false,
        },
    );

    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);
    let statement = AttestationStatement::AndroidKey(AndroidKeyStatement {
        alg: CoseAlgorithm::Es256,
        sig: sign_es256(&credential_key.private, &signed),
        x5c: vec![leaf.to_der().unwrap(), ca.cert.to_der().unwrap()],
    });

    let mut anchors = TrustAnchorSet::new();
    anchors.add_for_aaguid(aaguid, ca.cert.clone());
    (
        attestation_object_bytes(&auth_data, statement),
        client_data,
        anchors,
        aaguid,
    )
}

#[test]
fn android_key_attestation_verifies() {
    let (attestation_object, client_data, anchors, _) = android_key_response(None);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(verifier.verify(&data, &parameters()).is_ok());
}

#[test]
fn android_key_challenge_mismatch_fails_key_description_validation() {
    // The signature is valid, but the key description pins a different
    // challenge; the rejection must still happen.
    let (attestation_object, client_data, anchors, _) =
        android_key_response(Some(b"not the client data hash"));
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::KeyDescriptionValidation(_)
    ));
}

#[test]
fn android_key_flipped_signature_is_bad_signature() {
    let (attestation_object, client_data, anchors, _) = android_key_response(None);
    let verifier = verifier_with_anchors(anchors);
    let mut data = parse(attestation_object, client_data);
    let AttestationStatement::AndroidKey(statement) = &mut data.attestation_object.statement
    else {
        panic!("expected android-key statement");
    };
    let mid = statement.sig.len() / 2;
    statement.sig[mid] ^= 0x01;
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadSignature
    ));
}

fn safetynet_response(
    hostname: &str,
    cts_profile_match: bool,
    timestamp_ms: u64,
) -> (Vec<u8>, Vec<u8>, TrustAnchorSet) {
    let aaguid = Aaguid([0x44; 16]);
    let credential_key = p256_keypair();
    let acd = attested_credential_data(aaguid, b"safetynet-cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);

    let mut nonce_data = auth_data.encode();
    nonce_data.extend_from_slice(&cdh);
    let nonce = sha256(&nonce_data);

    let fixture = safetynet_jws(&nonce, timestamp_ms, cts_profile_match, hostname);
    let statement = AttestationStatement::AndroidSafetyNet(AndroidSafetyNetStatement {
        ver: "14799021".to_string(),
        response: Jws::parse(&fixture.jws).unwrap(),
    });

    let mut anchors = TrustAnchorSet::new();
    anchors.add_for_aaguid(aaguid, fixture.ca.cert.clone());
    (
        attestation_object_bytes(&auth_data, statement),
        client_data,
        anchors,
    )
}

#[test]
fn safetynet_attestation_verifies() {
    let now_ms = Utc::now().timestamp_millis() as u64;
    let (attestation_object, client_data, anchors) =
        safetynet_response("attest.android.com", true, now_ms - 1_000);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(verifier.verify(&data, &parameters()).is_ok());
}

#[test]
fn safetynet_wrong_hostname_is_rejected() {
    let now_ms = Utc::now().timestamp_millis() as u64;
    let (attestation_object, client_data, anchors) =
        safetynet_response("evil.example.com", true, now_ms - 1_000);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadAttestationStatement(_)
    ));
}

#[test]
fn safetynet_cts_profile_mismatch_is_rejected() {
    let now_ms = Utc::now().timestamp_millis() as u64;
    let (attestation_object, client_data, anchors) =
        safetynet_response("attest.android.com", false, now_ms - 1_000);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadAttestationStatement(_)
    ));
}

#[test]
fn safetynet_stale_timestamp_is_rejected() {
    let stale_ms = (Utc::now().timestamp_millis() - 300_000) as u64;
    let (attestation_object, client_data, anchors) =
        safetynet_response("attest.android.com", true, stale_ms);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadAttestationStatement(_)
    ));
}

#[test]
fn safetynet_flipped_signature_is_bad_signature() {
    let now_ms = Utc::now().timestamp_millis() as u64;
    let (attestation_object, client_data, anchors) =
        safetynet_response("attest.android.com", true, now_ms - 1_000);
    let verifier = verifier_with_anchors(anchors);
    let mut data = parse(attestation_object, client_data);
    let AttestationStatement::AndroidSafetyNet(statement) =
        &mut data.attestation_object.statement
    else {
        panic!("expected android-safetynet statement");
    };
    statement.response.signature[0] ^= 0x01;
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadSignature
    ));
}

fn tpm_pub_area(cose_key: &CoseKey) -> Vec<u8> {
    let CoseKey::Ec2 { x, y, .. } = cose_key else {
        panic!("tpm fixture needs an EC2 key");
    };
    let mut out = Vec::new();
    out.extend_from_slice(&0x0023u16.to_be_bytes()); // TPM_ALG_ECC
    out.extend_from_slice(&0x000bu16.to_be_bytes()); // nameAlg SHA-256
    out.extend_from_slice(&0u32.to_be_bytes()); // objectAttributes
    out.extend_from_slice(&0u16.to_be_bytes()); // empty authPolicy
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric TPM_ALG_NULL
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme TPM_ALG_NULL
    out.extend_from_slice(&0x0003u16.to_be_bytes()); // TPM_ECC_NIST_P256
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // kdf TPM_ALG_NULL
    out.extend_from_slice(&(x.len() as u16).to_be_bytes());
    out.extend_from_slice(x);
    out.extend_from_slice(&(y.len() as u16).to_be_bytes());
    out.extend_from_slice(y);
    out
}

fn tpm_cert_info(extra_data: &[u8], pub_area: &[u8]) -> Vec<u8> {
    let name_digest = sha256(pub_area);
    let mut out = Vec::new();
    out.extend_from_slice(&0xff54_4347u32.to_be_bytes()); // TPM_GENERATED_VALUE
    out.extend_from_slice(&0x8017u16.to_be_bytes()); // TPM_ST_ATTEST_CERTIFY
    out.extend_from_slice(&0u16.to_be_bytes()); // empty qualifiedSigner
    out.extend_from_slice(&(extra_data.len() as u16).to_be_bytes());
    out.extend_from_slice(extra_data);
    out.extend_from_slice(&0u64.to_be_bytes()); // clock
    out.extend_from_slice(&0u32.to_be_bytes()); // resetCount
    out.extend_from_slice(&0u32.to_be_bytes()); // restartCount
    out.push(1); // safe
    out.extend_from_slice(&0u64.to_be_bytes()); // firmwareVersion
    out.extend_from_slice(&34u16.to_be_bytes()); // name size
    out.extend_from_slice(&0x000bu16.to_be_bytes());
    out.extend_from_slice(&name_digest);
    out.extend_from_slice(&34u16.to_be_bytes()); // qualifiedName size
    out.extend_from_slice(&0x000bu16.to_be_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out
}

fn tpm_response() -> (Vec<u8>, Vec<u8>, TrustAnchorSet) {
    let aaguid = Aaguid([0x55; 16]);
    let credential_key = p256_keypair();
    let aik_key = p256_keypair();
    let ca = certificate_authority();
    let aik_cert = issue_leaf(
        &ca,
        None, // TPM aik certificates carry an empty subject
        &openssl::pkey::PKey::from_ec_key(aik_key.private.clone()).unwrap(),
        &LeafOptions {
            custom_extensions: Vec::new(),
            aik_profile: true,
        },
    );

    let acd = attested_credential_data(aaguid, b"tpm-cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 9, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);

    let mut att_to_be_signed = auth_data.encode();
    att_to_be_signed.extend_from_slice(&cdh);
    let extra_data = sha256(&att_to_be_signed);

    let pub_area_raw = tpm_pub_area(&credential_key.cose_key);
    let cert_info_raw = tpm_cert_info(&extra_data, &pub_area_raw);
    let sig = sign_es256(&aik_key.private, &cert_info_raw);

    let statement = AttestationStatement::Tpm(TpmStatement {
        ver: "2.0".to_string(),
        alg: CoseAlgorithm::Es256,
        x5c: Some(vec![aik_cert.to_der().unwrap(), ca.cert.to_der().unwrap()]),
        ecdaa_key_id: None,
        sig,
        cert_info: TpmsAttest::decode(&cert_info_raw).unwrap(),
        cert_info_raw,
        pub_area: TpmtPublic::decode(&pub_area_raw).unwrap(),
        pub_area_raw,
    });

    let mut anchors = TrustAnchorSet::new();
    anchors.add_for_aaguid(aaguid, ca.cert.clone());
    (
        attestation_object_bytes(&auth_data, statement),
        client_data,
        anchors,
    )
}

#[test]
fn tpm_attestation_verifies() {
    let (attestation_object, client_data, anchors) = tpm_response();
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    let record = verifier.verify(&data, &parameters()).unwrap();
    assert_eq!(record.sign_count, 9);
}

#[test]
fn tpm_flipped_signature_is_bad_signature() {
    let (attestation_object, client_data, anchors) = tpm_response();
    let verifier = verifier_with_anchors(anchors);
    let mut data = parse(attestation_object, client_data);
    let AttestationStatement::Tpm(statement) = &mut data.attestation_object.statement else {
        panic!("expected tpm statement");
    };
    let last = statement.sig.len() - 1;
    statement.sig[last] ^= 0x01;
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadSignature
    ));
}

fn apple_response(tamper_nonce: bool) -> (Vec<u8>, Vec<u8>, TrustAnchorSet) {
    let aaguid = Aaguid([0x88; 16]);
    let credential_key = p256_keypair();
    let ca = certificate_authority();

    let acd = attested_credential_data(aaguid, b"apple-cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);

    let mut nonce_data = auth_data.encode();
    nonce_data.extend_from_slice(&cdh);
    let mut nonce = sha256(&nonce_data);
    if tamper_nonce {
        nonce[0] ^= 0xff;
    }
    let extension = der_sequence(&[der_context_tag(1, &der_octet_string(&nonce))]);

    let leaf = issue_leaf(
        &ca,
        Some(&common_name("Apple Anonymous Attestation")),
        &openssl::pkey::PKey::from_ec_key(credential_key.private.clone()).unwrap(),
        &LeafOptions {
            custom_extensions: vec![("1.2.840.113635.100.8.2".to_string(), extension)],
            aik_profile: false,
        },
    );

    let statement = AttestationStatement::Apple(fidelis_core::attestation::AppleStatement {
        x5c: vec![leaf.to_der().unwrap(), ca.cert.to_der().unwrap()],
    });

    let mut anchors = TrustAnchorSet::new();
    anchors.add_for_aaguid(aaguid, ca.cert.clone());
    (
        attestation_object_bytes(&auth_data, statement),
        client_data,
        anchors,
    )
}

#[test]
fn apple_attestation_verifies() {
    let (attestation_object, client_data, anchors) = apple_response(false);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(verifier.verify(&data, &parameters()).is_ok());
}

#[test]
fn apple_nonce_mismatch_is_rejected() {
    let (attestation_object, client_data, anchors) = apple_response(true);
    let verifier = verifier_with_anchors(anchors);
    let data = parse(attestation_object, client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::BadAttestationStatement(_)
    ));
}

#[test]
fn none_attestation_needs_no_anchors() {
    let credential_key = p256_keypair();
    let acd = attested_credential_data(Aaguid([0x66; 16]), b"none-cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(
        attestation_object_bytes(&auth_data, AttestationStatement::None),
        client_data,
    );
    assert!(verifier.verify(&data, &parameters()).is_ok());
}

#[test]
fn unsupported_format_is_a_distinct_error() {
    let credential_key = p256_keypair();
    let acd = attested_credential_data(Aaguid([0x77; 16]), b"cred", &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let statement = AttestationStatement::Unsupported {
        format: "vendor-proprietary".to_string(),
    };
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object_bytes(&auth_data, statement), client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::UnsupportedAttestationFormat(format) if format == "vendor-proprietary"
    ));
}

#[test]
fn credential_id_over_limit_is_rejected() {
    let credential_key = p256_keypair();
    let long_id = vec![0xabu8; 1024];
    let acd = attested_credential_data(Aaguid([0x11; 16]), &long_id, &credential_key.cose_key);
    let auth_data = registration_auth_data(0, 0, acd);
    let client_data = client_data_json("webauthn.create", CHALLENGE, ORIGIN);
    let cdh = client_data_hash(&client_data);
    let mut signed = auth_data.encode();
    signed.extend_from_slice(&cdh);
    let statement = AttestationStatement::Packed(PackedStatement {
        alg: CoseAlgorithm::Es256,
        sig: sign_es256(&credential_key.private, &signed),
        x5c: None,
        ecdaa_key_id: None,
    });
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object_bytes(&auth_data, statement), client_data);
    assert!(matches!(
        verifier.verify(&data, &parameters()).unwrap_err(),
        VerificationError::CredentialIdTooLong(1024, 1023)
    ));
}

#[test]
fn algorithm_not_in_pub_key_cred_params_is_rejected() {
    let (attestation_object, client_data) = packed_self_response(0, 0);
    let verifier = verifier_with_anchors(TrustAnchorSet::new());
    let data = parse(attestation_object, client_data);
    let parameters = RegistrationParameters::new(server_property())
        .pub_key_cred_params(vec![CoseAlgorithm::Rs256]);
    assert!(matches!(
        verifier.verify(&data, &parameters).unwrap_err(),
        VerificationError::NotAllowedAlgorithm
    ));
}

#[test]
fn attestation_object_round_trips() {
    let (attestation_object, client_data) = packed_self_response(FLAG_BE, 12);
    let data = parse(attestation_object.clone(), client_data);
    assert_eq!(data.attestation_object.encode(), attestation_object);
    let decoded =
        fidelis_core::AttestationObject::decode(&data.attestation_object.encode()).unwrap();
    assert_eq!(decoded, data.attestation_object);
}

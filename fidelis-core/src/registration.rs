//! Registration ceremony verification.

use chrono::{DateTime, Utc};
use openssl::sha::sha256;
use tracing::debug;

use crate::attestation::{AttestationObject, StatementVerifierRegistry};
use crate::authenticator_data::AttestedCredentialData;
use crate::checks;
use crate::client_data::{CollectedClientData, CLIENT_DATA_TYPE_CREATE};
use crate::cose::CoseAlgorithm;
use crate::credential_record::{CredentialRecord, TriState};
use crate::error::{DecodeResult, VerificationError, VerifyResult};
use crate::server_property::ServerProperty;
use crate::trust::{CertPathTrustworthinessVerifier, SelfAttestationTrustworthinessVerifier};

const DEFAULT_MAX_CREDENTIAL_ID_LENGTH: usize = 1023;

/// The raw browser response to a `navigator.credentials.create()` call.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub transports: Vec<String>,
}

impl RegistrationRequest {
    pub fn new(attestation_object: Vec<u8>, client_data_json: Vec<u8>) -> Self {
        RegistrationRequest {
            attestation_object,
            client_data_json,
            transports: Vec::new(),
        }
    }

    pub fn with_transports(mut self, transports: Vec<String>) -> Self {
        self.transports = transports;
        self
    }
}

/// The decoded registration response. Produced by [`RegistrationData::parse`];
/// decoding failures are [`crate::error::DecodeError`]s, never verification
/// errors.
#[derive(Debug, Clone)]
pub struct RegistrationData {
    pub attestation_object: AttestationObject,
    pub collected_client_data: CollectedClientData,
    pub collected_client_data_bytes: Vec<u8>,
    pub transports: Vec<String>,
}

impl RegistrationData {
    pub fn parse(request: &RegistrationRequest) -> DecodeResult<Self> {
        let attestation_object = AttestationObject::decode(&request.attestation_object)?;
        let collected_client_data = CollectedClientData::parse(&request.client_data_json)?;
        Ok(RegistrationData {
            attestation_object,
            collected_client_data,
            collected_client_data_bytes: request.client_data_json.clone(),
            transports: request.transports.clone(),
        })
    }
}

/// Caller-side expectations for one registration ceremony.
#[derive(Debug, Clone)]
pub struct RegistrationParameters {
    server_property: ServerProperty,
    pub_key_cred_params: Option<Vec<CoseAlgorithm>>,
    user_presence_required: bool,
    user_verification_required: bool,
}

impl RegistrationParameters {
    pub fn new(server_property: ServerProperty) -> Self {
        RegistrationParameters {
            server_property,
            pub_key_cred_params: None,
            user_presence_required: true,
            user_verification_required: false,
        }
    }

    /// Restrict the credential algorithm to the listed parameters
    /// (`options.pubKeyCredParams`).
    pub fn pub_key_cred_params(mut self, algorithms: Vec<CoseAlgorithm>) -> Self {
        self.pub_key_cred_params = Some(algorithms);
        self
    }

    pub fn require_user_verification(mut self, required: bool) -> Self {
        self.user_verification_required = required;
        self
    }

    pub fn require_user_presence(mut self, required: bool) -> Self {
        self.user_presence_required = required;
        self
    }

    pub fn server_property(&self) -> &ServerProperty {
        &self.server_property
    }
}

/// Ephemeral context bundling the decoded response with the server
/// expectations and a verification timestamp; passed between the
/// verification steps and never persisted.
pub struct RegistrationObject<'a> {
    pub attestation_object: &'a AttestationObject,
    pub collected_client_data: &'a CollectedClientData,
    pub client_data_bytes: &'a [u8],
    pub client_data_hash: [u8; 32],
    pub server_property: &'a ServerProperty,
    pub timestamp: DateTime<Utc>,
    pub transports: &'a [String],
}

impl RegistrationObject<'_> {
    pub fn attested_credential_data(&self) -> VerifyResult<&AttestedCredentialData> {
        self.attestation_object
            .auth_data
            .attested_credential_data
            .as_ref()
            .ok_or(VerificationError::MissingAttestedCredentialData)
    }
}

/// Sequences the registration verification protocol. Holds only immutable
/// configuration; safe to share across concurrent calls.
pub struct RegistrationVerifier {
    statement_verifiers: StatementVerifierRegistry,
    cert_path_verifier: CertPathTrustworthinessVerifier,
    self_attestation_verifier: SelfAttestationTrustworthinessVerifier,
    max_credential_id_length: usize,
    force_block_cross_origin: bool,
}

impl RegistrationVerifier {
    pub fn new(
        statement_verifiers: StatementVerifierRegistry,
        cert_path_verifier: CertPathTrustworthinessVerifier,
    ) -> Self {
        RegistrationVerifier {
            statement_verifiers,
            cert_path_verifier,
            self_attestation_verifier: SelfAttestationTrustworthinessVerifier::default(),
            max_credential_id_length: DEFAULT_MAX_CREDENTIAL_ID_LENGTH,
            force_block_cross_origin: false,
        }
    }

    pub fn self_attestation_verifier(
        mut self,
        verifier: SelfAttestationTrustworthinessVerifier,
    ) -> Self {
        self.self_attestation_verifier = verifier;
        self
    }

    pub fn max_credential_id_length(mut self, max: usize) -> Self {
        self.max_credential_id_length = max;
        self
    }

    pub fn force_block_cross_origin(mut self, block: bool) -> Self {
        self.force_block_cross_origin = block;
        self
    }

    /// Verify a registration response against the caller's parameters,
    /// using the current time as the verification timestamp.
    pub fn verify(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
    ) -> VerifyResult<CredentialRecord> {
        self.verify_at(data, parameters, Utc::now())
    }

    /// Verify with an explicit verification timestamp. Certificate
    /// validity and SafetyNet freshness are evaluated against this
    /// instant, which lets recorded responses be re-verified.
    pub fn verify_at(
        &self,
        data: &RegistrationData,
        parameters: &RegistrationParameters,
        timestamp: DateTime<Utc>,
    ) -> VerifyResult<CredentialRecord> {
        let server_property = &parameters.server_property;
        let object = RegistrationObject {
            attestation_object: &data.attestation_object,
            collected_client_data: &data.collected_client_data,
            client_data_bytes: &data.collected_client_data_bytes,
            client_data_hash: sha256(&data.collected_client_data_bytes),
            server_property,
            timestamp,
            transports: &data.transports,
        };

        let auth_data = &data.attestation_object.auth_data;

        // A registration response must attest a credential.
        let acd = object.attested_credential_data()?;

        debug!(
            format = %data.attestation_object.format,
            aaguid = %acd.aaguid,
            "verifying registration"
        );

        // Attestation statement: format lookup, format-specific
        // verification, then the trustworthiness check the reported
        // attestation type demands.
        let attestation_type = self.statement_verifiers.verify(&object)?;
        if attestation_type == crate::attestation::AttestationType::Self_ {
            self.self_attestation_verifier
                .verify(&data.attestation_object.statement)?;
        }
        if attestation_type.requires_trust_path() {
            self.cert_path_verifier.verify(
                &acd.aaguid,
                &data.attestation_object.statement,
                timestamp,
            )?;
        }

        checks::verify_be_bs_consistency(auth_data)?;
        checks::verify_credential_id_length(&acd.credential_id, self.max_credential_id_length)?;
        checks::verify_up_uv_flags(
            auth_data,
            parameters.user_presence_required,
            parameters.user_verification_required,
        )?;
        checks::verify_algorithm_allowed(
            acd.cose_key.algorithm(),
            parameters.pub_key_cred_params.as_deref(),
        )?;

        checks::verify_client_data_type(
            &data.collected_client_data.type_,
            CLIENT_DATA_TYPE_CREATE,
        )?;
        checks::verify_challenge(&data.collected_client_data, server_property)?;
        checks::verify_rp_id_hash(&auth_data.rp_id_hash, server_property)?;
        checks::verify_token_binding(&data.collected_client_data, server_property)?;
        checks::verify_origin(&data.collected_client_data, server_property)?;
        checks::verify_top_origin(
            &data.collected_client_data,
            server_property,
            self.force_block_cross_origin,
        )?;

        Ok(CredentialRecord {
            attested_credential_data: acd.clone(),
            attestation_statement: data.attestation_object.statement.clone(),
            sign_count: auth_data.sign_count,
            uv_initialized: TriState::Known(auth_data.is_user_verified()),
            backup_eligible: TriState::Known(auth_data.is_backup_eligible()),
            backed_up: TriState::Known(auth_data.is_backed_up()),
            transports: data.transports.clone(),
            client_data: Some(data.collected_client_data_bytes.clone()),
        })
    }
}

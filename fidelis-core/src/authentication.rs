//! Authentication ceremony verification.

use openssl::sha::sha256;
use tracing::debug;

use crate::assertion::AssertionSignatureVerifier;
use crate::authenticator_data::AuthenticatorData;
use crate::checks::{self, UnknownFlagPolicy};
use crate::client_data::{CollectedClientData, CLIENT_DATA_TYPE_GET};
use crate::credential_record::StoredCredential;
use crate::error::{DecodeResult, VerificationError, VerifyResult};
use crate::server_property::ServerProperty;

/// The raw browser response to a `navigator.credentials.get()` call.
#[derive(Debug, Clone)]
pub struct AuthenticationRequest {
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

impl AuthenticationRequest {
    pub fn new(
        credential_id: Vec<u8>,
        authenticator_data: Vec<u8>,
        client_data_json: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        AuthenticationRequest {
            credential_id,
            authenticator_data,
            client_data_json,
            signature,
            user_handle: None,
        }
    }

    pub fn with_user_handle(mut self, user_handle: Vec<u8>) -> Self {
        self.user_handle = Some(user_handle);
        self
    }
}

/// The decoded authentication response.
#[derive(Debug, Clone)]
pub struct AuthenticationData {
    pub credential_id: Vec<u8>,
    pub authenticator_data: AuthenticatorData,
    pub authenticator_data_bytes: Vec<u8>,
    pub collected_client_data: CollectedClientData,
    pub collected_client_data_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

impl AuthenticationData {
    pub fn parse(request: &AuthenticationRequest) -> DecodeResult<Self> {
        let authenticator_data = AuthenticatorData::decode(&request.authenticator_data)?;
        let collected_client_data = CollectedClientData::parse(&request.client_data_json)?;
        Ok(AuthenticationData {
            credential_id: request.credential_id.clone(),
            authenticator_data,
            authenticator_data_bytes: request.authenticator_data.clone(),
            collected_client_data,
            collected_client_data_bytes: request.client_data_json.clone(),
            signature: request.signature.clone(),
            user_handle: request.user_handle.clone(),
        })
    }
}

/// Caller-side expectations for one authentication ceremony, including the
/// stored credential record looked up by credential id.
pub struct AuthenticationParameters<'a> {
    server_property: ServerProperty,
    credential: &'a dyn StoredCredential,
    allow_credentials: Option<Vec<Vec<u8>>>,
    user_presence_required: bool,
    user_verification_required: bool,
}

impl<'a> AuthenticationParameters<'a> {
    pub fn new(server_property: ServerProperty, credential: &'a dyn StoredCredential) -> Self {
        AuthenticationParameters {
            server_property,
            credential,
            allow_credentials: None,
            user_presence_required: true,
            user_verification_required: false,
        }
    }

    /// Restrict acceptable credential ids (`options.allowCredentials`).
    pub fn allow_credentials(mut self, credential_ids: Vec<Vec<u8>>) -> Self {
        self.allow_credentials = Some(credential_ids);
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
}

/// The outcome of a successful authentication. The engine mutates nothing:
/// the caller applies these values to its stored credential record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// The sign count to persist.
    pub sign_count: u32,
    /// Current backup state of the credential.
    pub backed_up: bool,
    /// Whether this ceremony verified the user. Callers should upgrade a
    /// stored unknown/false `uv_initialized` to true when set; a stored
    /// true never downgrades.
    pub uv_initialized: bool,
}

/// Sequences the authentication verification protocol. Immutable after
/// construction.
pub struct AuthenticationVerifier {
    signature_verifier: AssertionSignatureVerifier,
    unknown_flag_policy: UnknownFlagPolicy,
    force_block_cross_origin: bool,
}

impl Default for AuthenticationVerifier {
    fn default() -> Self {
        AuthenticationVerifier {
            signature_verifier: AssertionSignatureVerifier,
            unknown_flag_policy: UnknownFlagPolicy::Lenient,
            force_block_cross_origin: false,
        }
    }
}

impl AuthenticationVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// How stored records with unknown backup flags are compared; see
    /// [`UnknownFlagPolicy`].
    pub fn unknown_flag_policy(mut self, policy: UnknownFlagPolicy) -> Self {
        self.unknown_flag_policy = policy;
        self
    }

    pub fn force_block_cross_origin(mut self, block: bool) -> Self {
        self.force_block_cross_origin = block;
        self
    }

    pub fn verify(
        &self,
        data: &AuthenticationData,
        parameters: &AuthenticationParameters<'_>,
    ) -> VerifyResult<AuthenticationResult> {
        let auth_data = &data.authenticator_data;
        let server_property = &parameters.server_property;
        let credential = parameters.credential;

        debug!(sign_count = auth_data.sign_count, "verifying authentication");

        // Assertions never carry attested credential data.
        if auth_data.attested_credential_data.is_some() {
            return Err(VerificationError::UnexpectedAttestedCredentialData);
        }

        checks::verify_be_bs_consistency(auth_data)?;
        checks::verify_stored_backup_eligibility(
            credential.backup_eligible(),
            auth_data,
            self.unknown_flag_policy,
        )?;

        let client_data_hash = sha256(&data.collected_client_data_bytes);
        self.signature_verifier.verify(
            &data.authenticator_data_bytes,
            &client_data_hash,
            &data.signature,
            credential.cose_key(),
        )?;

        checks::verify_sign_count(auth_data.sign_count, credential.sign_count())?;
        checks::verify_up_uv_flags(
            auth_data,
            parameters.user_presence_required,
            parameters.user_verification_required,
        )?;
        checks::verify_credential_id_allowed(
            &data.credential_id,
            parameters.allow_credentials.as_deref(),
        )?;

        checks::verify_client_data_type(&data.collected_client_data.type_, CLIENT_DATA_TYPE_GET)?;
        checks::verify_challenge(&data.collected_client_data, server_property)?;
        checks::verify_rp_id_hash(&auth_data.rp_id_hash, server_property)?;
        checks::verify_token_binding(&data.collected_client_data, server_property)?;
        checks::verify_origin(&data.collected_client_data, server_property)?;
        checks::verify_top_origin(
            &data.collected_client_data,
            server_property,
            self.force_block_cross_origin,
        )?;

        Ok(AuthenticationResult {
            sign_count: auth_data.sign_count,
            backed_up: auth_data.is_backed_up(),
            uv_initialized: auth_data.is_user_verified(),
        })
    }
}

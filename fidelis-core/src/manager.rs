//! The convenience facade over the two ceremonies: parse the raw browser
//! response and verify it in one call.

use crate::authentication::{
    AuthenticationData, AuthenticationParameters, AuthenticationRequest, AuthenticationResult,
    AuthenticationVerifier,
};
use crate::credential_record::CredentialRecord;
use crate::error::WebauthnError;
use crate::registration::{
    RegistrationData, RegistrationParameters, RegistrationRequest, RegistrationVerifier,
};

/// Bundles the registration and authentication verifiers behind the
/// two-method API most callers want. No I/O happens inside either call;
/// the returned [`WebauthnError`] distinguishes "malformed request"
/// (decode) from "untrusted or forged response" (verification).
pub struct WebauthnManager {
    registration: RegistrationVerifier,
    authentication: AuthenticationVerifier,
}

impl WebauthnManager {
    pub fn new(
        registration: RegistrationVerifier,
        authentication: AuthenticationVerifier,
    ) -> Self {
        WebauthnManager {
            registration,
            authentication,
        }
    }

    /// Decode and verify a registration response, producing the credential
    /// record the caller persists.
    pub fn verify_registration_response(
        &self,
        request: &RegistrationRequest,
        parameters: &RegistrationParameters,
    ) -> Result<CredentialRecord, WebauthnError> {
        let data = RegistrationData::parse(request)?;
        Ok(self.registration.verify(&data, parameters)?)
    }

    /// Decode and verify an authentication response, producing the state
    /// updates the caller applies to its stored record.
    pub fn verify_authentication_response(
        &self,
        request: &AuthenticationRequest,
        parameters: &AuthenticationParameters<'_>,
    ) -> Result<AuthenticationResult, WebauthnError> {
        let data = AuthenticationData::parse(request)?;
        Ok(self.authentication.verify(&data, parameters)?)
    }

    pub fn registration_verifier(&self) -> &RegistrationVerifier {
        &self.registration
    }

    pub fn authentication_verifier(&self) -> &AuthenticationVerifier {
        &self.authentication
    }
}

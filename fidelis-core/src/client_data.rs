//! Collected client data: the JSON blob the browser signs over.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use url::Url;

use crate::error::{DecodeError, DecodeResult};

/// `type` value for a registration ceremony.
pub const CLIENT_DATA_TYPE_CREATE: &str = "webauthn.create";
/// `type` value for an authentication ceremony.
pub const CLIENT_DATA_TYPE_GET: &str = "webauthn.get";

/// A ceremony challenge. Held as raw bytes; the client transmits it
/// base64url-encoded inside the collected client data.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    pub fn new(bytes: Vec<u8>) -> Self {
        Challenge(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the base64url form found in client data.
    pub fn from_base64url(encoded: &str) -> DecodeResult<Self> {
        Ok(Challenge(URL_SAFE_NO_PAD.decode(encoded)?))
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", URL_SAFE_NO_PAD.encode(&self.0))
    }
}

/// A web origin as bound into client data.
///
/// Equality follows the WebAuthn relying-party rules: http/https origins
/// compare by scheme, host and *effective* port, so `https://example.com`
/// equals `https://example.com:443`. Origins with other schemes (for
/// example `android:apk-key-hash:…`) compare by scheme plus the opaque
/// remainder.
#[derive(Debug, Clone, Eq)]
pub struct Origin {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    opaque: Option<String>,
    raw: String,
}

impl Origin {
    pub fn parse(value: &str) -> DecodeResult<Self> {
        let url =
            Url::parse(value).map_err(|_| DecodeError::InvalidOrigin(value.to_string()))?;
        let scheme = url.scheme().to_string();
        if scheme == "http" || scheme == "https" {
            let host = url
                .host_str()
                .ok_or_else(|| DecodeError::InvalidOrigin(value.to_string()))?
                .to_string();
            Ok(Origin {
                port: url.port_or_known_default(),
                host: Some(host),
                scheme,
                opaque: None,
                raw: value.to_string(),
            })
        } else {
            let opaque = value
                .splitn(2, ':')
                .nth(1)
                .unwrap_or_default()
                .to_string();
            Ok(Origin {
                scheme,
                host: None,
                port: None,
                opaque: Some(opaque),
                raw: value.to_string(),
            })
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The effective port (explicit, or the scheme default).
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl PartialEq for Origin {
    fn eq(&self, other: &Self) -> bool {
        if self.scheme != other.scheme {
            return false;
        }
        match (&self.host, &other.host) {
            (Some(a), Some(b)) => a == b && self.port == other.port,
            (None, None) => self.opaque == other.opaque,
            _ => false,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Token binding information, kept for WebAuthn Level 2 compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenBinding {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// The parsed collected client data.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedClientData {
    /// Ceremony type string (`webauthn.create` / `webauthn.get`). Unknown
    /// values survive decoding; the orchestrators reject them.
    pub type_: String,
    pub challenge: Challenge,
    pub origin: Origin,
    pub cross_origin: Option<bool>,
    pub top_origin: Option<Origin>,
    pub token_binding: Option<TokenBinding>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientData {
    #[serde(rename = "type")]
    type_: String,
    challenge: String,
    origin: String,
    #[serde(default)]
    cross_origin: Option<bool>,
    #[serde(default)]
    top_origin: Option<String>,
    #[serde(default)]
    token_binding: Option<TokenBinding>,
}

impl CollectedClientData {
    /// Parse the UTF-8 JSON bytes of `clientDataJSON`. Unknown top-level
    /// fields are ignored for forward compatibility; malformed required
    /// fields are decode errors.
    pub fn parse(bytes: &[u8]) -> DecodeResult<Self> {
        let raw: RawClientData = serde_json::from_slice(bytes)?;
        let top_origin = match &raw.top_origin {
            Some(value) => Some(Origin::parse(value)?),
            None => None,
        };
        Ok(CollectedClientData {
            challenge: Challenge::from_base64url(&raw.challenge)?,
            origin: Origin::parse(&raw.origin)?,
            cross_origin: raw.cross_origin,
            top_origin,
            token_binding: raw.token_binding,
            type_: raw.type_,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_client_data() {
        let json = br#"{"type":"webauthn.create","challenge":"AQIDBA","origin":"https://example.com"}"#;
        let data = CollectedClientData::parse(json).unwrap();
        assert_eq!(data.type_, CLIENT_DATA_TYPE_CREATE);
        assert_eq!(data.challenge.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(data.cross_origin, None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = br#"{"type":"webauthn.get","challenge":"AA","origin":"https://example.com","other_keys_can_be_added_here":"x"}"#;
        assert!(CollectedClientData::parse(json).is_ok());
    }

    #[test]
    fn invalid_challenge_is_a_decode_error() {
        let json = br#"{"type":"webauthn.get","challenge":"!!!","origin":"https://example.com"}"#;
        assert!(matches!(
            CollectedClientData::parse(json).unwrap_err(),
            DecodeError::Base64(_)
        ));
    }

    #[test]
    fn default_port_equivalence() {
        let a = Origin::parse("https://example.com").unwrap();
        let b = Origin::parse("https://example.com:443").unwrap();
        let c = Origin::parse("https://example.com:8443").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn scheme_and_host_must_match() {
        let https = Origin::parse("https://example.com").unwrap();
        let http = Origin::parse("http://example.com").unwrap();
        let evil = Origin::parse("https://evil.com").unwrap();
        assert_ne!(https, http);
        assert_ne!(https, evil);
    }

    #[test]
    fn opaque_origins_compare_by_scheme_specific_part() {
        let a = Origin::parse("android:apk-key-hash:abc").unwrap();
        let b = Origin::parse("android:apk-key-hash:abc").unwrap();
        let c = Origin::parse("android:apk-key-hash:def").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

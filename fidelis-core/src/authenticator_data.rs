//! Authenticator data: the fixed-offset binary structure every WebAuthn
//! response carries.
//!
//! Wire layout (WebAuthn §6.1):
//!
//! ```text
//! rpIdHash(32) ‖ flags(1) ‖ signCount(4, BE)
//!   ‖ [attestedCredentialData]   when the AT flag is set
//!   ‖ [extensions (CBOR map)]    when the ED flag is set
//! attestedCredentialData = aaguid(16) ‖ credentialIdLength(2, BE)
//!   ‖ credentialId ‖ credentialPublicKey (CBOR map)
//! ```
//!
//! The structure is not length-prefixed at the top level, so the decoder
//! must parse the COSE key first to discover where the extension block
//! begins. That ordering is load-bearing and preserved exactly here.

use std::fmt;
use std::io::Cursor;

use ciborium::value::Value;
use uuid::Uuid;

use crate::cbor;
use crate::cose::CoseKey;
use crate::error::{DecodeError, DecodeResult};

/// User present.
pub const FLAG_UP: u8 = 0x01;
/// User verified.
pub const FLAG_UV: u8 = 0x04;
/// Backup eligible.
pub const FLAG_BE: u8 = 0x08;
/// Backup state (currently backed up).
pub const FLAG_BS: u8 = 0x10;
/// Attested credential data included.
pub const FLAG_AT: u8 = 0x40;
/// Extension data included.
pub const FLAG_ED: u8 = 0x80;

const FIXED_HEADER_LEN: usize = 32 + 1 + 4;

/// Authenticator Attestation GUID, identifying the authenticator model.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aaguid(pub [u8; 16]);

impl Aaguid {
    /// The all-zero AAGUID reported by U2F authenticators.
    pub const ZERO: Aaguid = Aaguid([0u8; 16]);

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Aaguid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aaguid({})", Uuid::from_bytes(self.0))
    }
}

impl fmt::Display for Aaguid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

/// The credential material minted by the authenticator at registration.
/// Present only when the AT flag is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: Aaguid,
    pub credential_id: Vec<u8>,
    pub cose_key: CoseKey,
}

impl AttestedCredentialData {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.aaguid.0);
        let len = u16::try_from(self.credential_id.len())
            .expect("credential id longer than u16::MAX cannot be encoded");
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&self.cose_key.encode());
    }
}

/// Decoded authenticator data.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    /// The raw extension map when the ED flag is set. Extension outputs are
    /// carried opaquely; interpreting individual extensions is the caller's
    /// concern.
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    /// Decode from raw bytes, consuming the entire input.
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(DecodeError::UnexpectedEnd {
                context: "authenticator data header",
                expected: FIXED_HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut cursor = Cursor::new(bytes);
        cursor.set_position(FIXED_HEADER_LEN as u64);

        let attested_credential_data = if flags & FLAG_AT != 0 {
            Some(Self::decode_attested_credential_data(&mut cursor)?)
        } else {
            None
        };

        let extensions = if flags & FLAG_ED != 0 {
            let value = cbor::parse_one(&mut cursor, "authenticator data extensions")?;
            if !matches!(value, Value::Map(_)) {
                return Err(DecodeError::UnexpectedType("extensions"));
            }
            Some(value)
        } else {
            None
        };

        let consumed = cursor.position() as usize;
        if consumed < bytes.len() {
            return Err(DecodeError::SurplusBytes(
                "authenticator data",
                bytes.len() - consumed,
            ));
        }

        Ok(AuthenticatorData {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// The attested-credential-data sub-parser. Consumes exactly
    /// `aaguid(16) + credentialIdLength(2) + credentialId + COSEKey`; the
    /// COSE key's length is discovered by parsing, not declared.
    fn decode_attested_credential_data(
        cursor: &mut Cursor<&[u8]>,
    ) -> DecodeResult<AttestedCredentialData> {
        let bytes = *cursor.get_ref();
        let mut pos = cursor.position() as usize;

        let need = |pos: usize, n: usize, context: &'static str| -> DecodeResult<()> {
            if bytes.len() < pos + n {
                Err(DecodeError::UnexpectedEnd {
                    context,
                    expected: pos + n,
                    actual: bytes.len(),
                })
            } else {
                Ok(())
            }
        };

        need(pos, 16, "attested credential data aaguid")?;
        let mut aaguid = [0u8; 16];
        aaguid.copy_from_slice(&bytes[pos..pos + 16]);
        pos += 16;

        need(pos, 2, "credential id length")?;
        let id_len = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
        pos += 2;

        need(pos, id_len, "credential id")?;
        let credential_id = bytes[pos..pos + id_len].to_vec();
        pos += id_len;

        cursor.set_position(pos as u64);
        let key_value = cbor::parse_one(cursor, "credential public key")?;
        let cose_key = CoseKey::from_cbor_value(&key_value)?;

        Ok(AttestedCredentialData {
            aaguid: Aaguid(aaguid),
            credential_id,
            cose_key,
        })
    }

    /// Encode back to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags);
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(acd) = &self.attested_credential_data {
            acd.encode_into(&mut out);
        }
        if let Some(extensions) = &self.extensions {
            out.extend_from_slice(&cbor::encode(extensions));
        }
        out
    }

    pub fn is_user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn is_user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    pub fn is_backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    pub fn is_backed_up(&self) -> bool {
        self.flags & FLAG_BS != 0
    }

    pub fn has_attested_credential_data(&self) -> bool {
        self.flags & FLAG_AT != 0
    }

    pub fn has_extensions(&self) -> bool {
        self.flags & FLAG_ED != 0
    }
}

//! Relying-party-side expectations for a single verification call.

use std::fmt;
use std::sync::Arc;

use crate::client_data::{Challenge, Origin};

/// Decides whether a presented origin is acceptable.
#[derive(Clone)]
pub enum OriginPredicate {
    /// Accept only origins equal to one of the listed origins
    /// (default-port equivalence applies through [`Origin`] equality).
    ExactMatch(Vec<Origin>),
    /// Accept any origin. Intended for tests and for deployments that
    /// delegate origin policy to a custom predicate elsewhere.
    Any,
    /// Arbitrary caller-supplied policy.
    Custom(Arc<dyn Fn(&Origin) -> bool + Send + Sync>),
}

impl OriginPredicate {
    pub fn test(&self, origin: &Origin) -> bool {
        match self {
            OriginPredicate::ExactMatch(allowed) => allowed.iter().any(|o| o == origin),
            OriginPredicate::Any => true,
            OriginPredicate::Custom(predicate) => predicate(origin),
        }
    }
}

impl fmt::Debug for OriginPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginPredicate::ExactMatch(origins) => {
                f.debug_tuple("ExactMatch").field(origins).finish()
            }
            OriginPredicate::Any => f.write_str("Any"),
            OriginPredicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// The immutable server-side parameters of a ceremony: relying party id,
/// expected challenge, origin policy, and the optional top-origin policy
/// for cross-origin (iframe) flows.
///
/// Built once per verification call through [`ServerProperty::builder`];
/// there is no other constructor surface.
#[derive(Debug, Clone)]
pub struct ServerProperty {
    rp_id: String,
    challenge: Challenge,
    origin_predicate: OriginPredicate,
    top_origin_predicate: Option<OriginPredicate>,
    token_binding_id: Option<String>,
}

impl ServerProperty {
    pub fn builder(rp_id: impl Into<String>, challenge: Challenge) -> ServerPropertyBuilder {
        ServerPropertyBuilder {
            rp_id: rp_id.into(),
            challenge,
            origin_predicate: None,
            top_origin_predicate: None,
            token_binding_id: None,
        }
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    pub fn origin_predicate(&self) -> &OriginPredicate {
        &self.origin_predicate
    }

    pub fn top_origin_predicate(&self) -> Option<&OriginPredicate> {
        self.top_origin_predicate.as_ref()
    }

    pub fn token_binding_id(&self) -> Option<&str> {
        self.token_binding_id.as_deref()
    }
}

pub struct ServerPropertyBuilder {
    rp_id: String,
    challenge: Challenge,
    origin_predicate: Option<OriginPredicate>,
    top_origin_predicate: Option<OriginPredicate>,
    token_binding_id: Option<String>,
}

impl ServerPropertyBuilder {
    /// Accept exactly the listed origins.
    pub fn origins(mut self, origins: Vec<Origin>) -> Self {
        self.origin_predicate = Some(OriginPredicate::ExactMatch(origins));
        self
    }

    /// Accept a single origin.
    pub fn origin(self, origin: Origin) -> Self {
        self.origins(vec![origin])
    }

    pub fn origin_predicate(mut self, predicate: OriginPredicate) -> Self {
        self.origin_predicate = Some(predicate);
        self
    }

    /// Accept the listed top origins for cross-origin ceremonies. Without
    /// a top-origin predicate, any ceremony with `crossOrigin == true`
    /// fails.
    pub fn top_origins(mut self, origins: Vec<Origin>) -> Self {
        self.top_origin_predicate = Some(OriginPredicate::ExactMatch(origins));
        self
    }

    pub fn top_origin_predicate(mut self, predicate: OriginPredicate) -> Self {
        self.top_origin_predicate = Some(predicate);
        self
    }

    pub fn token_binding_id(mut self, id: impl Into<String>) -> Self {
        self.token_binding_id = Some(id.into());
        self
    }

    pub fn build(self) -> ServerProperty {
        ServerProperty {
            rp_id: self.rp_id,
            challenge: self.challenge,
            // An unset origin policy accepts nothing, never everything.
            origin_predicate: self
                .origin_predicate
                .unwrap_or(OriginPredicate::ExactMatch(Vec::new())),
            top_origin_predicate: self.top_origin_predicate,
            token_binding_id: self.token_binding_id,
        }
    }
}

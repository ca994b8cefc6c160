//! Trust anchor storage.
//!
//! Anchors are keyed by AAGUID for most formats and by the end-entity
//! certificate's subject-key-identifier for FIDO-U2F, whose authenticators
//! predate AAGUIDs. The in-memory repository supports a refresh that swaps
//! in a complete new snapshot: readers either see the old set or the new
//! one, never a mixture.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use openssl::x509::X509;
use thiserror::Error;

use crate::authenticator_data::Aaguid;

/// Failure to load trust anchors from an external source.
#[derive(Error, Debug)]
pub enum AnchorLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse certificate material: {0}")]
    Certificate(#[from] openssl::error::ErrorStack),
}

/// Read-only anchor lookup used during verification.
pub trait TrustAnchorRepository: Send + Sync {
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> Vec<X509>;
    fn find_by_key_id(&self, key_id: &[u8]) -> Vec<X509>;
}

/// An immutable set of trust anchors, built by the loader and installed
/// into the repository as one unit.
#[derive(Default, Clone)]
pub struct TrustAnchorSet {
    by_aaguid: HashMap<[u8; 16], Vec<X509>>,
    by_key_id: HashMap<Vec<u8>, Vec<X509>>,
    /// Anchors trusted for every authenticator model, regardless of lookup
    /// key. Keystore-file deployments commonly trust a fixed set of roots
    /// for all models.
    global: Vec<X509>,
}

impl TrustAnchorSet {
    pub fn new() -> Self {
        TrustAnchorSet::default()
    }

    pub fn add_for_aaguid(&mut self, aaguid: Aaguid, anchor: X509) {
        self.by_aaguid.entry(aaguid.0).or_default().push(anchor);
    }

    pub fn add_for_key_id(&mut self, key_id: Vec<u8>, anchor: X509) {
        self.by_key_id.entry(key_id).or_default().push(anchor);
    }

    pub fn add_global(&mut self, anchor: X509) {
        self.global.push(anchor);
    }

    /// Load every certificate from a PEM bundle as a global anchor.
    pub fn add_global_pem_file(&mut self, path: impl AsRef<Path>) -> Result<(), AnchorLoadError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| AnchorLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for cert in X509::stack_from_pem(&pem)? {
            self.add_global(cert);
        }
        Ok(())
    }

    /// Load a PEM bundle trusted only for one authenticator model.
    pub fn add_aaguid_pem_file(
        &mut self,
        aaguid: Aaguid,
        path: impl AsRef<Path>,
    ) -> Result<(), AnchorLoadError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| AnchorLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for cert in X509::stack_from_pem(&pem)? {
            self.add_for_aaguid(aaguid, cert);
        }
        Ok(())
    }

    fn find_by_aaguid(&self, aaguid: &Aaguid) -> Vec<X509> {
        let mut anchors = self.global.clone();
        if let Some(specific) = self.by_aaguid.get(&aaguid.0) {
            anchors.extend(specific.iter().cloned());
        }
        anchors
    }

    fn find_by_key_id(&self, key_id: &[u8]) -> Vec<X509> {
        let mut anchors = self.global.clone();
        if let Some(specific) = self.by_key_id.get(key_id) {
            anchors.extend(specific.iter().cloned());
        }
        anchors
    }
}

/// The process-wide anchor repository: populated at startup, refreshed by
/// an external collaborator, read concurrently by every verification call.
pub struct InMemoryTrustAnchorRepository {
    snapshot: RwLock<Arc<TrustAnchorSet>>,
}

impl InMemoryTrustAnchorRepository {
    pub fn new(set: TrustAnchorSet) -> Self {
        InMemoryTrustAnchorRepository {
            snapshot: RwLock::new(Arc::new(set)),
        }
    }

    pub fn empty() -> Self {
        Self::new(TrustAnchorSet::new())
    }

    /// Replace the whole anchor set atomically. In-flight verifications
    /// keep the snapshot they already acquired.
    pub fn refresh(&self, set: TrustAnchorSet) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(set);
    }

    fn current(&self) -> Arc<TrustAnchorSet> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TrustAnchorRepository for InMemoryTrustAnchorRepository {
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> Vec<X509> {
        self.current().find_by_aaguid(aaguid)
    }

    fn find_by_key_id(&self, key_id: &[u8]) -> Vec<X509> {
        self.current().find_by_key_id(key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_repository_finds_nothing() {
        let repo = InMemoryTrustAnchorRepository::empty();
        assert!(repo.find_by_aaguid(&Aaguid::ZERO).is_empty());
        assert!(repo.find_by_key_id(&[0u8; 20]).is_empty());
    }

    #[test]
    fn refresh_swaps_the_whole_set() {
        let (cert, _) = crate::test_support::self_signed_ec_cert("Anchor", true);
        let repo = InMemoryTrustAnchorRepository::empty();

        let mut set = TrustAnchorSet::new();
        set.add_for_aaguid(Aaguid([1; 16]), cert);
        repo.refresh(set);

        assert_eq!(repo.find_by_aaguid(&Aaguid([1; 16])).len(), 1);
        assert!(repo.find_by_aaguid(&Aaguid([2; 16])).is_empty());

        repo.refresh(TrustAnchorSet::new());
        assert!(repo.find_by_aaguid(&Aaguid([1; 16])).is_empty());
    }

    #[test]
    fn global_anchors_apply_to_every_key() {
        let (cert, _) = crate::test_support::self_signed_ec_cert("Global", true);
        let mut set = TrustAnchorSet::new();
        set.add_global(cert);
        let repo = InMemoryTrustAnchorRepository::new(set);
        assert_eq!(repo.find_by_aaguid(&Aaguid([9; 16])).len(), 1);
        assert_eq!(repo.find_by_key_id(&[7u8; 20]).len(), 1);
    }
}

// ============================================
// File: crates/veilink-relay/src/services/keystore.rs
// ============================================
//! # Key Store
//!
//! ## Creation Reason
//! The router generates our destination once; the key pair must then be
//! reused on every start so peers keep reaching the same label.
//!
//! ## Main Functionality
//! - `KeyStore::load`: Reads and validates the key file
//! - `KeyStore::save`: Writes the key file with owner-only permissions
//!
//! ## ⚠️ Important Note for Next Developer
//! - The file holds the private key; keep mode 0600 on Unix
//! - Missing or corrupt key files are fatal at startup
//!
//! ## Last Modified
//! v0.1.0 - Initial key store

use std::path::{Path, PathBuf};

use tracing::info;

use veilink_core::identity::Keypair;

use crate::error::{RelayError, Result};

/// Location of the persisted key pair.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the key pair.
    ///
    /// # Errors
    /// Returns `KeyStore` if the file is missing, unreadable or invalid.
    pub async fn load(&self) -> Result<Keypair> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.error(e.to_string()))?;
        let keypair = Keypair::from_json(&content).map_err(|e| self.error(e.to_string()))?;

        info!(path = %self.path.display(), label = %keypair.identity().label(), "Key pair loaded");
        Ok(keypair)
    }

    /// Writes the key pair, creating parent directories.
    ///
    /// # Errors
    /// Returns `KeyStore` if the file can't be written.
    pub async fn save(&self, keypair: &Keypair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e.to_string()))?;
        }

        let content = keypair.to_json().map_err(|e| self.error(e.to_string()))?;
        tokio::fs::write(&self.path, content.as_bytes())
            .await
            .map_err(|e| self.error(e.to_string()))?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&self.path)
                .await
                .map_err(|e| self.error(e.to_string()))?
                .permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms)
                .await
                .map_err(|e| self.error(e.to_string()))?;
        }

        info!(path = %self.path.display(), label = %keypair.identity().label(), "Key pair saved");
        Ok(())
    }

    fn error(&self, reason: String) -> RelayError {
        RelayError::key_store(self.path.display().to_string(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilink_core::identity::Identity;

    fn keypair() -> Keypair {
        let public = Identity::from_bytes(vec![7u8; 387]).unwrap();
        let mut private = public.as_bytes().to_vec();
        private.extend_from_slice(&[9u8; 64]);
        let private = Identity::from_bytes(private).unwrap();
        Keypair::from_parts(public.to_base64(), private.to_base64()).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("keys").join("veilink.key"));
        assert!(!store.exists());

        let original = keypair();
        store.save(&original).await.unwrap();
        assert!(store.exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.identity(), original.identity());
        assert_eq!(loaded.private_base64(), original.private_base64());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("veilink.key"));
        store.save(&keypair()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = KeyStore::new(dir.path().join("absent.key"));
        assert!(matches!(missing.load().await, Err(RelayError::KeyStore { .. })));

        let corrupt_path = dir.path().join("corrupt.key");
        tokio::fs::write(&corrupt_path, "{not json").await.unwrap();
        let corrupt = KeyStore::new(corrupt_path);
        let err = corrupt.load().await.unwrap_err();
        assert!(err.is_fatal());
    }
}

//! File-backed storage for the single API key.
//!
//! The key lives in a small JSON document under the fixed field
//! `gemini_api_key`. It is read once at startup and rewritten whenever the
//! settings view saves a new key.

use std::path::{Path, PathBuf};

use canvas_genai::Credential;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CanvasError, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gemini_api_key: Option<String>,
}

/// Reads and writes the credentials file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by `path`. Nothing is read until [`Self::load`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored key, if any.
    ///
    /// A missing file or missing key yields `None`. A stored key that fails
    /// the prefix check is ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::CredentialStore` if the file cannot be read or is
    /// not valid JSON.
    pub fn load(&self) -> Result<Option<Credential>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No credentials file");
                return Ok(None);
            }
            Err(e) => {
                return Err(CanvasError::credential_store(
                    &self.path,
                    format!("failed to read file: {e}"),
                ))
            }
        };

        let stored: StoredCredentials = serde_json::from_str(&contents)
            .map_err(|e| CanvasError::credential_store(&self.path, e.to_string()))?;

        let Some(raw) = stored.gemini_api_key else {
            return Ok(None);
        };
        match Credential::parse(&raw) {
            Ok(credential) => {
                info!(hint = %credential.hint(), "Loaded stored API key");
                Ok(Some(credential))
            }
            Err(_) => {
                warn!(path = %self.path.display(), "Ignoring stored API key with invalid format");
                Ok(None)
            }
        }
    }

    /// Writes `credential`, replacing any stored key.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::CredentialStore` if the file or its directory
    /// cannot be written.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CanvasError::credential_store(&self.path, format!("failed to create directory: {e}"))
            })?;
        }

        let stored = StoredCredentials {
            gemini_api_key: Some(credential.expose().to_string()),
        };
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, json).map_err(|e| {
            CanvasError::credential_store(&self.path, format!("failed to write file: {e}"))
        })?;
        restrict_permissions(&self.path);

        info!(path = %self.path.display(), hint = %credential.hint(), "Saved API key");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %e, "Could not restrict credentials file permissions");
    }
}

#[cfg(not(unix))]
const fn restrict_permissions(_path: &Path) {}

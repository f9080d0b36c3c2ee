//! OAuth application credentials
//!
//! The native flow needs the app's `client_id` and `client_secret`. They come
//! from a [`CredentialSource`]; the file-backed source reads a flat JSON
//! object and writes it atomically (temp file + rename, mode 0600).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Client id and secret of the registered application.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret<String>>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn validate(self) -> Result<Self> {
        if self.client_id.trim().is_empty() || self.client_secret.is_empty() {
            return Err(Error::InvalidCredentials(
                "credentials are missing client_id/client_secret".into(),
            ));
        }
        Ok(self)
    }
}

/// Where the flow gets client credentials from.
///
/// Implementations must return [`Error::CredentialsMissing`] when nothing is
/// configured, and reserve other errors for credentials that exist but are
/// unusable.
pub trait CredentialSource: Send + Sync {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<ClientCredentials>> + Send + '_>>;
}

#[derive(Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

/// Credentials stored as `{"client_id": "...", "client_secret": "..."}`.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<ClientCredentials> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CredentialsMissing(format!(
                    "no credentials file at {}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };

        let file: CredentialsFile = serde_json::from_slice(&contents).map_err(|e| {
            Error::CredentialParse(format!("{}: {e}", self.path.display()))
        })?;

        ClientCredentials::new(file.client_id, file.client_secret).validate()
    }

    /// Validate and persist `credentials`, replacing any existing file.
    pub async fn save(&self, credentials: &ClientCredentials) -> Result<()> {
        let credentials = credentials.clone().validate()?;
        let file = CredentialsFile {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.expose().clone(),
        };
        let mut json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;
        json.push('\n');

        write_atomic(&self.path, json.as_bytes()).await
    }
}

impl CredentialSource for FileCredentialSource {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<ClientCredentials>> + Send + '_>> {
        Box::pin(self.read())
    }
}

/// Write `data` to a sibling temp file, restrict it to 0600, then rename it
/// over `path`.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::Io(format!("creating {}: {e}", dir.display())))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted client credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileCredentialSource::new(dir.path().join("credentials.json"));

        source
            .save(&ClientCredentials::new("1234", "s3cret"))
            .await
            .unwrap();

        let loaded = source.load().await.unwrap();
        assert_eq!(loaded.client_id, "1234");
        assert_eq!(loaded.client_secret.expose(), "s3cret");
    }

    #[tokio::test]
    async fn missing_file_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileCredentialSource::new(dir.path().join("nope.json"));

        let err = source.load().await.unwrap_err();
        assert!(matches!(err, Error::CredentialsMissing(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = FileCredentialSource::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::CredentialParse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_fields_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, r#"{"client_id":"1234"}"#).await.unwrap();

        let err = FileCredentialSource::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn save_rejects_empty_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let err = FileCredentialSource::new(path.clone())
            .save(&ClientCredentials::new("1234", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        FileCredentialSource::new(path.clone())
            .save(&ClientCredentials::new("1234", "s3cret"))
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/storefront/credentials.json");
        let source = FileCredentialSource::new(path.clone());

        source
            .save(&ClientCredentials::new("1234", "s3cret"))
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = ClientCredentials::new("1234", "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }
}

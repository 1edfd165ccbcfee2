//! OAuth2 credential handling and Gmail hub construction

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use yup_oauth2::ApplicationSecret;

use crate::error::{GmailError, Result};

/// Read/write access to messages, used for listing, fetching and labeling
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Label listing and creation
pub const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Every scope the organizer requests up front
pub const REQUIRED_SCOPES: &[&str] = &[MODIFY_SCOPE, LABELS_SCOPE];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Where OAuth client secrets and the cached user token live.
///
/// `connect` acquires a token (reusing, refreshing or re-authorizing as
/// needed), persists it to `token_cache_path` and hands back a ready hub.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    credentials_path: PathBuf,
    token_cache_path: PathBuf,
}

impl CredentialStore {
    pub fn new(credentials_path: impl Into<PathBuf>, token_cache_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_cache_path: token_cache_path.into(),
        }
    }

    /// Client secret from the credentials file, or from the environment when
    /// the file does not exist
    pub async fn application_secret(&self) -> Result<ApplicationSecret> {
        if self.credentials_path.exists() {
            return yup_oauth2::read_application_secret(&self.credentials_path)
                .await
                .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)));
        }

        debug!(
            "No credentials file at {:?}, falling back to environment",
            self.credentials_path
        );
        load_credentials_from_env().map_err(|e| {
            GmailError::AuthError(format!(
                "No credentials file at {:?} and {}",
                self.credentials_path, e
            ))
        })
    }

    /// Authenticate and build the Gmail hub
    pub async fn connect(&self) -> Result<GmailHub> {
        if let Some(parent) = self.token_cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let secret = self.application_secret().await?;

        // HTTPRedirect opens a browser for user authorization
        let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(&self.token_cache_path)
        .build()
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        // Request all scopes now so later calls reuse the cached token
        auth.token(REQUIRED_SCOPES)
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

        if self.token_cache_path.exists() {
            secure_token_file(&self.token_cache_path).await?;
        }

        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(
                    hyper_rustls::HttpsConnectorBuilder::new()
                        .with_native_roots()
                        .map_err(|e| {
                            GmailError::AuthError(format!("Failed to load TLS roots: {}", e))
                        })?
                        .https_or_http()
                        .enable_http1()
                        .build(),
                );

        info!("Authenticated with Gmail API");
        Ok(Gmail::new(client, auth))
    }

    /// Drop the cached token so the next `connect` re-authorizes.
    ///
    /// Returns whether a token was actually removed.
    pub async fn forget(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.token_cache_path).await {
            Ok(()) => {
                info!("Removed cached token at {:?}", self.token_cache_path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token file to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // Windows relies on the profile directory ACLs
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::{NamedTempFile, TempDir};

    const CREDENTIALS_JSON: &str = r#"{
        "installed": {
            "client_id": "test-client-id",
            "project_id": "test-project",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "test-secret",
            "redirect_uris": ["http://localhost:8080"]
        }
    }"#;

    #[tokio::test]
    #[serial]
    async fn test_application_secret_prefers_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), CREDENTIALS_JSON).await.unwrap();
        env::set_var("GMAIL_CLIENT_ID", "env-id");
        env::set_var("GMAIL_CLIENT_SECRET", "env-secret");

        let store = CredentialStore::new(temp_file.path(), "unused-token.json");
        let secret = store.application_secret().await.unwrap();
        assert_eq!(secret.client_id, "test-client-id");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
    }

    #[tokio::test]
    #[serial]
    async fn test_application_secret_falls_back_to_env() {
        let dir = TempDir::new().unwrap();
        env::set_var("GMAIL_CLIENT_ID", "env-id");
        env::set_var("GMAIL_CLIENT_SECRET", "env-secret");

        let store = CredentialStore::new(dir.path().join("missing.json"), dir.path().join("t.json"));
        let secret = store.application_secret().await.unwrap();
        assert_eq!(secret.client_id, "env-id");
        assert_eq!(secret.client_secret, "env-secret");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
    }

    #[tokio::test]
    #[serial]
    async fn test_application_secret_missing_everywhere() {
        let dir = TempDir::new().unwrap();
        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");

        let store = CredentialStore::new(dir.path().join("missing.json"), dir.path().join("t.json"));
        let err = store.application_secret().await.unwrap_err();
        assert!(matches!(err, GmailError::AuthError(_)));
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env_default_redirect() {
        env::set_var("GMAIL_CLIENT_ID", "test-id");
        env::set_var("GMAIL_CLIENT_SECRET", "test-secret");
        env::remove_var("GMAIL_REDIRECT_URI");

        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.redirect_uris[0], "http://localhost:8080");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
    }

    #[tokio::test]
    async fn test_forget_removes_token_once() {
        let dir = TempDir::new().unwrap();
        let token = dir.path().join("token.json");
        tokio::fs::write(&token, "{}").await.unwrap();

        let store = CredentialStore::new(dir.path().join("credentials.json"), &token);
        assert!(store.forget().await.unwrap());
        assert!(!token.exists());
        assert!(!store.forget().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secure_token_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp_file = NamedTempFile::new().unwrap();
        secure_token_file(temp_file.path()).await.unwrap();

        let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_scopes() {
        assert_eq!(REQUIRED_SCOPES.len(), 2);
        assert!(REQUIRED_SCOPES.contains(&MODIFY_SCOPE));
        assert!(REQUIRED_SCOPES.contains(&LABELS_SCOPE));
    }
}

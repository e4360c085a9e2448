//! Credential file in the upstream CLI's `oauth_creds.json` format.

use crate::refresh::{TokenRefresher, refresh_and_save};
use async_trait::async_trait;
use assistgate_types::{Credential, CredentialsProvider, GatewayError, error::Result};
use std::path::{Path, PathBuf};

/// A [`CredentialsProvider`] backed by a JSON file on disk.
///
/// Saves go through a sibling temp file and a rename, so readers never see
/// a half-written record.
pub struct FileCredentials {
    path: PathBuf,
    refresher: TokenRefresher,
}

impl FileCredentials {
    #[must_use]
    pub fn new(path: PathBuf, refresher: TokenRefresher) -> Self {
        Self { path, refresher }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialsProvider for FileCredentials {
    async fn get_credentials(&self) -> Result<Credential> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GatewayError::CredentialsNotFound);
            }
            Err(e) => {
                return Err(GatewayError::Storage(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::Storage(format!("invalid credential file {}: {e}", self.path.display()))
        })
    }

    async fn save_credentials(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_vec_pretty(credential)?;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| GatewayError::Storage(format!("cannot create {}: {e}", dir.display())))?;
        }

        let tmp = self.temp_path();
        write_private(&tmp, &json)
            .await
            .map_err(|e| GatewayError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            GatewayError::Storage(format!("cannot replace {}: {e}", self.path.display()))
        })
    }

    async fn refresh_token(&self) -> Result<Credential> {
        refresh_and_save(self, &self.refresher).await
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt as _;

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::tests::mock_refresher;
    use assistgate_config::OAuthConfig;
    use axum::http::StatusCode;

    fn store_at(path: PathBuf) -> FileCredentials {
        FileCredentials::new(
            path,
            TokenRefresher::new(rquest::Client::new(), &OAuthConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path().join("oauth_creds.json"));
        assert!(matches!(
            store.get_credentials().await,
            Err(GatewayError::CredentialsNotFound)
        ));
    }

    #[tokio::test]
    async fn test_reads_cli_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        std::fs::write(
            &path,
            r#"{"access_token":"ya29.x","refresh_token":"1//y","expiry_date":1893456000000,"token_type":"Bearer","scope":"openid"}"#,
        )
        .unwrap();
        let c = store_at(path).get_credentials().await.unwrap();
        assert_eq!(c.access_token, "ya29.x");
        assert_eq!(c.expiry_date, 1_893_456_000_000);
    }

    #[tokio::test]
    async fn test_garbage_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            store_at(path).get_credentials().await,
            Err(GatewayError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_save_creates_dirs_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("oauth_creds.json");
        let store = store_at(path.clone());
        store
            .save_credentials(&Credential::new("a").with_refresh("r"))
            .await
            .unwrap();

        assert_eq!(store.get_credentials().await.unwrap().refresh_token, "r");
        assert!(!store.temp_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_is_owner_only() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        store_at(path.clone())
            .save_credentials(&Credential::new("a"))
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_refresh_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        let refresher = mock_refresher(
            serde_json::json!({"access_token": "renewed", "expires_in": 3600}),
            StatusCode::OK,
        )
        .await;
        let store = FileCredentials::new(path.clone(), refresher);
        store
            .save_credentials(&Credential::new("old").with_refresh("rt"))
            .await
            .unwrap();

        store.refresh_token().await.unwrap();
        let on_disk: Credential = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.access_token, "renewed");
        assert_eq!(on_disk.refresh_token, "rt");
    }
}

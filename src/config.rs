use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::{Authorizer, ServiceAccount, StaticToken};
use crate::error::{DeployError, DeployResult};

pub const DEFAULT_CACHE_MAX_AGE: u64 = 1800;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How the deploy obtains its bearer token.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ServiceAccount {
        client_email: String,
        private_key: String,
    },
    AccessToken(String),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::ServiceAccount { client_email, .. } => f
                .debug_struct("CredentialSource::ServiceAccount")
                .field("client_email", client_email)
                .field("private_key", &"***")
                .finish(),
            CredentialSource::AccessToken(_) => f
                .debug_tuple("CredentialSource::AccessToken")
                .field(&"***")
                .finish(),
        }
    }
}

impl CredentialSource {
    /// Picks the first complete credential: an explicit access token, then an
    /// explicit email and key pair, then a service account key file.
    pub fn resolve(
        access_token: Option<String>,
        client_email: Option<String>,
        private_key: Option<String>,
        key_file: Option<&ServiceAccountKey>,
    ) -> DeployResult<Self> {
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            return Ok(CredentialSource::AccessToken(token));
        }
        match (client_email, private_key, key_file) {
            (Some(client_email), Some(private_key), _) => Ok(CredentialSource::ServiceAccount {
                client_email,
                private_key: normalize_private_key(&private_key),
            }),
            (None, None, Some(key)) => Ok(CredentialSource::ServiceAccount {
                client_email: key.client_email.clone(),
                private_key: normalize_private_key(&key.private_key),
            }),
            (Some(_), None, _) => Err(DeployError::Config(
                "a client email was given without a private key".to_string(),
            )),
            (None, Some(_), _) => Err(DeployError::Config(
                "a private key was given without a client email".to_string(),
            )),
            (None, None, None) => Err(DeployError::Config(
                "no credentials: set an access token, a service account email and key, or a key file"
                    .to_string(),
            )),
        }
    }

    pub fn authorizer(&self, token_url: &str, http: reqwest::Client) -> DeployResult<Authorizer> {
        match self {
            CredentialSource::ServiceAccount {
                client_email,
                private_key,
            } => Ok(Authorizer::ServiceAccount(ServiceAccount::new(
                client_email.clone(),
                private_key,
                token_url,
                http,
            )?)),
            CredentialSource::AccessToken(token) => {
                Ok(Authorizer::Static(StaticToken::new(token.clone())?))
            }
        }
    }
}

/// CI secret stores usually flatten PEM keys to a single line with literal
/// `\n` sequences.
pub fn normalize_private_key(key: &str) -> String {
    key.replace("\\n", "\n")
}

/// Service account JSON key as downloaded from the cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> DeployResult<Self> {
        let data = std::fs::read(path).map_err(|e| DeployError::io(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Everything one deploy run needs.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Directory or single file to deploy
    pub source: PathBuf,
    /// Hosting site id
    pub site: String,
    /// Remote namespace for every collected path
    pub prefix: Option<String>,
    pub credentials: CredentialSource,
    pub api_base: String,
    pub token_url: String,
    /// Per request
    pub timeout: Duration,
    /// Maximum simultaneous uploads
    pub concurrency: usize,
    /// `Cache-Control: max-age` for every file of the new version
    pub cache_max_age: u64,
}

impl DeployConfig {
    pub fn validate(&self) -> DeployResult<()> {
        if self.site.trim().is_empty() {
            return Err(DeployError::Config("site id is empty".to_string()));
        }
        if self.site.contains('/') {
            return Err(DeployError::Config(format!(
                "site id {:?} must not contain '/'",
                self.site
            )));
        }
        if self.concurrency == 0 {
            return Err(DeployError::Config(
                "upload concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(DeployError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

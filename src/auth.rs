use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken as jwt;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

pub const HOSTING_SCOPE: &str = "https://www.googleapis.com/auth/firebase";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Bearer token sent with every hosting API call.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"***").finish()
    }
}

/// Source of the bearer token for a deploy.
#[allow(async_fn_in_trait)]
pub trait TokenProvider {
    async fn access_token(&self) -> DeployResult<AccessToken>;
}

/// A token obtained out of band, e.g. by `firebase login:ci`.
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> DeployResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DeployError::Auth("access token is empty".to_string()));
        }
        Ok(Self(AccessToken::new(token)))
    }
}

impl TokenProvider for StaticToken {
    async fn access_token(&self) -> DeployResult<AccessToken> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Service account authorization: a self-signed RS256 assertion exchanged
/// for an access token at the OAuth token endpoint.
#[derive(Clone)]
pub struct ServiceAccount {
    client_email: String,
    key: jwt::EncodingKey,
    token_url: String,
    http: reqwest::Client,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl ServiceAccount {
    /// Fails right away if the PEM key cannot be parsed.
    pub fn new(
        client_email: impl Into<String>,
        private_key_pem: &str,
        token_url: impl Into<String>,
        http: reqwest::Client,
    ) -> DeployResult<Self> {
        let client_email = client_email.into();
        if client_email.is_empty() {
            return Err(DeployError::Auth("service account email is empty".to_string()));
        }
        Ok(Self {
            client_email,
            key: jwt::EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?,
            token_url: token_url.into(),
            http,
        })
    }

    pub(crate) fn assertion(&self, now: u64) -> DeployResult<String> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: HOSTING_SCOPE.to_string(),
            aud: self.token_url.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME.as_secs(),
        };
        let header = jwt::Header::new(jwt::Algorithm::RS256);
        Ok(jwt::encode(&header, &claims, &self.key)?)
    }
}

impl TokenProvider for ServiceAccount {
    async fn access_token(&self) -> DeployResult<AccessToken> {
        // Sign a fresh assertion
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DeployError::Auth(e.to_string()))?
            .as_secs();
        let assertion = self.assertion(now)?;

        // Exchange it for an access token
        log::debug!("Requesting access token for {}", self.client_email);
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeployError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        // Parse the token response
        let token = resp.json::<TokenResponse>().await?;
        if token.access_token.is_empty() {
            return Err(DeployError::Auth("token endpoint returned an empty token".to_string()));
        }
        if let Some(expires_in) = token.expires_in {
            log::debug!("Access token valid for {}s", expires_in);
        }
        Ok(AccessToken::new(token.access_token))
    }
}

/// The token provider picked by the deploy configuration.
#[derive(Debug, Clone)]
pub enum Authorizer {
    ServiceAccount(ServiceAccount),
    Static(StaticToken),
}

impl TokenProvider for Authorizer {
    async fn access_token(&self) -> DeployResult<AccessToken> {
        match self {
            Authorizer::ServiceAccount(account) => account.access_token().await,
            Authorizer::Static(token) => token.access_token().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/service_account_key.pem");
    const PUBLIC_KEY: &str = include_str!("../tests/fixtures/service_account_pub.pem");

    fn account() -> ServiceAccount {
        ServiceAccount::new(
            "deployer@demo.iam.gserviceaccount.com",
            PRIVATE_KEY,
            DEFAULT_TOKEN_URL,
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn assertion_is_signed_rs256() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let token = account().assertion(now).unwrap();

        let header = jwt::decode_header(&token).unwrap();
        assert_eq!(header.alg, jwt::Algorithm::RS256);

        let mut validation = jwt::Validation::new(jwt::Algorithm::RS256);
        validation.set_audience(&[DEFAULT_TOKEN_URL]);
        let key = jwt::DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
        let claims = jwt::decode::<AssertionClaims>(&token, &key, &validation)
            .unwrap()
            .claims;
        assert_eq!(claims.iss, "deployer@demo.iam.gserviceaccount.com");
        assert_eq!(claims.scope, HOSTING_SCOPE);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn invalid_key_fails_early() {
        let err = ServiceAccount::new(
            "deployer@demo.iam.gserviceaccount.com",
            "not a key",
            DEFAULT_TOKEN_URL,
            reqwest::Client::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::Jwt(_)));
    }

    #[test]
    fn secrets_are_not_printed() {
        let printed = format!("{:?} {:?}", account(), AccessToken::new("ya29.secret"));
        assert!(!printed.contains("ya29.secret"));
        assert!(!printed.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn static_token() {
        let provider = StaticToken::new("abc").unwrap();
        assert_eq!(provider.access_token().await.unwrap().secret(), "abc");
        assert!(StaticToken::new("  ").is_err());
    }
}

extern crate log;

use clap::Parser;
use sitedeploy::auth::DEFAULT_TOKEN_URL;
use sitedeploy::client::{HostingClient, DEFAULT_API_BASE};
use sitedeploy::config::{
    CredentialSource, DeployConfig, ServiceAccountKey, DEFAULT_CACHE_MAX_AGE,
};
use sitedeploy::{DeployError, DeployResult, DeploySession};
use std::path::PathBuf;
use std::time::Duration;

/// A static site deploy utility
/// Uploads only the files the hosting service does not hold yet and releases
/// them as a new version of the site
#[derive(Parser)]
#[clap(version, author = "Loukas A. <agorglouk@gmail.com>")]
struct Opts {
    /// Sets the directory (or single file) to deploy
    #[clap(env = "DEPLOY_SOURCE")]
    source: PathBuf,
    /// Sets the hosting site id
    #[clap(long, env = "SITE_ID")]
    site: Option<String>,
    /// Site id fallback used by CI setups
    #[clap(long, env = "PROJECT_ID", hide = true)]
    project_id: Option<String>,
    /// Sets the remote path namespace, e.g. the CI branch
    #[clap(long, env = "DEPLOY_PREFIX")]
    prefix: Option<String>,
    /// Service account email
    #[clap(long, env = "CLIENT_EMAIL")]
    client_email: Option<String>,
    /// Service account PEM private key
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,
    /// Service account JSON key file
    #[clap(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    key_file: Option<PathBuf>,
    /// Pre-obtained bearer token
    #[clap(long, env = "HOSTING_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    /// Cache-Control max-age applied to every file, in seconds
    #[clap(long, default_value_t = DEFAULT_CACHE_MAX_AGE)]
    cache_max_age: u64,
    /// Per request timeout, in seconds
    #[clap(long, default_value_t = 60)]
    timeout: u64,
    /// Maximum number of simultaneous uploads
    #[clap(long, default_value_t = 1)]
    concurrency: usize,
    /// Hosting API base url
    #[clap(long, default_value = DEFAULT_API_BASE)]
    api_base: String,
    /// OAuth token endpoint for service account credentials
    #[clap(long, default_value = DEFAULT_TOKEN_URL)]
    token_url: String,
}

impl Opts {
    fn into_config(self) -> DeployResult<DeployConfig> {
        let key_file = self
            .key_file
            .as_deref()
            .map(ServiceAccountKey::load)
            .transpose()?;

        let site = self
            .site
            .or(self.project_id)
            .or_else(|| key_file.as_ref().and_then(|k| k.project_id.clone()))
            .ok_or_else(|| {
                DeployError::Config("no site id: pass --site or set SITE_ID".to_string())
            })?;

        let credentials = CredentialSource::resolve(
            self.access_token,
            self.client_email,
            self.private_key,
            key_file.as_ref(),
        )?;

        let config = DeployConfig {
            source: self.source,
            site,
            prefix: self.prefix.filter(|p| !p.trim_matches('/').is_empty()),
            credentials,
            api_base: self.api_base,
            token_url: self.token_url,
            timeout: Duration::from_secs(self.timeout),
            concurrency: self.concurrency,
            cache_max_age: self.cache_max_age,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::init_from_env(log_env);

    // Parse command line arguments and deploy
    let opts: Opts = Opts::parse();
    if let Err(e) = deploy(opts).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn deploy(opts: Opts) -> DeployResult<()> {
    let config = opts.into_config()?;
    log::info!("Deploying {:?} to site {}", config.source, config.site);

    let api = HostingClient::new(&config.api_base, config.timeout)?;
    let auth = config.credentials.authorizer(&config.token_url, api.http())?;
    let session = DeploySession::new(&config, api, auth)?;

    let report = session.run().await?;
    log::info!("{}", report);
    Ok(())
}

use std::fmt::Display;

use futures::stream::{self, TryStreamExt};
use pretty_bytes::converter::convert as bytes_pretty;

use crate::auth::{AccessToken, TokenProvider};
use crate::client::HostingApi;
use crate::collector::{FileCollector, LocalEntry};
use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::manifest::{carried_over, diff, UploadPlan, UploadRequiredSet};
use crate::protocol::CreateVersionRequest;

const STEPS: usize = 9;

/// Outcome of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Name of the released version
    pub version: String,
    pub declared: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub uploaded_bytes: usize,
}

impl Display for DeployReport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "Released {}: {} files declared, {} uploaded ({}), {} already stored",
            self.version,
            self.declared,
            self.uploaded,
            bytes_pretty(self.uploaded_bytes as f64),
            self.skipped,
        )
    }
}

/// One deploy of a source tree to a hosting site.
///
/// Every step runs in order and the first failure aborts the session. A
/// version created before the failure is left on the server as is.
#[derive(Debug)]
pub struct DeploySession<A, T> {
    api: A,
    auth: T,
    collector: FileCollector,
    site: String,
    prefix: Option<String>,
    concurrency: usize,
    cache_max_age: u64,
}

impl<A: HostingApi, T: TokenProvider> DeploySession<A, T> {
    pub fn new(config: &DeployConfig, api: A, auth: T) -> DeployResult<Self> {
        config.validate()?;
        Ok(Self {
            api,
            auth,
            collector: FileCollector::new(&config.source),
            site: config.site.clone(),
            prefix: config.prefix.clone(),
            concurrency: config.concurrency,
            cache_max_age: config.cache_max_age,
        })
    }

    /// Collects the source tree and deploys it.
    pub async fn run(&self) -> DeployResult<DeployReport> {
        log::info!("Collecting files from {:?}", self.collector.root());
        let mut local = self.collector.collect()?;
        if let Some(prefix) = &self.prefix {
            local = local.into_iter().map(|e| e.with_prefix(prefix)).collect();
        }
        let bytes: usize = local.iter().map(|e| e.payload.len()).sum();
        log::info!(
            "Collected {} files ({} compressed)",
            local.len(),
            bytes_pretty(bytes as f64)
        );

        self.deploy(&local).await
    }

    /// Deploys already collected entries.
    pub async fn deploy(&self, local: &[LocalEntry]) -> DeployResult<DeployReport> {
        let token = self.auth.access_token().await?;
        log::info!("step 1/{} access token acquired", STEPS);

        let latest = self.api.latest_version(&token, &self.site).await?;
        match &latest {
            Some(version) => log::info!("step 2/{} live version is {}", STEPS, version),
            None => log::info!("step 2/{} site {} has no release yet", STEPS, self.site),
        }

        let remote = match &latest {
            Some(version) => self.api.version_files(&token, version).await?,
            None => Vec::new(),
        };
        log::info!("step 3/{} {} files currently deployed", STEPS, remote.len());

        let request = CreateVersionRequest::with_max_age(self.cache_max_age);
        let version = self.api.create_version(&token, &self.site, &request).await?;
        log::info!("step 4/{} created version {}", STEPS, version);

        let declared = diff(local, &remote);
        let carried = carried_over(&declared, local);
        log::info!(
            "step 5/{} declaring {} files ({} local, {} carried over)",
            STEPS,
            declared.len(),
            declared.len() - carried,
            carried
        );

        let populated = self.api.populate_files(&token, &version, &declared).await?;
        let required: UploadRequiredSet = populated.upload_required_hashes.into_iter().collect();
        let plan = UploadPlan::new(local, &required)?;
        log::info!(
            "step 6/{} {} files need to be uploaded",
            STEPS,
            plan.uploads.len()
        );

        for entry in &plan.skipped {
            log::debug!("No need to upload {}", entry.path);
        }
        if !plan.uploads.is_empty() {
            let upload_url = populated.upload_url.ok_or_else(|| DeployError::InvalidResponse {
                step: "populateFiles",
                message: "uploads required but no upload url given".to_string(),
            })?;
            self.upload_all(&token, &upload_url, &plan).await?;
        }
        log::info!("step 7/{} uploads finished", STEPS);

        self.api.finalize(&token, &version).await?;
        log::info!("step 8/{} version {} finalized", STEPS, version);

        self.api.release(&token, &self.site, &version).await?;
        log::info!("step 9/{} version {} released", STEPS, version);

        Ok(DeployReport {
            declared: declared.len(),
            uploaded: plan.uploads.len(),
            skipped: plan.skipped.len(),
            uploaded_bytes: plan.upload_bytes(),
            version,
        })
    }

    async fn upload_all(
        &self,
        token: &AccessToken,
        upload_url: &str,
        plan: &UploadPlan<'_>,
    ) -> DeployResult<()> {
        let api = &self.api;
        stream::iter(plan.uploads.iter().copied().map(Ok::<_, DeployError>))
            .try_for_each_concurrent(self.concurrency, move |entry| async move {
                api.upload(token, upload_url, entry).await?;
                log::info!(
                    "Uploaded {} ({})",
                    entry.path,
                    bytes_pretty(entry.payload.len() as f64)
                );
                Ok(())
            })
            .await
    }
}

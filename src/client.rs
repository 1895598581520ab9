use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Response;
use url::Url;

use crate::auth::AccessToken;
use crate::collector::LocalEntry;
use crate::error::{DeployError, DeployResult};
use crate::manifest::{DeclaredFileSet, RemoteEntry};
use crate::protocol::{
    CreateVersionRequest, PopulateFilesRequest, PopulateFilesResponse, ReleaseList, StatusUpdate,
    Version, VersionFileList,
};

pub const DEFAULT_API_BASE: &str = "https://firebasehosting.googleapis.com/v1beta1";

/// The hosting provider operations a deploy needs.
///
/// Versions are addressed by their full resource name
/// (`sites/{site}/versions/{id}`) as returned by the API.
#[allow(async_fn_in_trait)]
pub trait HostingApi {
    /// Version served by the most recent release, `None` for a site that was
    /// never released or whose latest release disabled it.
    async fn latest_version(&self, token: &AccessToken, site: &str)
        -> DeployResult<Option<String>>;

    async fn version_files(
        &self,
        token: &AccessToken,
        version: &str,
    ) -> DeployResult<Vec<RemoteEntry>>;

    /// Returns the name of the new version.
    async fn create_version(
        &self,
        token: &AccessToken,
        site: &str,
        request: &CreateVersionRequest,
    ) -> DeployResult<String>;

    async fn populate_files(
        &self,
        token: &AccessToken,
        version: &str,
        files: &DeclaredFileSet,
    ) -> DeployResult<PopulateFilesResponse>;

    async fn upload(
        &self,
        token: &AccessToken,
        upload_url: &str,
        entry: &LocalEntry,
    ) -> DeployResult<()>;

    async fn finalize(&self, token: &AccessToken, version: &str) -> DeployResult<()>;

    async fn release(&self, token: &AccessToken, site: &str, version: &str) -> DeployResult<()>;
}

/// REST client for the hosting API.
#[derive(Debug, Clone)]
pub struct HostingClient {
    base: String,
    http: reqwest::Client,
}

impl HostingClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> DeployResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(base, http))
    }

    pub fn with_http(base: impl Into<String>, http: reqwest::Client) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base, http }
    }

    /// The underlying HTTP client, shared with the token provider.
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }

    fn url(&self, resource: &str) -> DeployResult<Url> {
        Ok(Url::parse(&format!("{}/{}", self.base, resource))?)
    }

    async fn check(step: &'static str, resp: Response) -> DeployResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DeployError::Http { step, status, body })
    }
}

impl HostingApi for HostingClient {
    async fn latest_version(
        &self,
        token: &AccessToken,
        site: &str,
    ) -> DeployResult<Option<String>> {
        // Only the newest release matters
        let mut url = self.url(&format!("sites/{}/releases", site))?;
        url.query_pairs_mut().append_pair("pageSize", "1");

        // Make the request
        let resp = self.http.get(url).bearer_auth(token.secret()).send().await?;
        let list = Self::check("getLatestRelease", resp)
            .await?
            .json::<ReleaseList>()
            .await?;

        // A disabled site serves nothing
        Ok(list
            .releases
            .into_iter()
            .next()
            .and_then(|r| r.version)
            .map(|v| v.name))
    }

    async fn version_files(
        &self,
        token: &AccessToken,
        version: &str,
    ) -> DeployResult<Vec<RemoteEntry>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            // Construct request url for the current page
            let mut url = self.url(&format!("{}/files", version))?;
            if let Some(page) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", page);
            }

            // Fetch one page of the listing
            let resp = self.http.get(url).bearer_auth(token.secret()).send().await?;
            let page = Self::check("getVersionFiles", resp)
                .await?
                .json::<VersionFileList>()
                .await?;
            files.extend(page.files.into_iter().map(RemoteEntry::from));

            match page.next_page_token {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    return Err(DeployError::InvalidResponse {
                        step: "getVersionFiles",
                        message: format!("page token {} repeated", next),
                    });
                }
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(files)
    }

    async fn create_version(
        &self,
        token: &AccessToken,
        site: &str,
        request: &CreateVersionRequest,
    ) -> DeployResult<String> {
        // New versions start out with the serving config only
        let url = self.url(&format!("sites/{}/versions", site))?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(request)
            .send()
            .await?;
        let version = Self::check("createVersion", resp)
            .await?
            .json::<Version>()
            .await?;
        if version.name.is_empty() {
            return Err(DeployError::InvalidResponse {
                step: "createVersion",
                message: "version has no name".to_string(),
            });
        }
        Ok(version.name)
    }

    async fn populate_files(
        &self,
        token: &AccessToken,
        version: &str,
        files: &DeclaredFileSet,
    ) -> DeployResult<PopulateFilesResponse> {
        // Declare the complete file set, the backend answers with what it lacks
        let url = self.url(&format!("{}:populateFiles", version))?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&PopulateFilesRequest { files })
            .send()
            .await?;
        Ok(Self::check("populateFiles", resp)
            .await?
            .json::<PopulateFilesResponse>()
            .await?)
    }

    async fn upload(
        &self,
        token: &AccessToken,
        upload_url: &str,
        entry: &LocalEntry,
    ) -> DeployResult<()> {
        // Uploads are addressed by hash under the given url
        let url = Url::parse(&format!(
            "{}/{}",
            upload_url.trim_end_matches('/'),
            entry.hash
        ))?;
        // Content-Length follows from the sized body
        let resp = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(entry.payload.clone())
            .send()
            .await?;
        Self::check("uploadFile", resp).await?;
        Ok(())
    }

    async fn finalize(&self, token: &AccessToken, version: &str) -> DeployResult<()> {
        let mut url = self.url(version)?;
        url.query_pairs_mut().append_pair("update_mask", "status");
        let resp = self
            .http
            .patch(url)
            .bearer_auth(token.secret())
            .json(&StatusUpdate::finalized())
            .send()
            .await?;
        Self::check("finalizeVersion", resp).await?;
        Ok(())
    }

    async fn release(&self, token: &AccessToken, site: &str, version: &str) -> DeployResult<()> {
        let mut url = self.url(&format!("sites/{}/releases", site))?;
        url.query_pairs_mut().append_pair("versionName", version);
        let resp = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .header(CONTENT_LENGTH, "0")
            .send()
            .await?;
        Self::check("releaseVersion", resp).await?;
        Ok(())
    }
}

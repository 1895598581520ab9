use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::manifest::{DeclaredFileSet, RemoteEntry};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseList {
    #[serde(default)]
    pub releases: Vec<Release>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub name: String,
    /// Absent for releases that disable the site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// Full resource name, `sites/{site}/versions/{id}`
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFileList {
    #[serde(default)]
    pub files: Vec<VersionFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionFile {
    pub path: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<VersionFile> for RemoteEntry {
    fn from(file: VersionFile) -> Self {
        RemoteEntry {
            path: file.path,
            hash: file.hash,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVersionRequest {
    pub config: ServingConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServingConfig {
    pub headers: Vec<HeaderRule>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeaderRule {
    pub glob: String,
    pub headers: BTreeMap<String, String>,
}

impl CreateVersionRequest {
    /// Serving config applying one `Cache-Control: max-age` to every file.
    pub fn with_max_age(seconds: u64) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Cache-Control".to_string(), format!("max-age={}", seconds));
        Self {
            config: ServingConfig {
                headers: vec![HeaderRule {
                    glob: "**".to_string(),
                    headers,
                }],
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PopulateFilesRequest<'a> {
    pub files: &'a DeclaredFileSet,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulateFilesResponse {
    #[serde(default)]
    pub upload_required_hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

impl StatusUpdate {
    pub fn finalized() -> Self {
        Self {
            status: "FINALIZED".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_version_body() {
        let body = serde_json::to_value(CreateVersionRequest::with_max_age(1800)).unwrap();
        assert_eq!(
            body,
            json!({
                "config": {
                    "headers": [
                        { "glob": "**", "headers": { "Cache-Control": "max-age=1800" } }
                    ]
                }
            })
        );
    }

    #[test]
    fn populate_files_response_without_uploads() {
        let resp: PopulateFilesResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.upload_required_hashes.is_empty());
        assert!(resp.upload_url.is_none());

        let resp: PopulateFilesResponse = serde_json::from_value(json!({
            "uploadRequiredHashes": ["abc"],
            "uploadUrl": "https://upload.example/v1/files"
        }))
        .unwrap();
        assert_eq!(resp.upload_required_hashes, vec!["abc"]);
        assert_eq!(resp.upload_url.as_deref(), Some("https://upload.example/v1/files"));
    }

    #[test]
    fn release_listing() {
        let list: ReleaseList = serde_json::from_value(json!({
            "releases": [{
                "name": "sites/demo/releases/r1",
                "version": { "name": "sites/demo/versions/v1", "status": "FINALIZED" },
                "type": "DEPLOY"
            }]
        }))
        .unwrap();
        assert_eq!(
            list.releases[0].version.as_ref().map(|v| v.name.as_str()),
            Some("sites/demo/versions/v1")
        );

        let empty: ReleaseList = serde_json::from_str("{}").unwrap();
        assert!(empty.releases.is_empty());
    }

    #[test]
    fn site_disable_release_has_no_version() {
        let list: ReleaseList = serde_json::from_value(json!({
            "releases": [{ "name": "sites/demo/releases/r3", "type": "SITE_DISABLE" }]
        }))
        .unwrap();
        assert_eq!(list.releases[0].name, "sites/demo/releases/r3");
        assert!(list.releases[0].version.is_none());
    }

    #[test]
    fn file_listing_page() {
        let list: VersionFileList = serde_json::from_value(json!({
            "files": [{ "path": "/index.html", "hash": "h1", "status": "ACTIVE" }],
            "nextPageToken": "p2"
        }))
        .unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("p2"));
        let entry: RemoteEntry = list.files[0].clone().into();
        assert_eq!(entry.path, "/index.html");
        assert_eq!(entry.hash, "h1");
    }
}

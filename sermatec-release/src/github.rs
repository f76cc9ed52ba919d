//! Releases kept on GitHub, through the REST API

use crate::error::{ReleaseError, Result};
use crate::release::{prepare_assets, PublishedRelease, ReleaseAsset, ReleaseSpec};
use crate::store::ReleaseStore;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

const API_BASE_URL: &str = "https://api.github.com";
const UPLOADS_BASE_URL: &str = "https://uploads.github.com";
const USER_AGENT: &str = concat!("sermatec-release/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GithubRelease {
    id: u64,
    tag_name: String,
    name: Option<String>,
    #[serde(default)]
    prerelease: bool,
    target_commitish: String,
    html_url: String,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    size: u64,
    /// `sha256:<hex>` on recent API versions
    digest: Option<String>,
}

impl From<GithubRelease> for PublishedRelease {
    fn from(release: GithubRelease) -> Self {
        Self {
            title: release.name.unwrap_or_else(|| release.tag_name.clone()),
            tag: release.tag_name,
            prerelease: release.prerelease,
            commit: release.target_commitish,
            assets: release
                .assets
                .into_iter()
                .map(|asset| ReleaseAsset {
                    name: asset.name,
                    size: asset.size,
                    sha256: asset
                        .digest
                        .and_then(|digest| digest.strip_prefix("sha256:").map(str::to_string)),
                })
                .collect(),
            published_at: release.published_at.unwrap_or_else(Utc::now),
            url: Some(release.html_url),
        }
    }
}

/// Publishes releases of one repository.
///
/// A publish replaces whatever release carries the tag: the commit is
/// resolved to its full id, the tag is moved to it, the old release is
/// deleted, the release is created and the assets are uploaded. The old
/// release is only touched once the tag points at the new commit. If an
/// upload fails the new release is deleted again rather than left without
/// its files.
pub struct GithubReleaseStore {
    client: Client,
    repository: String,
    token: String,
    api_base_url: String,
    uploads_base_url: String,
}

impl GithubReleaseStore {
    /// `repository` is `owner/name`.
    pub fn new(repository: &str, token: &str) -> Result<Self> {
        let valid = repository
            .split_once('/')
            .is_some_and(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            });
        if !valid {
            return Err(ReleaseError::InvalidRepository(repository.to_string()));
        }
        if token.trim().is_empty() {
            return Err(ReleaseError::MissingToken);
        }

        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            repository: repository.to_string(),
            token: token.trim().to_string(),
            api_base_url: API_BASE_URL.to_string(),
            uploads_base_url: UPLOADS_BASE_URL.to_string(),
        })
    }

    /// Points both the API and asset uploads at another server, such as a
    /// GitHub Enterprise instance.
    pub fn with_api_base_url(mut self, url: &str) -> Self {
        let url = url.trim_end_matches('/');
        self.api_base_url = url.to_string();
        self.uploads_base_url = url.to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{path}", self.api_base_url, self.repository)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Full 40 character id of `commit`, which may be abbreviated.
    fn resolve_commit(&self, commit: &str) -> Result<String> {
        if commit.len() == 40 {
            return Ok(commit.to_ascii_lowercase());
        }
        let response = self
            .authorized(self.client.get(self.url(&format!("commits/{commit}"))))
            .send()?;
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Err(ReleaseError::InvalidCommit(commit.to_string()));
        }
        let resolved: GithubCommit = check(response)?.json()?;
        debug!("commit {commit} resolved to {}", resolved.sha);
        Ok(resolved.sha)
    }

    fn find_release(&self, tag: &str) -> Result<Option<GithubRelease>> {
        let response = self
            .authorized(self.client.get(self.url(&format!("releases/tags/{tag}"))))
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response)?.json()?))
    }

    fn delete_release(&self, id: u64) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.url(&format!("releases/{id}"))))
            .send()?;
        check(response)?;
        Ok(())
    }

    fn move_tag(&self, tag: &str, commit: &str) -> Result<()> {
        let response = self
            .authorized(self.client.patch(self.url(&format!("git/refs/tags/{tag}"))))
            .json(&json!({ "sha": commit, "force": true }))
            .send()?;

        // a missing ref is reported as 422 by the update endpoint
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!("tag '{tag}' does not exist yet, creating it");
                let response = self
                    .authorized(self.client.post(self.url("git/refs")))
                    .json(&json!({ "ref": format!("refs/tags/{tag}"), "sha": commit }))
                    .send()?;
                check(response)?;
            }
            _ => {
                check(response)?;
            }
        }
        Ok(())
    }

    fn create_release(&self, spec: &ReleaseSpec, commit: &str) -> Result<GithubRelease> {
        let response = self
            .authorized(self.client.post(self.url("releases")))
            .json(&json!({
                "tag_name": spec.tag,
                "target_commitish": commit,
                "name": spec.title,
                "prerelease": spec.prerelease,
                "draft": false,
            }))
            .send()?;
        Ok(check(response)?.json()?)
    }

    fn upload_asset(&self, release_id: u64, name: &str, path: &Path) -> Result<GithubAsset> {
        let url = format!(
            "{}/repos/{}/releases/{release_id}/assets",
            self.uploads_base_url, self.repository
        );
        let response = self
            .authorized(self.client.post(url))
            .query(&[("name", name)])
            .header(CONTENT_TYPE, content_type(name))
            .body(fs::read(path)?)
            .send()?;
        Ok(check(response)?.json()?)
    }
}

fn content_type(name: &str) -> &'static str {
    if name.ends_with(".zip") {
        "application/zip"
    } else {
        "application/octet-stream"
    }
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response
            .text()
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        return Err(ReleaseError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

impl ReleaseStore for GithubReleaseStore {
    fn publish(
        &mut self,
        spec: &ReleaseSpec,
        commit: &str,
        assets: &[PathBuf],
    ) -> Result<PublishedRelease> {
        let prepared = prepare_assets(&spec.tag, assets)?;
        let commit = self.resolve_commit(commit)?;

        let existing = self.find_release(&spec.tag)?;
        self.move_tag(&spec.tag, &commit)?;
        if let Some(existing) = existing {
            info!("deleting previous release '{}' ({})", spec.tag, existing.id);
            self.delete_release(existing.id)?;
        }

        let created = self.create_release(spec, &commit)?;
        info!("created release '{}' ({})", spec.tag, created.id);

        for (path, asset) in assets.iter().zip(&prepared) {
            if let Err(e) = self.upload_asset(created.id, &asset.name, path) {
                warn!("upload of {} failed, removing release {}", asset.name, created.id);
                if let Err(cleanup) = self.delete_release(created.id) {
                    warn!("could not remove incomplete release {}: {cleanup}", created.id);
                }
                return Err(e);
            }
            info!("uploaded {} ({} bytes)", asset.name, asset.size);
        }

        let mut release = PublishedRelease::from(created);
        release.assets = prepared;
        Ok(release)
    }

    fn get(&self, tag: &str) -> Result<Option<PublishedRelease>> {
        Ok(self.find_release(tag)?.map(PublishedRelease::from))
    }
}

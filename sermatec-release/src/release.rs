//! Release metadata

use crate::error::{ReleaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// What to publish: the rolling development build unless told otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSpec {
    pub tag: String,
    pub title: String,
    pub prerelease: bool,
}

impl Default for ReleaseSpec {
    fn default() -> Self {
        Self {
            tag: "latest".to_string(),
            title: "Development Build".to_string(),
            prerelease: true,
        }
    }
}

/// A file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub size: u64,
    /// Hex SHA-256 of the content, when known
    pub sha256: Option<String>,
}

impl ReleaseAsset {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(Self {
            name: asset_name(path)?,
            size: bytes.len() as u64,
            sha256: Some(format!("{:x}", Sha256::digest(&bytes))),
        })
    }
}

/// A release as stored under its tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRelease {
    pub tag: String,
    pub title: String,
    pub prerelease: bool,
    /// Commit the tag points at
    pub commit: String,
    pub assets: Vec<ReleaseAsset>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PublishedRelease {
    pub fn get_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

pub(crate) fn asset_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ReleaseError::MissingSource(path.to_path_buf()))
}

/// Reads every asset up front so a missing file fails before anything is
/// changed in a store.
pub(crate) fn prepare_assets(tag: &str, paths: &[PathBuf]) -> Result<Vec<ReleaseAsset>> {
    if paths.is_empty() {
        return Err(ReleaseError::NoAssets(tag.to_string()));
    }

    let mut assets: Vec<ReleaseAsset> = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_file() {
            return Err(ReleaseError::MissingSource(path.clone()));
        }
        let asset = ReleaseAsset::from_file(path)?;
        if assets.iter().any(|existing| existing.name == asset.name) {
            return Err(ReleaseError::DuplicateAsset(asset.name));
        }
        assets.push(asset);
    }
    Ok(assets)
}

//! Where releases are kept, keyed by tag

use crate::error::{ReleaseError, Result};
use crate::release::{asset_name, prepare_assets, PublishedRelease, ReleaseSpec};
use chrono::Utc;
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A key-value store of releases keyed by tag.
pub trait ReleaseStore {
    /// Creates or replaces the release under `spec.tag`, pointing it at
    /// `commit` with `assets` as its only files.
    ///
    /// Either the whole new release becomes visible or the store is left as
    /// it was.
    fn publish(
        &mut self,
        spec: &ReleaseSpec,
        commit: &str,
        assets: &[PathBuf],
    ) -> Result<PublishedRelease>;

    fn get(&self, tag: &str) -> Result<Option<PublishedRelease>>;
}

/// Keeps releases in memory, for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryReleaseStore {
    releases: BTreeMap<String, PublishedRelease>,
}

impl InMemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReleaseStore for InMemoryReleaseStore {
    fn publish(
        &mut self,
        spec: &ReleaseSpec,
        commit: &str,
        assets: &[PathBuf],
    ) -> Result<PublishedRelease> {
        let release = PublishedRelease {
            tag: spec.tag.clone(),
            title: spec.title.clone(),
            prerelease: spec.prerelease,
            commit: commit.to_string(),
            assets: prepare_assets(&spec.tag, assets)?,
            published_at: Utc::now(),
            url: None,
        };
        if self.releases.insert(spec.tag.clone(), release.clone()).is_some() {
            info!("replaced release '{}'", spec.tag);
        }
        Ok(release)
    }

    fn get(&self, tag: &str) -> Result<Option<PublishedRelease>> {
        Ok(self.releases.get(tag).cloned())
    }
}

const METADATA_FILE: &str = "release.json";

/// Keeps each release in `<root>/<tag>/`, metadata in `release.json` next
/// to copies of the assets.
///
/// A new release is staged in a hidden sibling directory and renamed into
/// place, so readers see either the old or the new release.
#[derive(Debug, Clone)]
pub struct DirectoryReleaseStore {
    root: PathBuf,
}

impl DirectoryReleaseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the release published under `tag`.
    pub fn release_dir(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }

    fn check_tag(tag: &str) -> Result<()> {
        if tag.is_empty() || tag.starts_with('.') || tag.contains(['/', '\\']) {
            return Err(ReleaseError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{tag}' can't be used as a directory name"),
            )));
        }
        Ok(())
    }
}

impl ReleaseStore for DirectoryReleaseStore {
    fn publish(
        &mut self,
        spec: &ReleaseSpec,
        commit: &str,
        assets: &[PathBuf],
    ) -> Result<PublishedRelease> {
        Self::check_tag(&spec.tag)?;
        let prepared = prepare_assets(&spec.tag, assets)?;
        fs::create_dir_all(&self.root)?;

        let staging = self.root.join(format!(".{}.staging", spec.tag));
        let previous = self.root.join(format!(".{}.previous", spec.tag));
        let target = self.release_dir(&spec.tag);
        for leftover in [&staging, &previous] {
            if leftover.exists() {
                fs::remove_dir_all(leftover)?;
            }
        }

        let release = PublishedRelease {
            tag: spec.tag.clone(),
            title: spec.title.clone(),
            prerelease: spec.prerelease,
            commit: commit.to_string(),
            assets: prepared,
            published_at: Utc::now(),
            url: Some(target.display().to_string()),
        };

        let staged = (|| -> Result<()> {
            fs::create_dir(&staging)?;
            for path in assets {
                fs::copy(path, staging.join(asset_name(path)?))?;
            }
            fs::write(
                staging.join(METADATA_FILE),
                serde_json::to_vec_pretty(&release)?,
            )?;
            Ok(())
        })();
        if let Err(e) = staged {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("could not remove {}: {cleanup}", staging.display());
            }
            return Err(e);
        }

        let replacing = target.exists();
        if replacing {
            fs::rename(&target, &previous)?;
        }
        if let Err(e) = fs::rename(&staging, &target) {
            if replacing {
                fs::rename(&previous, &target)?;
            }
            return Err(e.into());
        }
        if replacing {
            fs::remove_dir_all(&previous)?;
            info!("replaced release '{}'", spec.tag);
        }

        Ok(release)
    }

    fn get(&self, tag: &str) -> Result<Option<PublishedRelease>> {
        Self::check_tag(tag)?;
        let metadata = self.release_dir(tag).join(METADATA_FILE);
        if !metadata.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(metadata)?)?))
    }
}

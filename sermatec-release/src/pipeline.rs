//! The release job: checkout, prepare the archiver, archive, publish

use crate::archive::{create_archive, ArchiveSummary};
use crate::error::{PipelineError, ReleaseError, Result};
use crate::release::{PublishedRelease, ReleaseSpec};
use crate::store::ReleaseStore;
use log::{debug, info};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Checkout,
    PrepareArchiver,
    Archive,
    Publish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Checkout => "checkout",
            Step::PrepareArchiver => "prepare archiver",
            Step::Archive => "archive",
            Step::Publish => "publish",
        })
    }
}

/// A push to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Branch name, with or without the `refs/heads/` prefix.
    pub branch: String,
    pub commit: String,
}

impl PushEvent {
    pub fn new(branch: &str, commit: &str) -> Self {
        Self {
            branch: branch.to_string(),
            commit: commit.to_string(),
        }
    }

    fn branch_name(&self) -> &str {
        self.branch
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.branch)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub trigger_branch: String,
    /// Checkout root; `source` is relative to it.
    pub workspace: PathBuf,
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub archive_name: String,
    pub release: ReleaseSpec,
}

impl PipelineConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            trigger_branch: "master".to_string(),
            source: PathBuf::from("custom_components/sermatec_inverter"),
            output_dir: workspace.clone(),
            archive_name: "sermatec_inverter.zip".to_string(),
            release: ReleaseSpec::default(),
            workspace,
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(&self.archive_name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub commit: String,
    pub steps: Vec<Step>,
    pub archive: ArchiveSummary,
    pub release: PublishedRelease,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// The push was not to the trigger branch, nothing ran.
    Skipped { branch: String },
    Published(PipelineReport),
}

pub struct Pipeline<S: ReleaseStore> {
    config: PipelineConfig,
    store: S,
}

impl<S: ReleaseStore> Pipeline<S> {
    pub fn new(config: PipelineConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs every step in order and stops at the first failure.
    pub fn run(&mut self, event: &PushEvent) -> std::result::Result<PipelineOutcome, PipelineError> {
        if event.branch_name() != self.config.trigger_branch {
            info!(
                "push to '{}' does not trigger a release (only '{}' does)",
                event.branch_name(),
                self.config.trigger_branch
            );
            return Ok(PipelineOutcome::Skipped {
                branch: event.branch_name().to_string(),
            });
        }

        let mut steps = Vec::new();

        let commit = self.step(Step::Checkout, &mut steps, |pipeline| {
            pipeline.checkout(&event.commit)
        })?;
        self.step(Step::PrepareArchiver, &mut steps, |pipeline| {
            pipeline.prepare_archiver()
        })?;
        let archive = self.step(Step::Archive, &mut steps, |pipeline| {
            create_archive(
                &pipeline.config.workspace,
                &pipeline.config.source,
                &pipeline.config.archive_path(),
            )
        })?;
        let release = self.step(Step::Publish, &mut steps, |pipeline| {
            pipeline
                .store
                .publish(&pipeline.config.release, &commit, &[archive.path.clone()])
        })?;

        info!(
            "published '{}' ({}) at {commit}",
            release.tag, release.title
        );
        Ok(PipelineOutcome::Published(PipelineReport {
            commit,
            steps,
            archive,
            release,
        }))
    }

    fn step<T>(
        &mut self,
        step: Step,
        steps: &mut Vec<Step>,
        action: impl FnOnce(&mut Self) -> Result<T>,
    ) -> std::result::Result<T, PipelineError> {
        info!("step: {step}");
        let value = action(self).map_err(|source| PipelineError { step, source })?;
        steps.push(step);
        Ok(value)
    }

    fn checkout(&self, commit: &str) -> Result<String> {
        let commit = commit.trim();
        let valid = (7..=40).contains(&commit.len()) && commit.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ReleaseError::InvalidCommit(commit.to_string()));
        }

        let workspace = &self.config.workspace;
        if !workspace.exists() {
            return Err(ReleaseError::MissingSource(workspace.clone()));
        }
        if !workspace.is_dir() {
            return Err(ReleaseError::NotADirectory(workspace.clone()));
        }
        debug!("workspace {} at {commit}", workspace.display());
        Ok(commit.to_ascii_lowercase())
    }

    fn prepare_archiver(&self) -> Result<()> {
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir)?;
        check_writable(output_dir)?;

        let archive = self.config.archive_path();
        if archive.exists() {
            debug!("removing stale {}", archive.display());
            fs::remove_file(&archive)?;
        }
        Ok(())
    }
}

fn check_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(".sermatec-release-probe");
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)?;
    fs::remove_file(probe)?;
    Ok(())
}

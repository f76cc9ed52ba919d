//! Packages the Home Assistant component and publishes it as the rolling
//! development release.

pub mod archive;
pub mod error;
pub mod github;
pub mod pipeline;
pub mod release;
pub mod store;

pub use error::{PipelineError, ReleaseError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, PushEvent, Step};
pub use release::{PublishedRelease, ReleaseSpec};
pub use store::{DirectoryReleaseStore, InMemoryReleaseStore, ReleaseStore};

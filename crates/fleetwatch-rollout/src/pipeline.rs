//! Pipeline status: the single process-wide deployment indicator.

use serde::{Deserialize, Serialize};

/// Status of the deployment pipeline as a whole.
///
/// With overlapping deployments the most recent transition wins: a
/// completion flips the pipeline to `Success` even if another deployment
/// is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    InProgress,
    /// Nothing running. Also the state before any deployment.
    #[default]
    Success,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

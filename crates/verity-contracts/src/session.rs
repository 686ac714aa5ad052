use serde::{Deserialize, Serialize};

use crate::image::EncodedImage;
use crate::report::ReportBlock;

/// The single live session value. Every phase of the pipeline is one variant,
/// so impossible combinations (loading and failed at once, a report without
/// an image) cannot be represented. Transitions replace the whole value;
/// readers work from cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Bootstrapping,
    Ready {
        image: EncodedImage,
        blocks: Vec<ReportBlock>,
    },
    Analyzing {
        image: EncodedImage,
    },
    Failed {
        image: Option<EncodedImage>,
        message: String,
    },
}

impl SessionState {
    pub fn phase(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Bootstrapping => "bootstrapping",
            SessionState::Ready { .. } => "ready",
            SessionState::Analyzing { .. } => "analyzing",
            SessionState::Failed { .. } => "failed",
        }
    }

    /// The image the session is currently holding, if any. `Failed` keeps the
    /// last image around so a retry needs no re-upload.
    pub fn image(&self) -> Option<&EncodedImage> {
        match self {
            SessionState::Ready { image, .. } | SessionState::Analyzing { image } => Some(image),
            SessionState::Failed { image, .. } => image.as_ref(),
            SessionState::Idle | SessionState::Bootstrapping => None,
        }
    }

    pub fn blocks(&self) -> Option<&[ReportBlock]> {
        match self {
            SessionState::Ready { blocks, .. } => Some(blocks.as_slice()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }
}

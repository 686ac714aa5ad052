use serde::{Deserialize, Serialize};

pub const DEFAULT_ANALYSIS_PROMPT: &str = "Analyze this image and determine if it's AI-generated or a real photograph. Provide a detailed analysis including: 1) Overall assessment with confidence percentage, 2) Technical analysis of textures, inconsistencies, lighting, and composition, 3) Specific telltale signs of AI generation or authenticity, 4) Additional observations about the image content, and 5) A final conclusion. Format your response as markdown with appropriate headings and bullet points.";

/// Instruction handed to the inference service alongside the image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPrompt {
    text: String,
}

impl AnalysisPrompt {
    /// A caller-supplied override; blank input falls back to the default.
    pub fn custom(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self {
                text: trimmed.to_string(),
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for AnalysisPrompt {
    fn default() -> Self {
        Self {
            text: DEFAULT_ANALYSIS_PROMPT.to_string(),
        }
    }
}

/// Unparsed report text as returned by the service or the bundled sample.
/// Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport(String);

impl RawReport {
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The encoded form carried no extractable payload; detected locally
    /// before any request is dispatched.
    MalformedImageData,
    /// The service answered but reported failure or produced no usable text.
    Service(String),
    /// The request never completed (connect, timeout, dispatch).
    Transport(String),
}

impl AnalysisError {
    pub fn service(detail: impl Into<String>) -> Self {
        AnalysisError::Service(detail.into())
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        AnalysisError::Transport(detail.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, AnalysisError::Transport(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::MalformedImageData => "Invalid image data format".to_string(),
            AnalysisError::Service(detail) => format!("Failed to analyze image: {detail}"),
            AnalysisError::Transport(_) => {
                "Failed to analyze image. Please try again.".to_string()
            }
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::MalformedImageData => {
                write!(f, "image payload is not extractable from its encoded form")
            }
            AnalysisError::Service(detail) => write!(f, "analysis service error: {detail}"),
            AnalysisError::Transport(detail) => write!(f, "analysis transport error: {detail}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

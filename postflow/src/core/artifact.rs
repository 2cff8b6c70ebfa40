//! References to media produced by collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Still image.
    Image,
    /// Video clip, with or without an audio track.
    Video,
    /// Audio track.
    Audio,
    /// Plain text.
    Text,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Opaque handle to a generated file or remote object.
///
/// The orchestrator never opens artifacts itself; it only passes these
/// references between generators, the media editor and the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Location understood by the collaborators (path, URL, object key).
    pub uri: String,
    /// Content kind.
    pub kind: ArtifactKind,
    /// Duration in seconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl ArtifactRef {
    /// Creates a new reference.
    #[must_use]
    pub fn new(uri: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            uri: uri.into(),
            kind,
            duration: None,
        }
    }

    /// Creates an image reference.
    #[must_use]
    pub fn image(uri: impl Into<String>) -> Self {
        Self::new(uri, ArtifactKind::Image)
    }

    /// Creates a video reference.
    #[must_use]
    pub fn video(uri: impl Into<String>) -> Self {
        Self::new(uri, ArtifactKind::Video)
    }

    /// Creates an audio reference.
    #[must_use]
    pub fn audio(uri: impl Into<String>) -> Self {
        Self::new(uri, ArtifactKind::Audio)
    }

    /// Attaches a duration.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Converts to a JSON value for stage payloads.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_constructors() {
        let clip = ArtifactRef::video("s3://clips/1.mp4").with_duration(8.0);
        assert_eq!(clip.kind, ArtifactKind::Video);
        assert_eq!(clip.duration, Some(8.0));
        assert_eq!(clip.to_string(), "video:s3://clips/1.mp4");
    }

    #[test]
    fn test_artifact_value_omits_unknown_duration() {
        let image = ArtifactRef::image("img.png");
        let value = image.to_value();
        assert_eq!(value["kind"], "image");
        assert!(value.get("duration").is_none());
    }
}

//! Playback of the server-stored recording
//!
//! The server stores each upload under a path derived from the session id.
//! Once a session is saved the view switches from the live capture preview
//! to that location. Whether the artifact actually exists is not checked.

use serde::{Deserialize, Serialize};
use url::Url;

/// Where the display surface currently points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlaybackView {
    /// Showing the local capture preview
    #[default]
    LivePreview,
    /// Showing the uploaded artifact with playback controls
    Remote { url: String, controls: bool },
}

impl PlaybackView {
    pub fn is_remote(&self) -> bool {
        matches!(self, PlaybackView::Remote { .. })
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            PlaybackView::Remote { url, .. } => Some(url),
            PlaybackView::LivePreview => None,
        }
    }

    /// Detach the live preview and point at the stored artifact
    pub fn show_remote(&mut self, url: &Url) {
        tracing::info!("Playback switched to {}", url);
        *self = PlaybackView::Remote {
            url: url.to_string(),
            controls: true,
        };
    }
}

/// File name the server gives the upload for `session_id`
pub fn artifact_name(session_id: &str) -> String {
    format!("{}.webm", session_id)
}

/// `<base_url>/static/uploads/<session_id>.webm`
///
/// A trailing slash on `base_url` is optional and any path it carries is
/// kept.
pub fn artifact_url(base_url: &str, session_id: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("static/uploads/{}", artifact_name(session_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_url_from_origin() {
        let url = artifact_url("https://media.example.com:3000", "abc123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://media.example.com:3000/static/uploads/abc123.webm"
        );
    }

    #[test]
    fn test_artifact_url_keeps_base_path() {
        let url = artifact_url("https://example.com/rec/", "x").unwrap();
        assert_eq!(url.as_str(), "https://example.com/rec/static/uploads/x.webm");

        let url = artifact_url("https://example.com/rec", "x").unwrap();
        assert_eq!(url.as_str(), "https://example.com/rec/static/uploads/x.webm");
    }

    #[test]
    fn test_artifact_url_rejects_garbage() {
        assert!(artifact_url("::nope::", "x").is_err());
    }

    #[test]
    fn test_show_remote() {
        let mut view = PlaybackView::default();
        assert!(!view.is_remote());
        assert!(view.remote_url().is_none());

        let url = artifact_url("https://example.com", "id42").unwrap();
        view.show_remote(&url);
        assert_eq!(
            view,
            PlaybackView::Remote {
                url: "https://example.com/static/uploads/id42.webm".to_string(),
                controls: true,
            }
        );
    }
}

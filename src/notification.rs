//! Desktop notifications
//!
//! - Linux: notify-send (libnotify)
//! - macOS: osascript (AppleScript)
//!
//! Notifications are best-effort. Failures are logged and swallowed.

use crate::error::CaptureError;
use std::process::Stdio;
use tokio::process::Command;
use url::Url;

const APP_NAME: &str = "Recstream";

/// Send a desktop notification with the given title and body
pub async fn send(title: &str, body: &str) {
    #[cfg(target_os = "linux")]
    send_linux(title, body).await;

    #[cfg(target_os = "macos")]
    send_macos(title, body).await;

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::debug!("Notifications not supported on this platform");
        let _ = (title, body);
    }
}

/// Title and body shown when the capture device cannot be used
pub fn device_failure(err: &CaptureError) -> (String, String) {
    let body = match err {
        CaptureError::PermissionDenied(_) => {
            "Access to the capture device was denied. Recording is unavailable.".to_string()
        }
        CaptureError::NotSupported(mime) => {
            format!("This device cannot record {}. Recording is unavailable.", mime)
        }
        other => format!("{}. Recording is unavailable.", other),
    };
    ("Capture device error".to_string(), body)
}

/// Title and body shown once the recording is stored on the server
pub fn saved(url: &Url) -> (String, String) {
    ("Recording saved".to_string(), url.to_string())
}

#[cfg(target_os = "linux")]
async fn send_linux(title: &str, body: &str) {
    let app_name = format!("--app-name={}", APP_NAME);
    let result = Command::new("notify-send")
        .args([
            app_name.as_str(),
            "--expire-time=5000",
            title,
            body,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

#[cfg(target_os = "macos")]
async fn send_macos(title: &str, body: &str) {
    let script = format!(
        r#"display notification "{}" with title "{}" subtitle "{}""#,
        escape_applescript(body),
        escape_applescript(title),
        APP_NAME
    );

    let result = Command::new("osascript")
        .args(["-e", &script])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

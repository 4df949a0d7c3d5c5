//! Dimension and content probes for media items.
//!
//! Probes never fail a scrape: any error degrades to `None` dimensions or
//! empty content for the affected item.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::warn;
use url::Url;

use crate::domain::projects::Dimensions;

/// Decode image dimensions from the leading bytes of the payload.
///
/// `imagesize` reads headers only, so partial or truncated downloads still
/// resolve as long as the header is intact.
pub fn image_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let size = imagesize::blob_size(bytes).ok()?;
    Some(Dimensions {
        width: u32::try_from(size.width).ok()?,
        height: u32::try_from(size.height).ok()?,
    })
}

/// External stream inspector for video files.
///
/// Invokes `ffprobe` against the media URL and reads the first video
/// stream's geometry from its JSON output. The subprocess carries a hard
/// timeout; expiry is a per-item failure, not an error.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

impl VideoProbe {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    pub async fn dimensions(&self, url: &Url) -> Option<Dimensions> {
        let invocation = Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height")
            .arg("-of")
            .arg("json")
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match tokio::time::timeout(self.timeout, invocation).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(
                    target = "scrape::probe",
                    url = %url,
                    error = %err,
                    "Failed to spawn video probe"
                );
                return None;
            }
            Err(_) => {
                warn!(
                    target = "scrape::probe",
                    url = %url,
                    timeout_secs = self.timeout.as_secs(),
                    "Video probe timed out"
                );
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                target = "scrape::probe",
                url = %url,
                exit_code = output.status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Video probe exited with an error"
            );
            return None;
        }

        parse_probe_output(&output.stdout)
    }
}

/// First video stream's geometry from ffprobe's JSON report. Malformed
/// output or a stream without both axes yields `None`.
fn parse_probe_output(stdout: &[u8]) -> Option<Dimensions> {
    let report: FfprobeOutput = serde_json::from_slice(stdout).ok()?;
    let stream = report.streams.first()?;
    Some(Dimensions {
        width: stream.width?,
        height: stream.height?,
    })
}

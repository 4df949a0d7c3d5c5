//! Canonical project records mirrored from the origin archive.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Media classification derived from a filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Notes,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Notes => "notes",
        }
    }

    /// Classify a filename by its extension, case-insensitively.
    ///
    /// Unrecognized extensions (and extensionless names) yield `None` and
    /// the file is excluded from the media set.
    pub fn classify(filename: &str) -> Option<Self> {
        let extension = filename.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" => Some(MediaKind::Image),
            "mp4" | "mov" | "avi" | "webm" => Some(MediaKind::Video),
            "md" => Some(MediaKind::Notes),
            _ => None,
        }
    }
}

/// Pixel dimensions resolved for an image or video item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// One entry of a project's media folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
    pub filename: String,
    /// Resolved for images and videos; `None` when probing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Raw text for notes items; empty for everything else.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
}

/// The lexicographically first image of a project, used as its preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

/// A credited person as listed in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw `manifest.json` payload. Fields this service does not interpret
/// ride along in `extra` and are passed through to clients unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectManifest {
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub credits: Vec<Credit>,
    /// Accepted as any JSON scalar; the normalizer stringifies it.
    pub date: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized project record served by all read endpoints.
///
/// `id` equals the remote folder name exactly. `date` holds the manifest
/// date reformatted to `YYYY-MM-DD` when parseable, else the original
/// string unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub credits: Vec<Credit>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_image: Option<ImageRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One complete, internally consistent set of project records plus its
/// refresh timestamp. Snapshots are replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub projects: Vec<ProjectRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

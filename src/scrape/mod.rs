//! Origin scraping: directory listings in, normalized project records out.
//!
//! Failure policy: only an unreachable root listing aborts a scrape. A
//! broken manifest drops its project, a broken media listing empties the
//! project's media, and a failed probe degrades a single item.

pub mod client;
pub mod listing;
pub mod probe;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::application::normalize::normalize;
use crate::domain::projects::{MediaItem, MediaKind, ProjectRecord};

pub use client::{FetchError, OriginClient};
pub use probe::VideoProbe;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The origin root listing could not be fetched or read. This is the
    /// only fatal scrape failure; everything below it degrades per item.
    #[error("origin unavailable: {reason}")]
    OriginUnavailable { reason: String },
}

impl ScrapeError {
    fn origin(reason: impl Into<String>) -> Self {
        Self::OriginUnavailable {
            reason: reason.into(),
        }
    }
}

/// Seam between the staleness controller and the live origin, so tests can
/// substitute a canned source.
#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn scrape(&self) -> Result<Vec<ProjectRecord>, ScrapeError>;
}

/// Full scrape pass over the origin archive.
pub struct OriginScraper {
    client: OriginClient,
    video_probe: VideoProbe,
    image_concurrency: usize,
}

impl OriginScraper {
    pub fn new(client: OriginClient, video_probe: VideoProbe, image_concurrency: usize) -> Self {
        Self {
            client,
            video_probe,
            image_concurrency: image_concurrency.max(1),
        }
    }

    /// Resolve one project folder, or `None` when its manifest is
    /// unreachable or invalid (all-or-nothing per project).
    async fn collect_project(&self, folder: &str) -> Option<ProjectRecord> {
        let manifest = match self.client.manifest(folder).await {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(
                    target = "scrape",
                    project = folder,
                    error = %err,
                    "Manifest unavailable; skipping project"
                );
                return None;
            }
        };

        let media = self.collect_media(folder).await;
        let mut record = normalize(folder, manifest, media);
        self.backfill_primary_dimensions(&mut record).await;
        Some(record)
    }

    /// Resolve a project's media folder. Any listing failure keeps the
    /// project alive with empty media.
    async fn collect_media(&self, folder: &str) -> Vec<MediaItem> {
        let html = match self.client.media_listing(folder).await {
            Ok(html) => html,
            Err(err) => {
                warn!(
                    target = "scrape",
                    project = folder,
                    error = %err,
                    "Media listing unavailable; keeping project without media"
                );
                return Vec::new();
            }
        };

        let files = match listing::media_files(&html) {
            Ok(files) => files,
            Err(err) => {
                warn!(
                    target = "scrape",
                    project = folder,
                    error = %err,
                    "Media listing unreadable; keeping project without media"
                );
                return Vec::new();
            }
        };

        let mut classified = listing::classify_files(files);
        classified.sort_by(|a, b| a.0.cmp(&b.0));

        let mut images = Vec::new();
        let mut videos = Vec::new();
        let mut notes = Vec::new();
        for (filename, kind) in classified {
            match kind {
                MediaKind::Image => images.push(filename),
                MediaKind::Video => videos.push(filename),
                MediaKind::Notes => notes.push(filename),
            }
        }

        // Image bytes are the memory-heavy part of a pass; bound how many
        // are in flight at once. Output order is restored by the
        // normalizer's filename sort.
        let mut items: Vec<MediaItem> = stream::iter(images)
            .map(|filename| self.image_item(folder, filename))
            .buffered(self.image_concurrency)
            .collect()
            .await;

        for filename in videos {
            items.push(self.video_item(folder, filename).await);
        }
        for filename in notes {
            items.push(self.notes_item(folder, filename).await);
        }

        items
    }

    async fn image_item(&self, folder: &str, filename: String) -> MediaItem {
        let url = self.item_url(folder, &filename);
        let dimensions = match &url {
            Some(url) => match self.client.fetch_bytes(url.clone()).await {
                Ok(bytes) => probe::image_dimensions(&bytes),
                Err(err) => {
                    warn!(
                        target = "scrape",
                        project = folder,
                        file = %filename,
                        error = %err,
                        "Image fetch failed; keeping item without dimensions"
                    );
                    None
                }
            },
            None => None,
        };

        MediaItem {
            url: self.url_string(url, folder, &filename),
            kind: MediaKind::Image,
            filename,
            dimensions,
            content: String::new(),
        }
    }

    async fn video_item(&self, folder: &str, filename: String) -> MediaItem {
        let url = self.item_url(folder, &filename);
        let dimensions = match &url {
            Some(url) => self.video_probe.dimensions(url).await,
            None => None,
        };

        MediaItem {
            url: self.url_string(url, folder, &filename),
            kind: MediaKind::Video,
            filename,
            dimensions,
            content: String::new(),
        }
    }

    async fn notes_item(&self, folder: &str, filename: String) -> MediaItem {
        let url = self.item_url(folder, &filename);
        let content = match &url {
            Some(url) => match self.client.fetch_text(url.clone()).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(
                        target = "scrape",
                        project = folder,
                        file = %filename,
                        error = %err,
                        "Notes fetch failed; keeping item with empty content"
                    );
                    String::new()
                }
            },
            None => String::new(),
        };

        MediaItem {
            url: self.url_string(url, folder, &filename),
            kind: MediaKind::Notes,
            filename,
            dimensions: None,
            content,
        }
    }

    /// Re-probe the primary image when its dimensions are still unknown,
    /// keeping the media entry in step.
    async fn backfill_primary_dimensions(&self, record: &mut ProjectRecord) {
        let Some(primary) = record.primary_image.clone() else {
            return;
        };
        if primary.dimensions.is_some() {
            return;
        }
        let Ok(url) = Url::parse(&primary.url) else {
            return;
        };
        let Ok(bytes) = self.client.fetch_bytes(url).await else {
            return;
        };
        let Some(dimensions) = probe::image_dimensions(&bytes) else {
            return;
        };

        if let Some(image) = record.primary_image.as_mut() {
            image.dimensions = Some(dimensions);
        }
        if let Some(item) = record
            .media
            .iter_mut()
            .find(|item| item.filename == primary.filename)
        {
            item.dimensions = Some(dimensions);
        }
    }

    fn item_url(&self, folder: &str, filename: &str) -> Option<Url> {
        match self.client.media_url(folder, filename) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(
                    target = "scrape",
                    project = folder,
                    file = filename,
                    error = %err,
                    "Could not build media url"
                );
                None
            }
        }
    }

    fn url_string(&self, url: Option<Url>, folder: &str, filename: &str) -> String {
        match url {
            Some(url) => url.to_string(),
            None => format!("{}{folder}/media/{filename}", self.client.base()),
        }
    }
}

#[async_trait]
impl ProjectSource for OriginScraper {
    async fn scrape(&self) -> Result<Vec<ProjectRecord>, ScrapeError> {
        let html = self
            .client
            .root_listing()
            .await
            .map_err(|err| ScrapeError::origin(err.to_string()))?;

        let folders = listing::project_folders(&html)
            .map_err(|err| ScrapeError::origin(format!("root listing unreadable: {err}")))?;

        debug!(
            target = "scrape",
            candidates = folders.len(),
            "Scrape pass started"
        );

        let mut projects = Vec::with_capacity(folders.len());
        for folder in &folders {
            if let Some(record) = self.collect_project(folder).await {
                projects.push(record);
            }
        }

        debug!(
            target = "scrape",
            projects = projects.len(),
            "Scrape pass finished"
        );

        Ok(projects)
    }
}

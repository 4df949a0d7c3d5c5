//! Share card composition and its derived disk cache.
//!
//! Cards are 1200×630 JPEG composites of project primary images, laid out
//! on a fixed grid. Rendered cards are cached on disk keyed by scope and
//! cleared whenever the project snapshot is replaced, so cards never
//! outlive the data they were built from.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage, imageops};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::application::filters::{by_person, by_tag, sort_by_date};
use crate::domain::projects::{MediaKind, ProjectRecord};
use crate::scrape::OriginClient;

pub const CANVAS_WIDTH: u32 = 1200;
pub const CANVAS_HEIGHT: u32 = 630;
pub const JPEG_QUALITY: u8 = 85;

/// Largest grid is 3×2.
const MAX_TILES: usize = 6;
/// Tiles for narrow scopes (single tag, person or project).
const SCOPED_TILES: usize = 4;

const CANVAS_FILL: Rgb<u8> = Rgb([16, 16, 16]);

#[derive(Debug, Error)]
pub enum ShareError {
    /// The scope resolves to zero usable images. A client error.
    #[error("no share images available for this scope")]
    NoImages,
    #[error("share card encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which slice of the collection a card represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareScope {
    Homepage,
    Space,
    Project(String),
    Tag(String),
    Person(String),
}

impl ShareScope {
    /// Parse the `/share/{scope}` and `/share/{scope}/{key}` path shapes.
    pub fn from_parts(scope: &str, key: Option<&str>) -> Option<Self> {
        match (scope, key) {
            ("homepage", None) => Some(ShareScope::Homepage),
            ("space", None) => Some(ShareScope::Space),
            ("project", Some(id)) => Some(ShareScope::Project(id.to_string())),
            ("tag", Some(tag)) => Some(ShareScope::Tag(tag.to_string())),
            ("person", Some(name)) => Some(ShareScope::Person(name.to_string())),
            _ => None,
        }
    }

    /// Stable file stem for the disk cache. Free-form identifiers are
    /// hashed so they never have to be safe filenames themselves.
    pub fn cache_stem(&self) -> String {
        match self {
            ShareScope::Homepage => "homepage".to_string(),
            ShareScope::Space => "space".to_string(),
            ShareScope::Project(id) => format!("project-{}", digest(id)),
            ShareScope::Tag(tag) => format!("tag-{}", digest(&tag.to_lowercase())),
            ShareScope::Person(name) => format!("person-{}", digest(&name.to_lowercase())),
        }
    }
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut encoded = hex::encode(hasher.finalize());
    encoded.truncate(16);
    encoded
}

/// Grid shape for a tile count: 1×1, 2×1, 2×2, then 3×2.
fn grid_for(count: usize) -> (u32, u32) {
    match count {
        0 | 1 => (1, 1),
        2 => (2, 1),
        3 | 4 => (2, 2),
        _ => (3, 2),
    }
}

/// Composite tiles onto the share canvas: cover-fit with center crop per
/// cell, JPEG at quality 85.
pub fn compose(images: &[DynamicImage]) -> Result<Vec<u8>, ShareError> {
    if images.is_empty() {
        return Err(ShareError::NoImages);
    }

    let (cols, rows) = grid_for(images.len());
    let cell_width = CANVAS_WIDTH / cols;
    let cell_height = CANVAS_HEIGHT / rows;

    let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, CANVAS_FILL);
    for (index, image) in images.iter().take((cols * rows) as usize).enumerate() {
        let col = index as u32 % cols;
        let row = index as u32 / cols;
        let tile = image
            .resize_to_fill(cell_width, cell_height, FilterType::Lanczos3)
            .to_rgb8();
        imageops::replace(
            &mut canvas,
            &tile,
            i64::from(col * cell_width),
            i64::from(row * cell_height),
        );
    }

    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
    encoder.encode_image(&canvas)?;
    Ok(encoded)
}

/// Disk cache of rendered cards, one JPEG per scope.
pub struct ShareCardCache {
    root: PathBuf,
}

impl ShareCardCache {
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, scope: &ShareScope) -> PathBuf {
        self.root.join(format!("{}.jpg", scope.cache_stem()))
    }

    pub async fn get(&self, scope: &ShareScope) -> Option<Bytes> {
        match fs::read(self.path_for(scope)).await {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(
                    target = "application::share",
                    error = %err,
                    "Cached share card unreadable; re-rendering"
                );
                None
            }
        }
    }

    pub async fn put(&self, scope: &ShareScope, bytes: &Bytes) -> Result<(), std::io::Error> {
        let path = self.path_for(scope);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Drop every cached card. Called when the snapshot is replaced.
    pub async fn clear(&self) {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    target = "application::share",
                    error = %err,
                    "Could not list share card cache for invalidation"
                );
                return;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".jpg") {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(
                        target = "application::share",
                        file = name,
                        error = %err,
                        "Could not invalidate cached share card"
                    );
                }
            }
        }

        debug!(
            target = "application::share",
            removed, "Share card cache invalidated"
        );
    }
}

/// Renders cards on demand: cache lookup, source-image fetch, composition,
/// write-back.
pub struct ShareCardService {
    cache: Arc<ShareCardCache>,
    client: OriginClient,
    homepage_limit: usize,
}

impl ShareCardService {
    pub fn new(cache: Arc<ShareCardCache>, client: OriginClient, homepage_limit: usize) -> Self {
        Self {
            cache,
            client,
            homepage_limit: homepage_limit.clamp(1, MAX_TILES),
        }
    }

    pub async fn card(
        &self,
        scope: &ShareScope,
        projects: &[ProjectRecord],
    ) -> Result<Bytes, ShareError> {
        if let Some(bytes) = self.cache.get(scope).await {
            return Ok(bytes);
        }

        let sources = select_sources(scope, projects, self.homepage_limit);
        if sources.is_empty() {
            return Err(ShareError::NoImages);
        }

        let mut tiles = Vec::with_capacity(sources.len());
        for source in sources.iter().take(MAX_TILES) {
            if let Some(image) = self.fetch_tile(source).await {
                tiles.push(image);
            }
        }
        if tiles.is_empty() {
            return Err(ShareError::NoImages);
        }

        let bytes = Bytes::from(compose(&tiles)?);
        if let Err(err) = self.cache.put(scope, &bytes).await {
            warn!(
                target = "application::share",
                error = %err,
                "Could not persist rendered share card"
            );
        }
        Ok(bytes)
    }

    async fn fetch_tile(&self, source: &str) -> Option<DynamicImage> {
        let url = match Url::parse(source) {
            Ok(url) => url,
            Err(err) => {
                warn!(
                    target = "application::share",
                    url = source,
                    error = %err,
                    "Share card source url invalid; skipping tile"
                );
                return None;
            }
        };

        let bytes = match self.client.fetch_bytes(url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    target = "application::share",
                    url = source,
                    error = %err,
                    "Share card source fetch failed; skipping tile"
                );
                return None;
            }
        };

        match image::load_from_memory(&bytes) {
            Ok(image) => Some(image),
            Err(err) => {
                warn!(
                    target = "application::share",
                    url = source,
                    error = %err,
                    "Share card source undecodable; skipping tile"
                );
                None
            }
        }
    }
}

/// Source image URLs for a scope, widest first.
fn select_sources(scope: &ShareScope, projects: &[ProjectRecord], homepage_limit: usize) -> Vec<String> {
    match scope {
        ShareScope::Homepage => primary_urls(&sort_by_date(projects), homepage_limit),
        ShareScope::Space => primary_urls(&sort_by_date(projects), MAX_TILES),
        ShareScope::Project(id) => projects
            .iter()
            .find(|project| &project.id == id)
            .map(|project| {
                project
                    .media
                    .iter()
                    .filter(|item| item.kind == MediaKind::Image)
                    .take(SCOPED_TILES)
                    .map(|item| item.url.clone())
                    .collect()
            })
            .unwrap_or_default(),
        ShareScope::Tag(tag) => scoped_primary_urls(by_tag(projects, tag)),
        ShareScope::Person(name) => scoped_primary_urls(by_person(projects, name)),
    }
}

fn primary_urls(projects: &[ProjectRecord], limit: usize) -> Vec<String> {
    projects
        .iter()
        .filter_map(|project| project.primary_image.as_ref())
        .map(|image| image.url.clone())
        .take(limit)
        .collect()
}

fn scoped_primary_urls(projects: Vec<&ProjectRecord>) -> Vec<String> {
    projects
        .iter()
        .filter_map(|project| project.primary_image.as_ref())
        .map(|image| image.url.clone())
        .take(SCOPED_TILES)
        .collect()
}

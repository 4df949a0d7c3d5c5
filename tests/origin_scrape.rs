//! End-to-end scrape pass against a local origin fixture.
//!
//! The fixture is a real axum server speaking the origin's directory-listing
//! dialect, so the full chain (listing parse, per-project policy, media
//! classification, probing, normalization) is exercised over actual HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use url::Url;
use vetrina::domain::projects::MediaKind;
use vetrina::scrape::{OriginClient, OriginScraper, ProjectSource, VideoProbe};

const ROOT_LISTING: &str = r#"<html><body><pre>
<a href="../">../</a>
<a href="a/">a/</a>
<a href="b/">b/</a>
<a href="_template/">_template/</a>
</pre></body></html>"#;

const MEDIA_LISTING: &str = r#"<html><body><pre>
<a href="../">../</a>
<a href="notes.md">notes.md</a>
<a href="cover.png">cover.png</a>
<a href="archive.zip">archive.zip</a>
<a href="clip.mp4">clip.mp4</a>
</pre></body></html>"#;

/// Minimal valid PNG header for a 2x3 image; enough for a header probe.
fn tiny_png() -> Vec<u8> {
    let mut png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&2u32.to_be_bytes());
    png.extend_from_slice(&3u32.to_be_bytes());
    png.extend_from_slice(&[8, 2, 0, 0, 0]);
    png.extend_from_slice(&[0, 0, 0, 0]);
    png
}

async fn spawn_origin() -> SocketAddr {
    let manifest = serde_json::json!({
        "title": "Alpha",
        "description": "Fixture project",
        "date": "March 5, 2021",
        "tags": ["Glow"],
        "credits": [{"name": "Ada"}],
        "client": "Acme"
    });

    let router = Router::new()
        .route("/", get(|| async { Html(ROOT_LISTING) }))
        .route(
            "/a/manifest.json",
            get(move || {
                let manifest = manifest.clone();
                async move { axum::Json(manifest) }
            }),
        )
        .route("/a/media/", get(|| async { Html(MEDIA_LISTING) }))
        .route("/a/media/cover.png", get(|| async { tiny_png() }))
        .route("/a/media/notes.md", get(|| async { "fixture notes" }))
        .route("/b/manifest.json", get(|| async { StatusCode::NOT_FOUND }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("fixture binds");
    let addr = listener.local_addr().expect("fixture addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fixture serves");
    });
    addr
}

fn scraper_for(addr: SocketAddr) -> OriginScraper {
    let base = Url::parse(&format!("http://{addr}/")).expect("base url");
    let client = OriginClient::new(base, Duration::from_secs(5)).expect("client builds");
    // A probe binary that cannot exist: video probing must degrade, never fail.
    let probe = VideoProbe::new(
        PathBuf::from("/nonexistent/vetrina-test-ffprobe"),
        Duration::from_secs(1),
    );
    OriginScraper::new(client, probe, 3)
}

#[tokio::test]
async fn scrape_collects_and_normalizes_the_fixture() {
    let addr = spawn_origin().await;
    let scraper = scraper_for(addr);

    let projects = scraper.scrape().await.expect("scrape succeeds");

    // `b` had a broken manifest, `_template` and `..` are excluded.
    assert_eq!(projects.len(), 1);
    let project = &projects[0];
    assert_eq!(project.id, "a");
    assert_eq!(project.title.as_deref(), Some("Alpha"));
    assert_eq!(project.date.as_deref(), Some("2021-03-05"));
    assert_eq!(project.tags, vec!["Glow"]);
    assert_eq!(project.credits[0].name, "Ada");
    assert_eq!(
        project.extra.get("client"),
        Some(&serde_json::Value::from("Acme"))
    );
}

#[tokio::test]
async fn media_is_classified_probed_and_ordered() {
    let addr = spawn_origin().await;
    let scraper = scraper_for(addr);

    let projects = scraper.scrape().await.expect("scrape succeeds");
    let media = &projects[0].media;

    // archive.zip is dropped; the rest sorts lexicographically.
    let names: Vec<&str> = media.iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(names, vec!["clip.mp4", "cover.png", "notes.md"]);

    let video = &media[0];
    assert_eq!(video.kind, MediaKind::Video);
    assert!(video.dimensions.is_none());

    let image = &media[1];
    assert_eq!(image.kind, MediaKind::Image);
    let dims = image.dimensions.expect("image probed");
    assert_eq!((dims.width, dims.height), (2, 3));

    let notes = &media[2];
    assert_eq!(notes.kind, MediaKind::Notes);
    assert_eq!(notes.content, "fixture notes");

    let primary = projects[0].primary_image.as_ref().expect("primary image");
    assert_eq!(primary.filename, "cover.png");
    assert!(primary.dimensions.is_some());
}

#[tokio::test]
async fn dead_origin_is_the_only_fatal_failure() {
    // Nothing is listening on this address.
    let base = Url::parse("http://127.0.0.1:1/").expect("base url");
    let client = OriginClient::new(base, Duration::from_millis(500)).expect("client builds");
    let probe = VideoProbe::new(PathBuf::from("/nonexistent"), Duration::from_secs(1));
    let scraper = OriginScraper::new(client, probe, 3);

    let result = scraper.scrape().await;
    assert!(result.is_err());
}

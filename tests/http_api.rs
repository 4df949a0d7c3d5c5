//! Router-level tests: endpoint shapes, filters, admin auth.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use url::Url;
use vetrina::application::share::{ShareCardCache, ShareCardService, ShareScope};
use vetrina::cache::{CacheStore, Clock, ManualClock, RefreshPolicy, StalenessController};
use vetrina::domain::projects::{Credit, ProjectRecord};
use vetrina::infra::http::{AppState, build_router};
use vetrina::scrape::{OriginClient, ProjectSource, ScrapeError};

struct EmptySource;

#[async_trait]
impl ProjectSource for EmptySource {
    async fn scrape(&self) -> Result<Vec<ProjectRecord>, ScrapeError> {
        Ok(Vec::new())
    }
}

fn record(id: &str, date: Option<&str>, tags: &[&str], credits: &[&str]) -> ProjectRecord {
    ProjectRecord {
        id: id.to_string(),
        title: Some(format!("Project {id}")),
        description: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        credits: credits
            .iter()
            .map(|name| Credit {
                name: name.to_string(),
                extra: Default::default(),
            })
            .collect(),
        date: date.map(|d| d.to_string()),
        media: Vec::new(),
        primary_image: None,
        extra: Default::default(),
    }
}

struct Fixture {
    router: Router,
    share_cache: Arc<ShareCardCache>,
    _dirs: (TempDir, TempDir),
}

async fn fixture(admin_secret: Option<&str>) -> Fixture {
    let cache_dir = TempDir::new().expect("cache dir");
    let share_dir = TempDir::new().expect("share dir");

    let store = Arc::new(CacheStore::new(cache_dir.path().to_path_buf()).expect("store opens"));
    let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH));
    store
        .write_snapshot(
            vec![
                record("older", Some("2020-01-01"), &["Glow"], &["Ada"]),
                record("newer", Some("2023-01-01"), &["glow", "Web"], &["grace"]),
                record("undated", None, &["GLOWING"], &[]),
            ],
            clock.now(),
        )
        .await
        .expect("seed snapshot");

    let controller = Arc::new(StalenessController::new(
        Arc::new(EmptySource) as Arc<dyn ProjectSource>,
        store,
        clock as Arc<dyn Clock>,
        RefreshPolicy::Interval(Duration::from_secs(300)),
    ));

    let share_cache =
        Arc::new(ShareCardCache::new(share_dir.path().to_path_buf()).expect("share cache opens"));
    let client = OriginClient::new(
        Url::parse("http://127.0.0.1:9/").expect("url"),
        Duration::from_millis(100),
    )
    .expect("client builds");
    let share = Arc::new(ShareCardService::new(share_cache.clone(), client, 4));

    let state = AppState {
        controller,
        share,
        admin_secret: admin_secret.map(Arc::<str>::from),
    };

    Fixture {
        router: build_router(state),
        share_cache,
        _dirs: (cache_dir, share_dir),
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes()
        .to_vec();
    (status, body)
}

#[tokio::test]
async fn projects_are_served_date_sorted() {
    let f = fixture(None).await;
    let (status, body) = get(&f.router, "/projects").await;
    assert_eq!(status, StatusCode::OK);

    let projects: Vec<ProjectRecord> = serde_json::from_slice(&body).expect("json body");
    let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "older", "undated"]);
}

#[tokio::test]
async fn project_lookup_hits_and_misses() {
    let f = fixture(None).await;

    let (status, body) = get(&f.router, "/projects/older").await;
    assert_eq!(status, StatusCode::OK);
    let project: ProjectRecord = serde_json::from_slice(&body).expect("json body");
    assert_eq!(project.id, "older");

    let (status, body) = get(&f.router, "/projects/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_slice(&body).expect("json error");
    assert_eq!(error["error"]["code"], "not_found");
}

#[tokio::test]
async fn tag_filter_is_case_insensitive_exact() {
    let f = fixture(None).await;
    let (status, body) = get(&f.router, "/projects/tag/Glow").await;
    assert_eq!(status, StatusCode::OK);

    let projects: Vec<ProjectRecord> = serde_json::from_slice(&body).expect("json body");
    let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
    // GLOWING must not substring-match.
    assert_eq!(ids, vec!["newer", "older"]);
}

#[tokio::test]
async fn person_filter_and_tag_listing() {
    let f = fixture(None).await;

    let (status, body) = get(&f.router, "/projects/person/ADA").await;
    assert_eq!(status, StatusCode::OK);
    let projects: Vec<ProjectRecord> = serde_json::from_slice(&body).expect("json body");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, "older");

    let (status, body) = get(&f.router, "/tags").await;
    assert_eq!(status, StatusCode::OK);
    let tags: Vec<String> = serde_json::from_slice(&body).expect("json body");
    assert_eq!(tags, vec!["GLOWING", "Glow", "Web"]);
}

#[tokio::test]
async fn cached_share_cards_are_served_as_jpeg() {
    let f = fixture(None).await;
    f.share_cache
        .put(
            &ShareScope::Homepage,
            &bytes::Bytes::from_static(b"fake-jpeg-bytes"),
        )
        .await
        .expect("seed card");

    let response = f
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/share/homepage")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("content type"),
        "image/jpeg"
    );

    let (status, _) = get(&f.router, "/share/unknown-scope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A scope with no images is a client error, not a retry.
    let (status, body) = get(&f.router, "/share/tag/ghost-tag").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_slice(&body).expect("json error");
    assert_eq!(error["error"]["code"], "share_input_missing");
}

#[tokio::test]
async fn admin_without_configured_secret_is_a_server_error() {
    let f = fixture(None).await;
    let (status, body) = get(&f.router, "/admin/status").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: serde_json::Value = serde_json::from_slice(&body).expect("json error");
    assert_eq!(error["error"]["code"], "admin_not_configured");
}

#[tokio::test]
async fn admin_requires_the_exact_secret() {
    let f = fixture(Some("s3cret")).await;

    let (status, _) = get(&f.router, "/admin/status").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = f
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/status")
                .header("x-admin-secret", "wrong")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = f
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/status")
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let status: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(status["projects"], 3);
    assert_eq!(status["refreshing"], false);
}

#[tokio::test]
async fn forced_refresh_runs_through_the_admin_surface() {
    let f = fixture(Some("s3cret")).await;

    let response = f
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/refresh")
                .header("x-admin-secret", "s3cret")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let refreshed: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(refreshed["outcome"], "refreshed");
    // EmptySource replaced the seeded snapshot with an empty one.
    assert_eq!(refreshed["projects"], 0);
}

use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use vetrina::{
    application::error::AppError,
    application::share::{ShareCardCache, ShareCardService},
    cache::{CacheStore, Clock, StalenessController, SystemClock},
    config,
    infra::{
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
    scrape::{OriginClient, OriginScraper, ProjectSource, VideoProbe},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let _command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;
    run_serve(settings).await
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_application_state(&settings)?;

    if settings.cache.warmup_on_startup {
        info!(target = "vetrina::serve", "Scheduling startup cache warmup");
        state.controller.schedule_refresh();
    }

    serve_http(&settings, state).await
}

fn build_application_state(settings: &config::Settings) -> Result<AppState, AppError> {
    let client = OriginClient::new(
        settings.origin.base_url.clone(),
        settings.origin.request_timeout,
    )
    .map_err(|err| AppError::unexpected(format!("failed to build origin client: {err}")))?;

    let video_probe = VideoProbe::new(
        settings.origin.ffprobe_path.clone(),
        settings.origin.probe_timeout,
    );
    let scraper: Arc<dyn ProjectSource> = Arc::new(OriginScraper::new(
        client.clone(),
        video_probe,
        settings.origin.probe_concurrency.get(),
    ));

    let store = Arc::new(
        CacheStore::new(settings.cache.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    let share_cache = Arc::new(
        ShareCardCache::new(settings.share.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    let share = Arc::new(ShareCardService::new(
        share_cache.clone(),
        client,
        settings.share.homepage_limit.get(),
    ));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controller = Arc::new(
        StalenessController::new(scraper, store, clock, settings.cache.policy)
            .with_share_cache(share_cache),
    );

    Ok(AppState {
        controller,
        share,
        admin_secret: settings
            .server
            .admin_secret
            .as_deref()
            .map(Arc::<str>::from),
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    info!(
        target = "vetrina::serve",
        addr = %settings.server.addr,
        origin = %settings.origin.base_url,
        policy = %settings.cache.policy.describe(),
        "Serving"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

//! HTTP surface: public read endpoints plus the privileged admin surface.

pub mod admin;
pub mod error;
pub mod public;

use std::sync::Arc;

use axum::Router;

use crate::application::share::ShareCardService;
use crate::cache::StalenessController;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<StalenessController>,
    pub share: Arc<ShareCardService>,
    /// Shared secret for `/admin`; `None` means the admin surface is
    /// misconfigured and answers with a server-side error.
    pub admin_secret: Option<Arc<str>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/admin", admin::router(state.clone()))
        .with_state(state)
}

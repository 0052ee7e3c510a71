mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::server::handlers::{bids, providers, requests};
use crate::{api::API, auth::DynVerifier, error::Error};

pub type DynAPI = Arc<dyn API + Send + Sync>;

pub fn router(api: DynAPI, verifier: DynVerifier) -> Router {
    Router::new()
        .route("/requests", post(requests::create))
        .route("/requests/active", get(requests::find_active))
        .route("/requests/open", get(requests::list_open))
        .route("/requests/history", get(requests::history))
        .route("/requests/:id", get(requests::find))
        .route("/requests/:id/bids", get(bids::list).post(bids::submit))
        .route("/requests/:id/start", patch(requests::start))
        .route("/requests/:id/complete", patch(requests::complete))
        .route("/requests/:id/cancel", patch(requests::cancel))
        .route("/requests/:id/ratings", post(requests::rate))
        .route("/bids/:id/accept", patch(bids::accept))
        .route("/providers/me/bids/pending", get(providers::pending_bids))
        .route("/providers/me/requests/accepted", get(providers::accepted))
        .route("/providers/me/requests/history", get(providers::history))
        .layer(Extension(api))
        .layer(Extension(verifier))
}

pub async fn serve(api: DynAPI, verifier: DynVerifier, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api, verifier);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(Error::server_error)
}

use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::OpenRequest;
use crate::auth::User;
use crate::entities::{
    CancellationReason, Coordinates, Party, Rating, ServiceKind, ServicePayload, ServiceRequest,
};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    #[serde(flatten)]
    payload: ServicePayload,
    price: f64,
}

#[derive(Serialize, Deserialize)]
pub struct KindParams {
    pub kind: ServiceKind,
}

#[derive(Serialize, Deserialize)]
pub struct OpenParams {
    kind: ServiceKind,
    lat: f64,
    lng: f64,
}

#[derive(Serialize, Deserialize)]
pub struct RateParams {
    score: u8,
    review: Option<String>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<CreateParams>,
) -> Result<Json<ServiceRequest>, Error> {
    let request = api.create_request(user, params.payload, params.price).await?;

    Ok(request.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, Error> {
    let request = api.find_request(user, id).await?;

    Ok(request.into())
}

pub async fn find_active(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<KindParams>,
) -> Result<Json<Option<ServiceRequest>>, Error> {
    let request = api.find_active_request(user, params.kind).await?;

    Ok(request.into())
}

pub async fn history(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<KindParams>,
) -> Result<Json<Vec<ServiceRequest>>, Error> {
    let requests = api
        .list_request_history(user, params.kind, Party::Owner)
        .await?;

    Ok(requests.into())
}

pub async fn list_open(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<OpenParams>,
) -> Result<Json<Vec<OpenRequest>>, Error> {
    let position = Coordinates::new(params.lat, params.lng)?;
    let requests = api
        .list_open_requests_for_provider(user, params.kind, position)
        .await?;

    Ok(requests.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, Error> {
    let request = api.start_request(user, id).await?;

    Ok(request.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, Error> {
    let request = api.complete_request(user, id).await?;

    Ok(request.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(reason): Json<CancellationReason>,
) -> Result<Json<ServiceRequest>, Error> {
    let request = api.cancel_request(user, id, reason).await?;

    Ok(request.into())
}

pub async fn rate(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<RateParams>,
) -> Result<Json<Rating>, Error> {
    let rating = api
        .rate_request(user, id, params.score, params.review)
        .await?;

    Ok(rating.into())
}

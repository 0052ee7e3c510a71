use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Acceptance;
use crate::auth::User;
use crate::entities::Bid;
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct SubmitParams {
    amount: f64,
    message: Option<String>,
}

pub async fn submit(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(request_id): Path<Uuid>,
    Json(params): Json<SubmitParams>,
) -> Result<Json<Bid>, Error> {
    let bid = api
        .submit_bid(user, request_id, params.amount, params.message)
        .await?;

    Ok(bid.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api.list_bids_for_request(user, request_id).await?;

    Ok(bids.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Acceptance>, Error> {
    let acceptance = api.accept_bid(user, id).await?;

    Ok(acceptance.into())
}

use sqlx::{types::Json, Executor, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    entities::{Bid, ServiceRequest},
    error::Error,
};

const UNIQUE_VIOLATION: &str = "23505";

#[tracing::instrument(skip(tx))]
pub async fn fetch_request_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> Result<ServiceRequest, Error> {
    let Json(request): Json<ServiceRequest> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM service_requests WHERE id = $1 FOR UPDATE").bind(id),
        )
        .await?
        .ok_or_else(|| Error::not_found_error("request not found"))?
        .try_get("data")?;

    Ok(request)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_bid_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> Result<Bid, Error> {
    let Json(bid): Json<Bid> = tx
        .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(|| Error::not_found_error("bid not found"))?
        .try_get("data")?;

    Ok(bid)
}

#[tracing::instrument(skip_all, fields(request_id = %request.id, status = %request.status))]
pub async fn update_request(
    tx: &mut Transaction<'_, Postgres>,
    request: &ServiceRequest,
) -> Result<(), Error> {
    debug_assert!(
        request.has_consistent_binding(),
        "provider binding out of step with status {}",
        request.status
    );

    tx.execute(
        sqlx::query(
            "UPDATE service_requests SET status = $2, provider_id = $3, data = $4 WHERE id = $1",
        )
        .bind(&request.id)
        .bind(request.status.name())
        .bind(&request.provider_id)
        .bind(Json(request)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip_all, fields(bid_id = %bid.id))]
pub async fn update_bid(tx: &mut Transaction<'_, Postgres>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE bids SET status = $2, data = $3 WHERE id = $1")
            .bind(&bid.id)
            .bind(bid.status.name())
            .bind(Json(bid)),
    )
    .await?;

    Ok(())
}

/// Rejects every pending bid on the request except `accepted_id`.
#[tracing::instrument(skip(tx))]
pub async fn reject_sibling_bids(
    tx: &mut Transaction<'_, Postgres>,
    request_id: &Uuid,
    accepted_id: &Uuid,
) -> Result<u64, Error> {
    let result = tx
        .execute(
            sqlx::query(
                "
                UPDATE bids
                SET status = 'rejected', data = jsonb_set(data, '{status}', '\"rejected\"')
                WHERE request_id = $1 AND id <> $2 AND status = 'pending'
                ",
            )
            .bind(request_id)
            .bind(accepted_id),
        )
        .await?;

    Ok(result.rows_affected())
}

#[tracing::instrument(skip(tx, request), fields(request_id = %request.id))]
pub async fn record_cancellation(
    tx: &mut Transaction<'_, Postgres>,
    request: &ServiceRequest,
) -> Result<(), Error> {
    let cancellation = match &request.cancellation {
        Some(cancellation) => cancellation,
        None => return Ok(()),
    };

    tx.execute(
        sqlx::query(
            "INSERT INTO cancellations (request_id, cancelled_by, cancelled_at, data) VALUES ($1, $2, $3, $4) ON CONFLICT (request_id) DO NOTHING",
        )
        .bind(&request.id)
        .bind(cancellation.cancelled_by.name())
        .bind(&cancellation.cancelled_at)
        .bind(Json(cancellation)),
    )
    .await?;

    Ok(())
}

/// Maps a unique index violation to a conflict carrying `message`.
pub fn conflict_on_unique_violation(err: sqlx::Error, message: &str) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            tracing::info!("unique violation: {}", db_err.message());
            Error::conflict_error(message)
        }
        _ => Error::from(err),
    }
}

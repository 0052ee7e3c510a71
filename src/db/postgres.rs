use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, Executor, Pool, Postgres, Row};
use uuid::Uuid;

use super::helpers::{
    conflict_on_unique_violation, fetch_bid_for_update, fetch_request_for_update,
    record_cancellation, reject_sibling_bids, update_bid, update_request,
};
use super::{BidAcceptance, RequestMutation, Store};
use crate::{
    entities::{Bid, Party, Rating, ServiceKind, ServiceRequest, Status, TransitionGuard},
    error::Error,
};

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS service_requests (id UUID PRIMARY KEY, kind VARCHAR NOT NULL, owner_id UUID NOT NULL, provider_id UUID, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS service_requests_one_open_per_kind ON service_requests (owner_id, kind) WHERE status IN ('searching', 'bid_received', 'accepted', 'in_progress')")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS service_requests_open_by_kind ON service_requests (kind, created_at) WHERE status IN ('searching', 'bid_received')")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS service_requests_by_provider ON service_requests (provider_id, kind) WHERE provider_id IS NOT NULL")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS bids (id UUID PRIMARY KEY, request_id UUID NOT NULL, provider_id UUID NOT NULL, amount DOUBLE PRECISION NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_bid_request FOREIGN KEY(request_id) REFERENCES service_requests(id) ON DELETE CASCADE)")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS bids_one_accepted_per_request ON bids (request_id) WHERE status = 'accepted'")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS bids_one_pending_per_provider ON bids (request_id, provider_id) WHERE status = 'pending'")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bids_pending_by_provider ON bids (provider_id, created_at) WHERE status = 'pending'")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS cancellations (request_id UUID PRIMARY KEY, cancelled_by VARCHAR NOT NULL, cancelled_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_cancellation_request FOREIGN KEY(request_id) REFERENCES service_requests(id) ON DELETE CASCADE)")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS ratings (request_id UUID NOT NULL, rater_id UUID NOT NULL, ratee_id UUID NOT NULL, score INT2 NOT NULL, data JSONB NOT NULL, PRIMARY KEY (request_id, rater_id, ratee_id), CONSTRAINT fk_rating_request FOREIGN KEY(request_id) REFERENCES service_requests(id) ON DELETE CASCADE)")
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> Pool<Postgres> {
        self.pool.clone()
    }
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip_all, fields(request_id = %request.id))]
    async fn insert_request(&self, request: &ServiceRequest) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO service_requests (id, kind, owner_id, provider_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(&request.id)
                .bind(request.kind().name())
                .bind(&request.owner_id)
                .bind(&request.provider_id)
                .bind(request.status.name())
                .bind(&request.created_at)
                .bind(Json(request)),
        )
        .await
        .map_err(|err| {
            conflict_on_unique_violation(err, "you already have an open request of this kind")
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(
                sqlx::query("SELECT data FROM service_requests WHERE id = $1").bind(&id),
            )
            .await?;

        match maybe_result {
            Some(result) => {
                let Json(request): Json<ServiceRequest> = result.try_get("data")?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn latest_request_for_owner(
        &self,
        owner_id: Uuid,
        kind: ServiceKind,
    ) -> Result<Option<ServiceRequest>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = "
            SELECT data
            FROM service_requests
            WHERE owner_id = $1 AND kind = $2 AND status <> 'cancelled'
            ORDER BY created_at DESC
            LIMIT 1
        ";

        let maybe_result = conn
            .fetch_optional(sqlx::query(query).bind(&owner_id).bind(kind.name()))
            .await?;

        match maybe_result {
            Some(result) => {
                let Json(request): Json<ServiceRequest> = result.try_get("data")?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn open_requests(
        &self,
        kind: ServiceKind,
        provider_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = "
            SELECT
                r.data
            FROM
                service_requests r
            WHERE
                r.kind = $1
                AND r.status IN ('searching', 'bid_received')
                AND r.provider_id IS NULL
                AND NOT EXISTS (
                    SELECT 1 FROM bids b
                    WHERE b.request_id = r.id AND b.provider_id = $2 AND b.status = 'pending'
                )
            ORDER BY
                r.created_at DESC
        ";

        let results = conn
            .fetch_all(sqlx::query(query).bind(kind.name()).bind(&provider_id))
            .await?;

        let mut requests = Vec::with_capacity(results.len());
        for result in results.iter() {
            let Json(request): Json<ServiceRequest> = result.try_get("data")?;
            requests.push(request);
        }

        Ok(requests)
    }

    #[tracing::instrument(skip(self))]
    async fn requests_for_party(
        &self,
        party: Party,
        user_id: Uuid,
        kind: ServiceKind,
        statuses: &[Status],
    ) -> Result<Vec<ServiceRequest>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = match party {
            Party::Owner => {
                "
                SELECT data
                FROM service_requests
                WHERE owner_id = $1 AND kind = $2 AND status = ANY($3)
                ORDER BY created_at DESC
                "
            }
            Party::Provider => {
                "
                SELECT data
                FROM service_requests
                WHERE provider_id = $1 AND kind = $2 AND status = ANY($3)
                ORDER BY created_at DESC
                "
            }
        };

        let statuses: Vec<String> = statuses.iter().map(|s| s.name().to_string()).collect();

        let results = conn
            .fetch_all(
                sqlx::query(query)
                    .bind(&user_id)
                    .bind(kind.name())
                    .bind(&statuses),
            )
            .await?;

        let mut requests = Vec::with_capacity(results.len());
        for result in results.iter() {
            let Json(request): Json<ServiceRequest> = result.try_get("data")?;
            requests.push(request);
        }

        Ok(requests)
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn transition(
        &self,
        id: Uuid,
        guard: &TransitionGuard,
        mutation: RequestMutation<'_>,
    ) -> Result<ServiceRequest, Error> {
        let mut tx = self.pool.begin().await?;

        let mut request = fetch_request_for_update(&mut tx, &id).await?;
        guard.check(request.status)?;

        mutation(&mut request)?;

        update_request(&mut tx, &request).await?;
        record_cancellation(&mut tx, &request).await?;

        tx.commit().await?;

        Ok(request)
    }

    #[tracing::instrument(skip_all, fields(bid_id = %bid.id, request_id = %bid.request_id))]
    async fn insert_bid(
        &self,
        bid: &Bid,
        mutation: RequestMutation<'_>,
    ) -> Result<ServiceRequest, Error> {
        let mut tx = self.pool.begin().await?;

        let mut request = fetch_request_for_update(&mut tx, &bid.request_id).await?;

        mutation(&mut request)?;

        tx.execute(
            sqlx::query("INSERT INTO bids (id, request_id, provider_id, amount, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(&bid.id)
                .bind(&bid.request_id)
                .bind(&bid.provider_id)
                .bind(bid.amount)
                .bind(bid.status.name())
                .bind(&bid.created_at)
                .bind(Json(bid)),
        )
        .await
        .map_err(|err| {
            conflict_on_unique_violation(err, "you already have a pending bid on this request")
        })?;

        update_request(&mut tx, &request).await?;

        tx.commit().await?;

        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    async fn find_bid(&self, id: Uuid) -> Result<Option<Bid>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1").bind(&id))
            .await?;

        match maybe_result {
            Some(result) => {
                let Json(bid): Json<Bid> = result.try_get("data")?;
                Ok(Some(bid))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn pending_bids_for_provider(
        &self,
        provider_id: Uuid,
        kind: ServiceKind,
    ) -> Result<Vec<(Bid, ServiceRequest)>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = "
            SELECT
                b.data AS bid,
                r.data AS request
            FROM
                bids b
                JOIN service_requests r ON r.id = b.request_id
            WHERE
                b.provider_id = $1
                AND b.status = 'pending'
                AND r.kind = $2
                AND r.status IN ('searching', 'bid_received')
                AND r.provider_id IS NULL
            ORDER BY
                b.created_at DESC
        ";

        let results = conn
            .fetch_all(sqlx::query(query).bind(&provider_id).bind(kind.name()))
            .await?;

        let mut bids = Vec::with_capacity(results.len());
        for result in results.iter() {
            let Json(bid): Json<Bid> = result.try_get("bid")?;
            let Json(request): Json<ServiceRequest> = result.try_get("request")?;
            bids.push((bid, request));
        }

        Ok(bids)
    }

    #[tracing::instrument(skip(self))]
    async fn pending_bids(&self, request_id: Uuid) -> Result<Vec<Bid>, Error> {
        let mut conn = self.pool.acquire().await?;

        let results = conn
            .fetch_all(
                sqlx::query("SELECT data FROM bids WHERE request_id = $1 AND status = 'pending' ORDER BY amount ASC, created_at ASC")
                    .bind(&request_id),
            )
            .await?;

        let mut bids = Vec::with_capacity(results.len());
        for result in results.iter() {
            let Json(bid): Json<Bid> = result.try_get("data")?;
            bids.push(bid);
        }

        Ok(bids)
    }

    #[tracing::instrument(skip(self, acceptance))]
    async fn accept_bid(
        &self,
        bid_id: Uuid,
        acceptance: BidAcceptance<'_>,
    ) -> Result<(ServiceRequest, Bid), Error> {
        let mut tx = self.pool.begin().await?;

        // the request row is locked before the bid row, same as every other writer
        let request_id: Uuid = tx
            .fetch_optional(sqlx::query("SELECT request_id FROM bids WHERE id = $1").bind(&bid_id))
            .await?
            .ok_or_else(|| Error::not_found_error("bid not found"))?
            .try_get("request_id")?;

        let mut request = fetch_request_for_update(&mut tx, &request_id).await?;
        let mut bid = fetch_bid_for_update(&mut tx, &bid_id).await?;

        acceptance(&mut request, &mut bid)?;

        let rejected = reject_sibling_bids(&mut tx, &request.id, &bid.id).await?;
        tracing::info!("rejected {} competing bids", rejected);

        update_bid(&mut tx, &bid).await?;
        update_request(&mut tx, &request).await?;

        tx.commit().await?;

        Ok((request, bid))
    }

    #[tracing::instrument(skip_all, fields(request_id = %rating.request_id))]
    async fn insert_rating(&self, rating: &Rating) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO ratings (request_id, rater_id, ratee_id, score, data) VALUES ($1, $2, $3, $4, $5)")
                .bind(&rating.request_id)
                .bind(&rating.rater_id)
                .bind(&rating.ratee_id)
                .bind(rating.score as i16)
                .bind(Json(rating)),
        )
        .await
        .map_err(|err| conflict_on_unique_violation(err, "you have already rated this request"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn has_rated(
        &self,
        request_id: Uuid,
        rater_id: Uuid,
        ratee_id: Uuid,
    ) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;

        let rated: bool = conn
            .fetch_one(
                sqlx::query("SELECT EXISTS (SELECT 1 FROM ratings WHERE request_id = $1 AND rater_id = $2 AND ratee_id = $3) AS rated")
                    .bind(&request_id)
                    .bind(&rater_id)
                    .bind(&ratee_id),
            )
            .await?
            .try_get("rated")?;

        Ok(rated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{fixtures, BidStatus, Status};
    use tokio_test::block_on;

    fn store() -> PgStore {
        let db_uri = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        block_on(PgStore::new(&db_uri, 5)).unwrap()
    }

    #[test]
    #[ignore = "needs a running PostgreSQL at DATABASE_URL"]
    fn accepted_bid_rejects_siblings_in_postgres() {
        let store = store();
        let request = fixtures::ride(Uuid::new_v4());
        block_on(store.insert_request(&request)).unwrap();

        let winner = Bid::new(request.id, Uuid::new_v4(), 7.5, None).unwrap();
        let loser = Bid::new(request.id, Uuid::new_v4(), 8.0, None).unwrap();
        for bid in [&winner, &loser] {
            block_on(store.insert_bid(bid, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
                .unwrap();
        }

        let (request, _) = block_on(store.accept_bid(
            winner.id,
            Box::new(|r: &mut ServiceRequest, b: &mut Bid| r.accept_bid(b)),
        ))
        .unwrap();
        assert_eq!(request.status, Status::Accepted);

        let loser = block_on(store.find_bid(loser.id)).unwrap().unwrap();
        assert_eq!(loser.status, BidStatus::Rejected);

        let err = block_on(store.accept_bid(
            loser.id,
            Box::new(|r: &mut ServiceRequest, b: &mut Bid| r.accept_bid(b)),
        ))
        .unwrap_err();
        assert_eq!(err.message, "bid is no longer available");
    }

    #[test]
    #[ignore = "needs a running PostgreSQL at DATABASE_URL"]
    fn provider_views_follow_the_binding() {
        let store = store();
        let request = fixtures::ride(Uuid::new_v4());
        let provider = Uuid::new_v4();
        block_on(store.insert_request(&request)).unwrap();

        let bid = Bid::new(request.id, provider, 9.0, None).unwrap();
        block_on(store.insert_bid(&bid, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
            .unwrap();

        let pending = block_on(store.pending_bids_for_provider(provider, request.kind())).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.id, bid.id);

        block_on(store.accept_bid(
            bid.id,
            Box::new(|r: &mut ServiceRequest, b: &mut Bid| r.accept_bid(b)),
        ))
        .unwrap();

        let pending = block_on(store.pending_bids_for_provider(provider, request.kind())).unwrap();
        assert!(pending.is_empty());

        let statuses = [Status::Accepted, Status::InProgress];
        let bound = block_on(store.requests_for_party(
            Party::Provider,
            provider,
            request.kind(),
            &statuses,
        ))
        .unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].id, request.id);
    }

    #[test]
    #[ignore = "needs a running PostgreSQL at DATABASE_URL"]
    fn unique_indexes_surface_as_conflicts() {
        let store = store();
        let owner = Uuid::new_v4();
        let request = fixtures::ride(owner);
        block_on(store.insert_request(&request)).unwrap();

        let err = block_on(store.insert_request(&fixtures::ride(owner))).unwrap_err();
        assert!(err.is_conflict_error());

        let provider = Uuid::new_v4();
        let first = Bid::new(request.id, provider, 9.0, None).unwrap();
        let second = Bid::new(request.id, provider, 8.0, None).unwrap();

        block_on(store.insert_bid(&first, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
            .unwrap();
        let err =
            block_on(store.insert_bid(&second, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
                .unwrap_err();
        assert!(err.is_conflict_error());
    }
}

use axum::extract::{Extension, Json, Query};

use crate::api::PendingBid;
use crate::auth::User;
use crate::entities::{Party, ServiceRequest};
use crate::error::Error;
use crate::server::handlers::requests::KindParams;
use crate::server::DynAPI;

pub async fn pending_bids(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<KindParams>,
) -> Result<Json<Vec<PendingBid>>, Error> {
    let bids = api
        .list_pending_bids_for_provider(user, params.kind)
        .await?;

    Ok(bids.into())
}

pub async fn accepted(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<KindParams>,
) -> Result<Json<Vec<ServiceRequest>>, Error> {
    let requests = api
        .list_accepted_requests_for_provider(user, params.kind)
        .await?;

    Ok(requests.into())
}

pub async fn history(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<KindParams>,
) -> Result<Json<Vec<ServiceRequest>>, Error> {
    let requests = api
        .list_request_history(user, params.kind, Party::Provider)
        .await?;

    Ok(requests.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::engine::Engine;
    use crate::entities::{fixtures, ServiceKind, Status};
    use crate::external::LogNotifier;
    use std::sync::Arc;
    use tokio_test::block_on;
    use uuid::Uuid;

    fn rides() -> Query<KindParams> {
        Query(KindParams {
            kind: ServiceKind::Ride,
        })
    }

    #[test]
    fn provider_follows_a_bid_from_pending_to_history() {
        let engine = Engine::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier), 5.0);
        let api: DynAPI = Arc::new(engine.unwrap());
        let (customer, provider) = (User::new(Uuid::new_v4()), User::new(Uuid::new_v4()));

        let request =
            block_on(api.create_request(customer.clone(), fixtures::ride_payload(), 10.0)).unwrap();
        let bid = block_on(api.submit_bid(provider.clone(), request.id, 9.0, None)).unwrap();

        let Json(pending) =
            block_on(pending_bids(Extension(api.clone()), provider.clone(), rides())).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].bid.id, bid.id);

        block_on(api.accept_bid(customer, bid.id)).unwrap();

        let Json(pending) =
            block_on(pending_bids(Extension(api.clone()), provider.clone(), rides())).unwrap();
        assert!(pending.is_empty());

        let Json(bound) =
            block_on(accepted(Extension(api.clone()), provider.clone(), rides())).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].status, Status::Accepted);

        block_on(api.complete_request(provider.clone(), request.id)).unwrap();

        let Json(past) = block_on(history(Extension(api), provider, rides())).unwrap();
        assert_eq!(past.len(), 1);
        assert_eq!(past[0].id, request.id);
    }
}

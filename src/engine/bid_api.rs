use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{Acceptance, BidAPI, PendingBid},
    auth::User,
    entities::{Bid, ServiceKind, ServiceRequest, BIDDABLE},
    error::Error,
};

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self, message))]
    async fn submit_bid(
        &self,
        user: User,
        request_id: Uuid,
        amount: f64,
        message: Option<String>,
    ) -> Result<Bid, Error> {
        let bid = Bid::new(request_id, user.id, amount, message)?;

        self.store
            .insert_bid(
                &bid,
                Box::new(move |request: &mut ServiceRequest| {
                    BIDDABLE.check(request.status)?;
                    self.authorize(user, "bid", request.clone())?;
                    request.receive_bid()
                }),
            )
            .await?;

        tracing::info!(bid_id = %bid.id, "bid submitted");

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids_for_request(&self, user: User, request_id: Uuid) -> Result<Vec<Bid>, Error> {
        let request = self.find_request_or_not_found(request_id).await?;

        self.authorize(user, "list_bids", request)?;

        self.store.pending_bids(request_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, bid_id: Uuid) -> Result<Acceptance, Error> {
        let (request, bid) = self
            .store
            .accept_bid(
                bid_id,
                Box::new(move |request: &mut ServiceRequest, bid: &mut Bid| {
                    bid.ensure_pending()?;
                    self.authorize(user, "accept_bid", request.clone())?;
                    request.accept_bid(bid)
                }),
            )
            .await?;

        tracing::info!(request_id = %request.id, provider_id = %bid.provider_id, "bid accepted");

        let (provider_id, request_id) = (bid.provider_id, request.id);
        self.notify(move |notifier| async move {
            notifier.notify_bid_accepted(provider_id, request_id).await
        });

        Ok(Acceptance { request, bid })
    }

    #[tracing::instrument(skip(self))]
    async fn list_pending_bids_for_provider(
        &self,
        user: User,
        kind: ServiceKind,
    ) -> Result<Vec<PendingBid>, Error> {
        let bids = self
            .store
            .pending_bids_for_provider(user.id, kind)
            .await?
            .into_iter()
            .map(|(bid, request)| PendingBid { bid, request })
            .collect();

        Ok(bids)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{engine, post_ride, user};
    use super::*;
    use crate::api::{LifecycleAPI, RequestAPI};
    use crate::entities::{BidStatus, CancellationReason, Status};
    use tokio_test::block_on;

    #[test]
    fn owner_cannot_bid_on_own_request() {
        let engine = engine();
        let customer = user();

        let request = post_ride(&engine, &customer);

        let err = block_on(engine.submit_bid(customer.clone(), request.id, 9.0, None)).unwrap_err();
        assert!(err.is_forbidden_error());

        let request = block_on(engine.find_request(customer, request.id)).unwrap();
        assert_eq!(request.status, Status::Searching);
    }

    #[test]
    fn duplicate_pending_bid_conflicts() {
        let engine = engine();
        let provider = user();

        let request = post_ride(&engine, &user());

        block_on(engine.submit_bid(provider.clone(), request.id, 9.0, None)).unwrap();
        let err = block_on(engine.submit_bid(provider, request.id, 8.5, None)).unwrap_err();
        assert!(err.is_conflict_error());
    }

    #[test]
    fn bids_are_validated_and_need_a_biddable_request() {
        let engine = engine();
        let customer = user();

        let err = block_on(engine.submit_bid(user(), Uuid::new_v4(), 0.0, None)).unwrap_err();
        assert!(err.is_validation_error());

        let err = block_on(engine.submit_bid(user(), Uuid::new_v4(), 5.0, None)).unwrap_err();
        assert!(err.is_not_found_error());

        let request = post_ride(&engine, &customer);
        block_on(engine.cancel_request(customer, request.id, CancellationReason::ChangedMind))
            .unwrap();

        let err = block_on(engine.submit_bid(user(), request.id, 5.0, None)).unwrap_err();
        assert!(err.is_conflict_error());
        assert_eq!(err.message, "request is no longer accepting bids");
    }

    #[test]
    fn only_the_owner_lists_and_accepts_bids() {
        let engine = engine();
        let (customer, provider, stranger) = (user(), user(), user());

        let request = post_ride(&engine, &customer);
        let bid = block_on(engine.submit_bid(provider.clone(), request.id, 9.0, None)).unwrap();

        let err = block_on(engine.list_bids_for_request(provider.clone(), request.id)).unwrap_err();
        assert!(err.is_forbidden_error());

        let err = block_on(engine.accept_bid(stranger, bid.id)).unwrap_err();
        assert!(err.is_forbidden_error());

        let err = block_on(engine.accept_bid(provider, bid.id)).unwrap_err();
        assert!(err.is_forbidden_error());

        let bids = block_on(engine.list_bids_for_request(customer, request.id)).unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].status, BidStatus::Pending);
    }

    #[test]
    fn concurrent_acceptances_bind_exactly_one_provider() {
        let engine = engine();
        let customer = user();

        let request = post_ride(&engine, &customer);
        let first = block_on(engine.submit_bid(user(), request.id, 8.0, None)).unwrap();
        let second = block_on(engine.submit_bid(user(), request.id, 7.5, None)).unwrap();

        let (a, b) = block_on(async {
            futures::join!(
                engine.accept_bid(customer.clone(), first.id),
                engine.accept_bid(customer.clone(), second.id),
            )
        });

        let outcomes = [a, b];
        let winners: Vec<&Acceptance> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        let losers: Vec<&Error> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();

        assert_eq!(winners.len(), 1);
        assert_eq!(losers.len(), 1);
        assert!(losers[0].is_conflict_error());

        let request = block_on(engine.find_request(customer, request.id)).unwrap();
        assert_eq!(request.provider_id, Some(winners[0].bid.provider_id));
        assert_eq!(request.final_price, Some(winners[0].bid.amount));
    }

    #[test]
    fn concurrent_acceptances_of_the_same_bid() {
        let engine = engine();
        let customer = user();

        let request = post_ride(&engine, &customer);
        let bid = block_on(engine.submit_bid(user(), request.id, 8.0, None)).unwrap();

        let (a, b) = block_on(async {
            futures::join!(
                engine.accept_bid(customer.clone(), bid.id),
                engine.accept_bid(customer.clone(), bid.id),
            )
        });

        assert!(a.is_ok() != b.is_ok());
        let err = a.err().or(b.err()).unwrap();
        assert_eq!(err.message, "bid is no longer available");
    }

    #[test]
    fn provider_pending_bids_drop_once_the_request_is_taken() {
        let engine = engine();
        let (customer, provider, rival) = (user(), user(), user());

        let request = post_ride(&engine, &customer);
        let mine = block_on(engine.submit_bid(provider.clone(), request.id, 9.0, None)).unwrap();
        let theirs = block_on(engine.submit_bid(rival.clone(), request.id, 8.0, None)).unwrap();

        let pending =
            block_on(engine.list_pending_bids_for_provider(provider.clone(), ServiceKind::Ride))
                .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].bid.id, mine.id);
        assert_eq!(pending[0].request.id, request.id);

        let parcels =
            block_on(engine.list_pending_bids_for_provider(provider.clone(), ServiceKind::Parcel))
                .unwrap();
        assert!(parcels.is_empty());

        block_on(engine.accept_bid(customer, theirs.id)).unwrap();

        let pending =
            block_on(engine.list_pending_bids_for_provider(provider, ServiceKind::Ride)).unwrap();
        assert!(pending.is_empty());

        let pending =
            block_on(engine.list_pending_bids_for_provider(rival, ServiceKind::Ride)).unwrap();
        assert!(pending.is_empty());
    }
}

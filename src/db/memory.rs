use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BidAcceptance, RequestMutation, Store};
use crate::entities::{Bid, Party, Rating, ServiceKind, ServiceRequest, Status, TransitionGuard};
use crate::error::Error;

#[derive(Default)]
struct State {
    requests: HashMap<Uuid, ServiceRequest>,
    bids: HashMap<Uuid, Bid>,
    ratings: Vec<Rating>,
}

/// Single-process store. The lock is held for the whole of each operation,
/// which is what makes the mutating calls atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn request(&self, id: &Uuid) -> Result<ServiceRequest, Error> {
        self.requests
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found_error("request not found"))
    }

    fn put_request(&mut self, request: &ServiceRequest) {
        debug_assert!(
            request.has_consistent_binding(),
            "provider binding out of step with status {}",
            request.status
        );

        self.requests.insert(request.id, request.clone());
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[tracing::instrument(skip_all, fields(request_id = %request.id))]
    async fn insert_request(&self, request: &ServiceRequest) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let has_open = state.requests.values().any(|r| {
            r.owner_id == request.owner_id
                && r.kind() == request.kind()
                && Status::OPEN.contains(&r.status)
        });

        if has_open {
            return Err(Error::conflict_error(
                "you already have an open request of this kind",
            ));
        }

        state.put_request(request);

        Ok(())
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, Error> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn latest_request_for_owner(
        &self,
        owner_id: Uuid,
        kind: ServiceKind,
    ) -> Result<Option<ServiceRequest>, Error> {
        let state = self.state.lock().await;

        let latest = state
            .requests
            .values()
            .filter(|r| r.owner_id == owner_id && r.kind() == kind)
            .filter(|r| r.status != Status::Cancelled)
            .max_by_key(|r| r.created_at)
            .cloned();

        Ok(latest)
    }

    async fn open_requests(
        &self,
        kind: ServiceKind,
        provider_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, Error> {
        let state = self.state.lock().await;

        let mut requests: Vec<ServiceRequest> = state
            .requests
            .values()
            .filter(|r| r.kind() == kind && r.is_open())
            .filter(|r| {
                !state.bids.values().any(|b| {
                    b.request_id == r.id && b.provider_id == provider_id && b.is_pending()
                })
            })
            .cloned()
            .collect();

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(requests)
    }

    async fn requests_for_party(
        &self,
        party: Party,
        user_id: Uuid,
        kind: ServiceKind,
        statuses: &[Status],
    ) -> Result<Vec<ServiceRequest>, Error> {
        let state = self.state.lock().await;

        let mut requests: Vec<ServiceRequest> = state
            .requests
            .values()
            .filter(|r| r.kind() == kind && statuses.contains(&r.status))
            .filter(|r| match party {
                Party::Owner => r.owner_id == user_id,
                Party::Provider => r.provider_id == Some(user_id),
            })
            .cloned()
            .collect();

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(requests)
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn transition(
        &self,
        id: Uuid,
        guard: &TransitionGuard,
        mutation: RequestMutation<'_>,
    ) -> Result<ServiceRequest, Error> {
        let mut state = self.state.lock().await;

        let mut request = state.request(&id)?;
        guard.check(request.status)?;

        mutation(&mut request)?;

        state.put_request(&request);

        Ok(request)
    }

    #[tracing::instrument(skip_all, fields(bid_id = %bid.id, request_id = %bid.request_id))]
    async fn insert_bid(
        &self,
        bid: &Bid,
        mutation: RequestMutation<'_>,
    ) -> Result<ServiceRequest, Error> {
        let mut state = self.state.lock().await;

        let mut request = state.request(&bid.request_id)?;

        let duplicate = state.bids.values().any(|b| {
            b.request_id == bid.request_id && b.provider_id == bid.provider_id && b.is_pending()
        });

        if duplicate {
            return Err(Error::conflict_error(
                "you already have a pending bid on this request",
            ));
        }

        mutation(&mut request)?;

        state.bids.insert(bid.id, bid.clone());
        state.put_request(&request);

        Ok(request)
    }

    async fn find_bid(&self, id: Uuid) -> Result<Option<Bid>, Error> {
        Ok(self.state.lock().await.bids.get(&id).cloned())
    }

    async fn pending_bids_for_provider(
        &self,
        provider_id: Uuid,
        kind: ServiceKind,
    ) -> Result<Vec<(Bid, ServiceRequest)>, Error> {
        let state = self.state.lock().await;

        let mut bids: Vec<(Bid, ServiceRequest)> = state
            .bids
            .values()
            .filter(|b| b.provider_id == provider_id && b.is_pending())
            .filter_map(|b| {
                state
                    .requests
                    .get(&b.request_id)
                    .filter(|r| r.kind() == kind && r.is_open())
                    .map(|r| (b.clone(), r.clone()))
            })
            .collect();

        bids.sort_by(|(a, _), (b, _)| b.created_at.cmp(&a.created_at));

        Ok(bids)
    }

    async fn pending_bids(&self, request_id: Uuid) -> Result<Vec<Bid>, Error> {
        let state = self.state.lock().await;

        let mut bids: Vec<Bid> = state
            .bids
            .values()
            .filter(|b| b.request_id == request_id && b.is_pending())
            .cloned()
            .collect();

        bids.sort_by(|a, b| {
            a.amount
                .total_cmp(&b.amount)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        Ok(bids)
    }

    #[tracing::instrument(skip(self, acceptance))]
    async fn accept_bid(
        &self,
        bid_id: Uuid,
        acceptance: BidAcceptance<'_>,
    ) -> Result<(ServiceRequest, Bid), Error> {
        let mut state = self.state.lock().await;

        let mut bid = state
            .bids
            .get(&bid_id)
            .cloned()
            .ok_or_else(|| Error::not_found_error("bid not found"))?;
        let mut request = state.request(&bid.request_id)?;

        acceptance(&mut request, &mut bid)?;

        for sibling in state.bids.values_mut() {
            if sibling.request_id == request.id && sibling.id != bid.id && sibling.is_pending() {
                sibling.reject()?;
            }
        }

        state.bids.insert(bid.id, bid.clone());
        state.put_request(&request);

        Ok((request, bid))
    }

    async fn insert_rating(&self, rating: &Rating) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let duplicate = state.ratings.iter().any(|r| {
            r.request_id == rating.request_id
                && r.rater_id == rating.rater_id
                && r.ratee_id == rating.ratee_id
        });

        if duplicate {
            return Err(Error::conflict_error("you have already rated this request"));
        }

        state.ratings.push(rating.clone());

        Ok(())
    }

    async fn has_rated(
        &self,
        request_id: Uuid,
        rater_id: Uuid,
        ratee_id: Uuid,
    ) -> Result<bool, Error> {
        let state = self.state.lock().await;

        Ok(state.ratings.iter().any(|r| {
            r.request_id == request_id && r.rater_id == rater_id && r.ratee_id == ratee_id
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{fixtures, BidStatus, STARTABLE};
    use tokio_test::block_on;

    #[test]
    fn failed_mutation_leaves_request_untouched() {
        let store = MemoryStore::new();
        let request = fixtures::ride(Uuid::new_v4());
        block_on(store.insert_request(&request)).unwrap();

        let err = block_on(store.transition(
            request.id,
            &STARTABLE,
            Box::new(|r: &mut ServiceRequest| r.start()),
        ))
        .unwrap_err();
        assert!(err.is_conflict_error());

        let stored = block_on(store.find_request(request.id)).unwrap().unwrap();
        assert_eq!(stored, request);
    }

    #[test]
    fn accept_rejects_only_pending_siblings_of_the_same_request() {
        let store = MemoryStore::new();
        let request = fixtures::ride(Uuid::new_v4());
        let other = fixtures::ride(Uuid::new_v4());
        block_on(store.insert_request(&request)).unwrap();
        block_on(store.insert_request(&other)).unwrap();

        let winner = Bid::new(request.id, Uuid::new_v4(), 7.5, None).unwrap();
        let loser = Bid::new(request.id, Uuid::new_v4(), 8.0, None).unwrap();
        let elsewhere = Bid::new(other.id, Uuid::new_v4(), 9.0, None).unwrap();

        for bid in [&winner, &loser, &elsewhere] {
            block_on(store.insert_bid(bid, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
                .unwrap();
        }

        let (accepted_request, accepted_bid) = block_on(store.accept_bid(
            winner.id,
            Box::new(|r: &mut ServiceRequest, b: &mut Bid| r.accept_bid(b)),
        ))
        .unwrap();

        assert_eq!(accepted_request.status, Status::Accepted);
        assert_eq!(accepted_bid.status, BidStatus::Accepted);

        let loser = block_on(store.find_bid(loser.id)).unwrap().unwrap();
        assert_eq!(loser.status, BidStatus::Rejected);

        let elsewhere = block_on(store.find_bid(elsewhere.id)).unwrap().unwrap();
        assert_eq!(elsewhere.status, BidStatus::Pending);
    }

    #[test]
    fn second_open_request_of_same_kind_conflicts() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        block_on(store.insert_request(&fixtures::ride(owner))).unwrap();

        let err = block_on(store.insert_request(&fixtures::ride(owner))).unwrap_err();
        assert!(err.is_conflict_error());
    }

    #[test]
    fn pending_bids_are_sorted_by_price() {
        let store = MemoryStore::new();
        let request = fixtures::ride(Uuid::new_v4());
        block_on(store.insert_request(&request)).unwrap();

        for amount in [9.0, 7.0, 8.0] {
            let bid = Bid::new(request.id, Uuid::new_v4(), amount, None).unwrap();
            block_on(store.insert_bid(&bid, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
                .unwrap();
        }

        let amounts: Vec<f64> = block_on(store.pending_bids(request.id))
            .unwrap()
            .iter()
            .map(|b| b.amount)
            .collect();

        assert_eq!(amounts, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn provider_sees_only_its_pending_bids_on_open_requests() {
        let store = MemoryStore::new();
        let provider = Uuid::new_v4();
        let open = fixtures::ride(Uuid::new_v4());
        let taken = fixtures::ride(Uuid::new_v4());
        block_on(store.insert_request(&open)).unwrap();
        block_on(store.insert_request(&taken)).unwrap();

        let mine = Bid::new(open.id, provider, 9.0, None).unwrap();
        let theirs = Bid::new(open.id, Uuid::new_v4(), 8.0, None).unwrap();
        let lost = Bid::new(taken.id, provider, 9.5, None).unwrap();
        let winner = Bid::new(taken.id, Uuid::new_v4(), 7.0, None).unwrap();

        for bid in [&mine, &theirs, &lost, &winner] {
            block_on(store.insert_bid(bid, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
                .unwrap();
        }

        block_on(store.accept_bid(
            winner.id,
            Box::new(|r: &mut ServiceRequest, b: &mut Bid| r.accept_bid(b)),
        ))
        .unwrap();

        let pending = block_on(store.pending_bids_for_provider(provider, open.kind())).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.id, mine.id);
        assert_eq!(pending[0].1.id, open.id);
    }

    #[test]
    fn requests_for_party_matches_binding_and_status() {
        let store = MemoryStore::new();
        let request = fixtures::ride(Uuid::new_v4());
        let provider = Uuid::new_v4();
        block_on(store.insert_request(&request)).unwrap();

        let bid = Bid::new(request.id, provider, 9.0, None).unwrap();
        block_on(store.insert_bid(&bid, Box::new(|r: &mut ServiceRequest| r.receive_bid())))
            .unwrap();

        let engaged = [Status::Accepted, Status::InProgress];
        let bound = block_on(store.requests_for_party(
            Party::Provider,
            provider,
            request.kind(),
            &engaged,
        ))
        .unwrap();
        assert!(bound.is_empty());

        block_on(store.accept_bid(
            bid.id,
            Box::new(|r: &mut ServiceRequest, b: &mut Bid| r.accept_bid(b)),
        ))
        .unwrap();

        let bound = block_on(store.requests_for_party(
            Party::Provider,
            provider,
            request.kind(),
            &engaged,
        ))
        .unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].id, request.id);

        let owned = block_on(store.requests_for_party(
            Party::Owner,
            provider,
            request.kind(),
            &engaged,
        ))
        .unwrap();
        assert!(owned.is_empty());
    }
}

mod helpers;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{Bid, Party, Rating, ServiceKind, ServiceRequest, Status, TransitionGuard};
use crate::error::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Applied to a request while its row is locked. An error aborts the whole
/// operation and nothing is persisted.
pub type RequestMutation<'a> =
    Box<dyn FnOnce(&mut ServiceRequest) -> Result<(), Error> + Send + 'a>;

/// Applied to a request and one of its bids while both rows are locked.
pub type BidAcceptance<'a> =
    Box<dyn FnOnce(&mut ServiceRequest, &mut Bid) -> Result<(), Error> + Send + 'a>;

/// Persistence for requests, their bids and ratings. Every mutating call is
/// one atomic unit: concurrent callers on the same request are serialized and
/// the later one observes the earlier one's result.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with a conflict when the owner already holds an open request of
    /// the same kind.
    async fn insert_request(&self, request: &ServiceRequest) -> Result<(), Error>;

    async fn find_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, Error>;

    /// Most recent request of this kind that has not been cancelled.
    async fn latest_request_for_owner(
        &self,
        owner_id: Uuid,
        kind: ServiceKind,
    ) -> Result<Option<ServiceRequest>, Error>;

    /// Unbound requests still taking bids, minus those the provider already
    /// has a pending bid on. Newest first.
    async fn open_requests(
        &self,
        kind: ServiceKind,
        provider_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, Error>;

    /// Requests of `kind` in one of `statuses` where `user_id` is the given
    /// party. A provider is matched through the binding, so it only sees
    /// requests it is currently bound to or has completed. Newest first.
    async fn requests_for_party(
        &self,
        party: Party,
        user_id: Uuid,
        kind: ServiceKind,
        statuses: &[Status],
    ) -> Result<Vec<ServiceRequest>, Error>;

    /// Checks the current status against `guard` before running `mutation`.
    async fn transition(
        &self,
        id: Uuid,
        guard: &TransitionGuard,
        mutation: RequestMutation<'_>,
    ) -> Result<ServiceRequest, Error>;

    /// Stores `bid` after `mutation` has accepted it on the parent request.
    /// A provider may hold at most one pending bid per request.
    async fn insert_bid(
        &self,
        bid: &Bid,
        mutation: RequestMutation<'_>,
    ) -> Result<ServiceRequest, Error>;

    async fn find_bid(&self, id: Uuid) -> Result<Option<Bid>, Error>;

    /// The provider's pending bids on unbound requests of `kind` that are
    /// still taking bids, each with its request. Newest bid first.
    async fn pending_bids_for_provider(
        &self,
        provider_id: Uuid,
        kind: ServiceKind,
    ) -> Result<Vec<(Bid, ServiceRequest)>, Error>;

    /// Cheapest first, ties broken by age.
    async fn pending_bids(&self, request_id: Uuid) -> Result<Vec<Bid>, Error>;

    /// On success the bid is accepted, every other pending bid on the request
    /// is rejected, and the request is stored as mutated by `acceptance`.
    async fn accept_bid(
        &self,
        bid_id: Uuid,
        acceptance: BidAcceptance<'_>,
    ) -> Result<(ServiceRequest, Bid), Error>;

    async fn insert_rating(&self, rating: &Rating) -> Result<(), Error>;

    async fn has_rated(
        &self,
        request_id: Uuid,
        rater_id: Uuid,
        ratee_id: Uuid,
    ) -> Result<bool, Error>;
}

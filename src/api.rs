use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{
    Bid, CancellationReason, Coordinates, Party, Rating, ServiceKind, ServicePayload,
    ServiceRequest,
};
use crate::error::Error;

/// Result of a successful acceptance: the bound request and the winning bid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Acceptance {
    pub request: ServiceRequest,
    pub bid: Bid,
}

/// An open request as seen by a provider at a given position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenRequest {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub distance_km: f64,
}

/// A provider's pending bid together with the request it was placed on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingBid {
    pub bid: Bid,
    pub request: ServiceRequest,
}

#[async_trait]
pub trait RequestAPI {
    async fn create_request(
        &self,
        user: User,
        payload: ServicePayload,
        price: f64,
    ) -> Result<ServiceRequest, Error>;

    async fn find_request(&self, user: User, id: Uuid) -> Result<ServiceRequest, Error>;

    /// The caller's current request of `kind`, if any. A completed request
    /// stays active until the caller has rated its provider.
    async fn find_active_request(
        &self,
        user: User,
        kind: ServiceKind,
    ) -> Result<Option<ServiceRequest>, Error>;

    async fn list_open_requests_for_provider(
        &self,
        user: User,
        kind: ServiceKind,
        position: Coordinates,
    ) -> Result<Vec<OpenRequest>, Error>;

    /// Requests of `kind` the caller is bound to as provider, accepted or in
    /// progress.
    async fn list_accepted_requests_for_provider(
        &self,
        user: User,
        kind: ServiceKind,
    ) -> Result<Vec<ServiceRequest>, Error>;

    /// Finished requests of `kind` where the caller took part as `party`.
    async fn list_request_history(
        &self,
        user: User,
        kind: ServiceKind,
        party: Party,
    ) -> Result<Vec<ServiceRequest>, Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn submit_bid(
        &self,
        user: User,
        request_id: Uuid,
        amount: f64,
        message: Option<String>,
    ) -> Result<Bid, Error>;

    async fn list_bids_for_request(&self, user: User, request_id: Uuid) -> Result<Vec<Bid>, Error>;

    async fn accept_bid(&self, user: User, bid_id: Uuid) -> Result<Acceptance, Error>;

    async fn list_pending_bids_for_provider(
        &self,
        user: User,
        kind: ServiceKind,
    ) -> Result<Vec<PendingBid>, Error>;
}

#[async_trait]
pub trait LifecycleAPI {
    async fn start_request(&self, user: User, id: Uuid) -> Result<ServiceRequest, Error>;

    async fn complete_request(&self, user: User, id: Uuid) -> Result<ServiceRequest, Error>;

    async fn cancel_request(
        &self,
        user: User,
        id: Uuid,
        reason: CancellationReason,
    ) -> Result<ServiceRequest, Error>;
}

#[async_trait]
pub trait RatingAPI {
    async fn rate_request(
        &self,
        user: User,
        id: Uuid,
        score: u8,
        review: Option<String>,
    ) -> Result<Rating, Error>;
}

pub trait API: RequestAPI + BidAPI + LifecycleAPI + RatingAPI {}

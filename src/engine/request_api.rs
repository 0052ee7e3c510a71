use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{OpenRequest, RequestAPI},
    auth::User,
    entities::{Coordinates, Party, ServiceKind, ServicePayload, ServiceRequest, Status},
    error::Error,
};

#[async_trait]
impl RequestAPI for Engine {
    #[tracing::instrument(skip(self, payload))]
    async fn create_request(
        &self,
        user: User,
        payload: ServicePayload,
        price: f64,
    ) -> Result<ServiceRequest, Error> {
        let request = ServiceRequest::new(user.id, payload, price)?;

        self.store.insert_request(&request).await?;

        tracing::info!(request_id = %request.id, kind = request.kind().name(), "request created");

        let (request_id, kind, location) = (request.id, request.kind(), request.origin().clone());
        self.notify(move |notifier| async move {
            notifier.notify_new_request(request_id, kind, location).await
        });

        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    async fn find_request(&self, user: User, id: Uuid) -> Result<ServiceRequest, Error> {
        let request = self.find_request_or_not_found(id).await?;

        self.authorize(user, "read", request.clone())?;

        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    async fn find_active_request(
        &self,
        user: User,
        kind: ServiceKind,
    ) -> Result<Option<ServiceRequest>, Error> {
        let request = match self.store.latest_request_for_owner(user.id, kind).await? {
            Some(request) => request,
            None => return Ok(None),
        };

        if request.status != Status::Completed {
            return Ok(Some(request));
        }

        let provider_id = match request.provider_id {
            Some(provider_id) => provider_id,
            None => return Ok(None),
        };

        if self.store.has_rated(request.id, user.id, provider_id).await? {
            tracing::info!("latest request is completed and rated, nothing active");
            return Ok(None);
        }

        Ok(Some(request))
    }

    #[tracing::instrument(skip(self))]
    async fn list_open_requests_for_provider(
        &self,
        user: User,
        kind: ServiceKind,
        position: Coordinates,
    ) -> Result<Vec<OpenRequest>, Error> {
        position.validate()?;

        let mut nearby: Vec<OpenRequest> = self
            .store
            .open_requests(kind, user.id)
            .await?
            .into_iter()
            .filter(|request| !request.is_owned_by(user.id))
            .map(|request| {
                let distance_km = position.distance_km(&request.origin().coordinates);
                OpenRequest {
                    request,
                    distance_km,
                }
            })
            .filter(|open| open.distance_km <= self.search_radius_km)
            .collect();

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

        tracing::info!("{} open requests within {} km", nearby.len(), self.search_radius_km);

        Ok(nearby)
    }

    #[tracing::instrument(skip(self))]
    async fn list_accepted_requests_for_provider(
        &self,
        user: User,
        kind: ServiceKind,
    ) -> Result<Vec<ServiceRequest>, Error> {
        self.store
            .requests_for_party(
                Party::Provider,
                user.id,
                kind,
                &[Status::Accepted, Status::InProgress],
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_request_history(
        &self,
        user: User,
        kind: ServiceKind,
        party: Party,
    ) -> Result<Vec<ServiceRequest>, Error> {
        // a cancelled request no longer names its provider
        let statuses: &[Status] = match party {
            Party::Owner => &[Status::Completed, Status::Cancelled],
            Party::Provider => &[Status::Completed],
        };

        self.store
            .requests_for_party(party, user.id, kind, statuses)
            .await
    }
}

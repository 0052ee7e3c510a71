use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    entities::{Location, ServiceKind},
    error::Error,
};

/// Tells providers and customers about marketplace events. Delivery is best
/// effort and never affects the operation that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new_request(
        &self,
        request_id: Uuid,
        kind: ServiceKind,
        location: Location,
    ) -> Result<(), Error>;

    async fn notify_bid_accepted(&self, provider_id: Uuid, request_id: Uuid) -> Result<(), Error>;
}

pub type DynNotifier = Arc<dyn Notifier>;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event {
    NewRequest {
        request_id: Uuid,
        kind: ServiceKind,
        location: Location,
    },
    BidAccepted {
        provider_id: Uuid,
        request_id: Uuid,
    },
}

/// Posts every event as JSON to a single endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn post(&self, event: Event) -> Result<(), Error> {
        let res = self.client.post(&self.url).json(&event).send().await?;

        let status_code = res.status().as_u16();

        if !(200..300).contains(&status_code) {
            tracing::warn!("notification endpoint answered {}", status_code);
            return Err(Error::upstream_error());
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_new_request(
        &self,
        request_id: Uuid,
        kind: ServiceKind,
        location: Location,
    ) -> Result<(), Error> {
        self.post(Event::NewRequest {
            request_id,
            kind,
            location,
        })
        .await
    }

    async fn notify_bid_accepted(&self, provider_id: Uuid, request_id: Uuid) -> Result<(), Error> {
        self.post(Event::BidAccepted {
            provider_id,
            request_id,
        })
        .await
    }
}

/// Writes events to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_new_request(
        &self,
        request_id: Uuid,
        kind: ServiceKind,
        location: Location,
    ) -> Result<(), Error> {
        tracing::info!(
            %request_id,
            kind = kind.name(),
            address = %location.address,
            "new request"
        );
        Ok(())
    }

    async fn notify_bid_accepted(&self, provider_id: Uuid, request_id: Uuid) -> Result<(), Error> {
        tracing::info!(%provider_id, %request_id, "bid accepted");
        Ok(())
    }
}

mod bid_api;
mod lifecycle_api;
mod rating_api;
mod request_api;

use oso::Oso;
use std::future::Future;
use std::sync::Arc;

use crate::{
    api::API,
    auth::{authorizor, User},
    db::Store,
    entities::ServiceRequest,
    error::Error,
    external::DynNotifier,
};

pub struct Engine {
    store: Arc<dyn Store>,
    authorizor: Oso,
    notifier: DynNotifier,
    search_radius_km: f64,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip(store, notifier))]
    pub fn new(
        store: Arc<dyn Store>,
        notifier: DynNotifier,
        search_radius_km: f64,
    ) -> Result<Self, Error> {
        if !search_radius_km.is_finite() || search_radius_km <= 0.0 {
            return Err(Error::config_error("search radius must be greater than 0"));
        }

        Ok(Self {
            store,
            authorizor: authorizor::new()?,
            notifier,
            search_radius_km,
        })
    }
}

impl Engine {
    pub fn authorize(
        &self,
        user: User,
        action: &'static str,
        request: ServiceRequest,
    ) -> Result<(), Error> {
        if self.authorizor.is_allowed(user, action, request)? {
            return Ok(());
        }

        tracing::info!("caller is not allowed to {}", action);

        Err(Error::forbidden_error(format!(
            "you are not allowed to {} this request",
            action.replace('_', " ")
        )))
    }

    async fn find_request_or_not_found(&self, id: uuid::Uuid) -> Result<ServiceRequest, Error> {
        self.store
            .find_request(id)
            .await?
            .ok_or_else(|| Error::not_found_error("request not found"))
    }

    /// Runs a notification in the background. Failures are logged and dropped.
    fn notify<F, Fut>(&self, send: F)
    where
        F: FnOnce(DynNotifier) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let notification = send(self.notifier.clone());

        tokio::spawn(async move {
            if let Err(err) = notification.await {
                tracing::warn!("notification failed: {}", err);
            }
        });
    }
}

impl API for Engine {}

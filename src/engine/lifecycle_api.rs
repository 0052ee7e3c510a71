use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::LifecycleAPI,
    auth::User,
    entities::{CancellationReason, ServiceRequest, CANCELLABLE, COMPLETABLE, STARTABLE},
    error::Error,
};

#[async_trait]
impl LifecycleAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn start_request(&self, user: User, id: Uuid) -> Result<ServiceRequest, Error> {
        self.store
            .transition(
                id,
                &STARTABLE,
                Box::new(move |request: &mut ServiceRequest| {
                    self.authorize(user, "start", request.clone())?;
                    request.start()
                }),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn complete_request(&self, user: User, id: Uuid) -> Result<ServiceRequest, Error> {
        self.store
            .transition(
                id,
                &COMPLETABLE,
                Box::new(move |request: &mut ServiceRequest| {
                    self.authorize(user, "complete", request.clone())?;
                    request.complete()
                }),
            )
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_request(
        &self,
        user: User,
        id: Uuid,
        reason: CancellationReason,
    ) -> Result<ServiceRequest, Error> {
        reason.validate()?;

        let request = self
            .store
            .transition(
                id,
                &CANCELLABLE,
                Box::new(move |request: &mut ServiceRequest| {
                    let party = request.party_of(user.id);
                    self.authorize(user, "cancel", request.clone())?;

                    let party = party.ok_or_else(|| {
                        Error::forbidden_error("you are not allowed to cancel this request")
                    })?;

                    request.cancel(reason, party)
                }),
            )
            .await?;

        tracing::info!("request cancelled");

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{engine, post_ride, user};
    use super::*;
    use crate::api::{BidAPI, RequestAPI};
    use crate::entities::{Party, ReleasedBinding, Status};
    use tokio_test::block_on;

    fn accepted_ride(engine: &Engine) -> (User, User, ServiceRequest) {
        let (customer, provider) = (user(), user());

        let request = post_ride(engine, &customer);
        let bid = block_on(engine.submit_bid(provider.clone(), request.id, 9.0, None)).unwrap();
        let acceptance = block_on(engine.accept_bid(customer.clone(), bid.id)).unwrap();

        (customer, provider, acceptance.request)
    }

    #[test]
    fn only_the_bound_provider_starts() {
        let engine = engine();
        let (customer, provider, request) = accepted_ride(&engine);

        let err = block_on(engine.start_request(customer, request.id)).unwrap_err();
        assert!(err.is_forbidden_error());

        let err = block_on(engine.start_request(user(), request.id)).unwrap_err();
        assert!(err.is_forbidden_error());

        let request = block_on(engine.start_request(provider, request.id)).unwrap();
        assert_eq!(request.status, Status::InProgress);
    }

    #[test]
    fn wrong_status_is_a_conflict_even_for_strangers() {
        let engine = engine();
        let customer = user();

        let request = post_ride(&engine, &customer);

        for caller in [customer.clone(), user()] {
            let err = block_on(engine.start_request(caller.clone(), request.id)).unwrap_err();
            assert!(err.is_conflict_error());

            let err = block_on(engine.complete_request(caller, request.id)).unwrap_err();
            assert!(err.is_conflict_error());
        }
    }

    #[test]
    fn owner_completes_straight_from_accepted() {
        let engine = engine();
        let (customer, provider, request) = accepted_ride(&engine);

        let request = block_on(engine.complete_request(customer, request.id)).unwrap();
        assert_eq!(request.status, Status::Completed);

        let err = block_on(engine.start_request(provider, request.id)).unwrap_err();
        assert!(err.is_conflict_error());
    }

    #[test]
    fn provider_cancellation_releases_the_binding() {
        let engine = engine();
        let (customer, provider, request) = accepted_ride(&engine);

        let err = block_on(engine.cancel_request(
            user(),
            request.id,
            CancellationReason::Emergency,
        ))
        .unwrap_err();
        assert!(err.is_forbidden_error());

        let request = block_on(engine.cancel_request(
            provider.clone(),
            request.id,
            CancellationReason::Emergency,
        ))
        .unwrap();

        assert_eq!(request.status, Status::Cancelled);
        assert_eq!(request.provider_id, None);
        assert_eq!(request.final_price, None);

        let cancellation = request.cancellation.clone().unwrap();
        assert_eq!(cancellation.cancelled_by, Party::Provider);
        assert_eq!(
            cancellation.released,
            Some(ReleasedBinding {
                provider_id: provider.id,
                final_price: 9.0
            })
        );

        let err = block_on(engine.cancel_request(
            customer,
            request.id,
            CancellationReason::ChangedMind,
        ))
        .unwrap_err();
        assert!(err.is_conflict_error());
        assert_eq!(err.message, "request cannot be cancelled");
    }

    #[test]
    fn provider_candidate_cannot_cancel_an_open_request() {
        let engine = engine();
        let (customer, provider) = (user(), user());

        let request = post_ride(&engine, &customer);
        block_on(engine.submit_bid(provider.clone(), request.id, 9.0, None)).unwrap();

        let err = block_on(engine.cancel_request(
            provider,
            request.id,
            CancellationReason::ChangedMind,
        ))
        .unwrap_err();
        assert!(err.is_forbidden_error());
    }

    #[test]
    fn other_reason_needs_a_description() {
        let engine = engine();
        let customer = user();

        let request = post_ride(&engine, &customer);

        let err = block_on(engine.cancel_request(
            customer.clone(),
            request.id,
            CancellationReason::Other("   ".into()),
        ))
        .unwrap_err();
        assert!(err.is_validation_error());

        let request = block_on(engine.find_request(customer, request.id)).unwrap();
        assert_eq!(request.status, Status::Searching);
    }
}

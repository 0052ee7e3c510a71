use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::RatingAPI,
    auth::User,
    entities::{Party, Rating, Status},
    error::Error,
};

#[async_trait]
impl RatingAPI for Engine {
    #[tracing::instrument(skip(self, review))]
    async fn rate_request(
        &self,
        user: User,
        id: Uuid,
        score: u8,
        review: Option<String>,
    ) -> Result<Rating, Error> {
        let request = self.find_request_or_not_found(id).await?;

        if request.status != Status::Completed {
            return Err(Error::conflict_error("only completed requests can be rated"));
        }

        self.authorize(user.clone(), "rate", request.clone())?;

        let ratee_id = match request.party_of(user.id) {
            Some(Party::Owner) => request.provider_id,
            Some(Party::Provider) => Some(request.owner_id),
            None => None,
        }
        .ok_or_else(|| Error::forbidden_error("you are not allowed to rate this request"))?;

        let rating = Rating::new(request.id, user.id, ratee_id, score, review)?;

        self.store.insert_rating(&rating).await?;

        Ok(rating)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub request_id: Uuid,
    pub rater_id: Uuid,
    pub ratee_id: Uuid,
    pub score: u8,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        request_id: Uuid,
        rater_id: Uuid,
        ratee_id: Uuid,
        score: u8,
        review: Option<String>,
    ) -> Result<Self, Error> {
        if !(1..=5).contains(&score) {
            return Err(Error::validation_error("rating must be between 1 and 5"));
        }

        if rater_id == ratee_id {
            return Err(Error::validation_error("cannot rate yourself"));
        }

        Ok(Self {
            request_id,
            rater_id,
            ratee_id,
            score,
            review: review.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            created_at: Utc::now(),
        })
    }
}

#[test]
fn score_must_be_between_one_and_five() {
    let (request, rater, ratee) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    assert!(Rating::new(request, rater, ratee, 0, None).is_err());
    assert!(Rating::new(request, rater, ratee, 6, None).is_err());
    assert_eq!(
        Rating::new(request, rater, ratee, 5, Some("great".into()))
            .unwrap()
            .review
            .as_deref(),
        Some("great")
    );
}

#[test]
fn self_rating_is_rejected() {
    let user = Uuid::new_v4();
    let err = Rating::new(Uuid::new_v4(), user, user, 4, None).unwrap_err();

    assert_eq!(err.message, "cannot rate yourself");
}

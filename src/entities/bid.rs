use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub amount: f64,
    pub message: Option<String>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl Bid {
    pub fn new(
        request_id: Uuid,
        provider_id: Uuid,
        amount: f64,
        message: Option<String>,
    ) -> Result<Self, Error> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::validation_error("bid price must be greater than 0"));
        }

        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(Bid {
            id: Uuid::new_v4(),
            request_id,
            provider_id,
            amount,
            message,
            status: BidStatus::Pending,
            created_at: Utc::now(),
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == BidStatus::Pending
    }

    pub fn ensure_pending(&self) -> Result<(), Error> {
        match self.status {
            BidStatus::Pending => Ok(()),
            _ => Err(Error::conflict_error("bid is no longer available")),
        }
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn accept(&mut self) -> Result<(), Error> {
        self.ensure_pending()?;
        self.status = BidStatus::Accepted;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), Error> {
        self.ensure_pending()?;
        self.status = BidStatus::Rejected;
        Ok(())
    }
}

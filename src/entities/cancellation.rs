use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "details", rename_all = "snake_case")]
pub enum CancellationReason {
    ChangedMind,
    FoundAnotherProvider,
    ProviderTooFar,
    PriceTooHigh,
    NoProvidersAvailable,
    Emergency,
    WrongDestination,
    Other(String),
}

impl CancellationReason {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Other(details) if details.trim().is_empty() => Err(Error::validation_error(
                "a description is required when the reason is other",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Owner,
    Provider,
}

impl Party {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Provider => "provider",
        }
    }
}

/// Binding that was in place when the request was cancelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReleasedBinding {
    pub provider_id: Uuid,
    pub final_price: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: CancellationReason,
    pub cancelled_by: Party,
    pub released: Option<ReleasedBinding>,
    pub cancelled_at: DateTime<Utc>,
}

#[test]
fn other_reason_needs_details() {
    assert!(CancellationReason::Other(" ".into())
        .validate()
        .unwrap_err()
        .is_validation_error());
    assert!(CancellationReason::Other("flight delayed".into())
        .validate()
        .is_ok());
    assert!(CancellationReason::PriceTooHigh.validate().is_ok());
}

#[test]
fn reason_wire_format() {
    let json = serde_json::to_value(CancellationReason::Other("flight delayed".into())).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "reason": "other", "details": "flight delayed" })
    );

    let reason: CancellationReason =
        serde_json::from_value(serde_json::json!({ "reason": "changed_mind" })).unwrap();
    assert_eq!(reason, CancellationReason::ChangedMind);
}

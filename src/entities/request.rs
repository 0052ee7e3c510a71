use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entities::{Bid, Cancellation, CancellationReason, Location, Party, ReleasedBinding};
use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub payload: ServicePayload,
    pub price: f64,
    pub final_price: Option<f64>,
    pub provider_id: Option<Uuid>,
    pub status: Status,
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Ride,
    Parcel,
    HomeService,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vehicle {
    Motorbike,
    Car,
    Van,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServicePayload {
    Ride {
        pickup: Location,
        destination: Location,
        distance_km: f64,
        #[serde(default)]
        round_trip: bool,
    },
    Parcel {
        pickup: Location,
        delivery: Location,
        distance_km: f64,
        vehicle: Vehicle,
    },
    HomeService {
        service_id: Uuid,
        job_description: String,
        location: Location,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Searching,
    BidReceived,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

/// Statuses a transition may start from, and what the caller is told otherwise.
#[derive(Debug)]
pub struct TransitionGuard {
    pub expected: &'static [Status],
    pub conflict: &'static str,
}

pub const BIDDABLE: TransitionGuard = TransitionGuard {
    expected: &[Status::Searching, Status::BidReceived],
    conflict: "request is no longer accepting bids",
};

pub const ACCEPTABLE: TransitionGuard = TransitionGuard {
    expected: &[Status::Searching, Status::BidReceived],
    conflict: "request is no longer available",
};

pub const STARTABLE: TransitionGuard = TransitionGuard {
    expected: &[Status::Accepted],
    conflict: "request must be accepted before starting",
};

pub const COMPLETABLE: TransitionGuard = TransitionGuard {
    expected: &[Status::Accepted, Status::InProgress],
    conflict: "request must be accepted or in progress before completing",
};

pub const CANCELLABLE: TransitionGuard = TransitionGuard {
    expected: &[
        Status::Searching,
        Status::BidReceived,
        Status::Accepted,
        Status::InProgress,
    ],
    conflict: "request cannot be cancelled",
};

impl TransitionGuard {
    pub fn check(&self, status: Status) -> Result<(), Error> {
        if self.expected.contains(&status) {
            return Ok(());
        }

        Err(Error::conflict_error(self.conflict))
    }
}

impl Status {
    pub const OPEN: [Status; 4] = [
        Status::Searching,
        Status::BidReceived,
        Status::Accepted,
        Status::InProgress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::BidReceived => "bid_received",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress | Self::Completed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ride => "ride",
            Self::Parcel => "parcel",
            Self::HomeService => "home_service",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ride" => Ok(Self::Ride),
            "parcel" => Ok(Self::Parcel),
            "home_service" => Ok(Self::HomeService),
            _ => Err(Error::validation_error(format!("unknown service kind: {}", s))),
        }
    }
}

impl ServicePayload {
    pub fn kind(&self) -> ServiceKind {
        match self {
            Self::Ride { .. } => ServiceKind::Ride,
            Self::Parcel { .. } => ServiceKind::Parcel,
            Self::HomeService { .. } => ServiceKind::HomeService,
        }
    }

    /// Where the provider has to show up first.
    pub fn origin(&self) -> &Location {
        match self {
            Self::Ride { pickup, .. } | Self::Parcel { pickup, .. } => pickup,
            Self::HomeService { location, .. } => location,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Ride {
                pickup,
                destination,
                distance_km,
                ..
            } => {
                pickup.validate("pickup")?;
                destination.validate("destination")?;
                validate_positive("distance", *distance_km)
            }
            Self::Parcel {
                pickup,
                delivery,
                distance_km,
                vehicle,
            } => {
                pickup.validate("pickup")?;
                delivery.validate("delivery")?;
                validate_positive("distance", *distance_km)?;

                if *vehicle != Vehicle::Motorbike {
                    return Err(Error::validation_error(
                        "only motorbike delivery is available",
                    ));
                }

                Ok(())
            }
            Self::HomeService {
                job_description,
                location,
                ..
            } => {
                if job_description.trim().is_empty() {
                    return Err(Error::validation_error("job description is required"));
                }

                location.validate("service")
            }
        }
    }
}

fn validate_positive(field: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::validation_error(format!(
            "{} must be greater than 0",
            field
        )));
    }

    Ok(())
}

impl ServiceRequest {
    pub fn new(owner_id: Uuid, payload: ServicePayload, price: f64) -> Result<Self, Error> {
        payload.validate()?;
        validate_positive("price", price)?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            payload,
            price,
            final_price: None,
            provider_id: None,
            status: Status::Searching,
            cancellation: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn kind(&self) -> ServiceKind {
        self.payload.kind()
    }

    pub fn origin(&self) -> &Location {
        self.payload.origin()
    }

    /// Open for bidding: no provider bound yet.
    pub fn is_open(&self) -> bool {
        BIDDABLE.check(self.status).is_ok() && self.provider_id.is_none()
    }

    pub fn party_of(&self, user_id: Uuid) -> Option<Party> {
        if self.owner_id == user_id {
            return Some(Party::Owner);
        }

        match self.provider_id {
            Some(provider_id) if provider_id == user_id => Some(Party::Provider),
            _ => None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[tracing::instrument(skip(self), fields(request_id = %self.id))]
    pub fn receive_bid(&mut self) -> Result<(), Error> {
        BIDDABLE.check(self.status)?;

        if self.provider_id.is_some() {
            return Err(Error::conflict_error("request has already been accepted"));
        }

        if self.status == Status::Searching {
            self.status = Status::BidReceived;
        }

        self.touch();
        Ok(())
    }

    #[tracing::instrument(skip(self, bid), fields(request_id = %self.id, bid_id = %bid.id))]
    pub fn accept_bid(&mut self, bid: &mut Bid) -> Result<(), Error> {
        if bid.request_id != self.id {
            return Err(Error::validation_error("bid does not belong to this request"));
        }

        bid.ensure_pending()?;
        ACCEPTABLE.check(self.status)?;

        if self.provider_id.is_some() {
            return Err(Error::conflict_error("request has already been accepted"));
        }

        bid.accept()?;

        self.provider_id = Some(bid.provider_id);
        self.final_price = Some(bid.amount);
        self.status = Status::Accepted;
        self.touch();

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(request_id = %self.id))]
    pub fn start(&mut self) -> Result<(), Error> {
        STARTABLE.check(self.status)?;

        self.status = Status::InProgress;
        self.touch();
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(request_id = %self.id))]
    pub fn complete(&mut self) -> Result<(), Error> {
        COMPLETABLE.check(self.status)?;

        self.status = Status::Completed;
        self.touch();
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(request_id = %self.id))]
    pub fn cancel(&mut self, reason: CancellationReason, cancelled_by: Party) -> Result<(), Error> {
        CANCELLABLE.check(self.status)?;
        reason.validate()?;

        let released = match (self.provider_id.take(), self.final_price.take()) {
            (Some(provider_id), Some(final_price)) => Some(ReleasedBinding {
                provider_id,
                final_price,
            }),
            _ => None,
        };

        let now = Utc::now();

        self.status = Status::Cancelled;
        self.cancellation = Some(Cancellation {
            reason,
            cancelled_by,
            released,
            cancelled_at: now,
        });
        self.updated_at = now;

        Ok(())
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// A provider and final price are present exactly while the status is bound.
    pub fn has_consistent_binding(&self) -> bool {
        self.provider_id.is_some() == self.status.is_bound()
            && self.final_price.is_some() == self.provider_id.is_some()
    }
}

impl PolarClass for ServiceRequest {
    fn get_polar_class_builder() -> oso::ClassBuilder<ServiceRequest> {
        oso::Class::builder()
            .name("ServiceRequest")
            .add_attribute_getter("id", |recv: &ServiceRequest| recv.id)
            .add_attribute_getter("owner_id", |recv: &ServiceRequest| recv.owner_id)
            .add_attribute_getter("provider_id", |recv: &ServiceRequest| recv.provider_id)
            .add_method("is_open", ServiceRequest::is_open)
            .add_method("is_owned_by", ServiceRequest::is_owned_by)
    }

    fn get_polar_class() -> oso::Class {
        let builder = ServiceRequest::get_polar_class_builder();
        builder.build()
    }
}

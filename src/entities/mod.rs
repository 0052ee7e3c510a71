mod bid;
mod cancellation;
mod location;
mod rating;
mod request;

pub use bid::{Bid, BidStatus};
pub use cancellation::{Cancellation, CancellationReason, Party, ReleasedBinding};
pub use location::{Coordinates, Location};
pub use rating::Rating;
pub use request::{
    ServiceKind, ServicePayload, ServiceRequest, Status, TransitionGuard, Vehicle, ACCEPTABLE,
    BIDDABLE, CANCELLABLE, COMPLETABLE, STARTABLE,
};

#[cfg(test)]
pub use request::fixtures;

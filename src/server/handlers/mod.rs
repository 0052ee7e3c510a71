pub mod bids;
pub mod providers;
pub mod requests;

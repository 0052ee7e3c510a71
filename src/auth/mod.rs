pub mod authorizor;
mod user;
mod verifier;

pub use user::User;
pub use verifier::{bearer_token, DynVerifier, SessionVerifier, TokenVerifier, TrustingVerifier};

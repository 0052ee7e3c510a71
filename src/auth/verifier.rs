use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::http::header::AUTHORIZATION;
use sqlx::{Executor, Pool, Postgres, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::User;
use crate::error::Error;

/// Turns a bearer token into a caller identity. Token issuance lives elsewhere.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<User, Error>;
}

pub type DynVerifier = Arc<dyn TokenVerifier>;

pub struct SessionVerifier {
    pool: Pool<Postgres>,
}

impl SessionVerifier {
    #[tracing::instrument(name = "SessionVerifier::new", skip_all)]
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, Error> {
        pool.execute("CREATE TABLE IF NOT EXISTS sessions (token VARCHAR PRIMARY KEY, user_id UUID NOT NULL, expires_at TIMESTAMPTZ)")
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl TokenVerifier for SessionVerifier {
    #[tracing::instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<User, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(
                sqlx::query("SELECT user_id FROM sessions WHERE token = $1 AND (expires_at IS NULL OR expires_at > now())")
                    .bind(token),
            )
            .await?
            .ok_or_else(|| {
                tracing::info!("unknown or expired session token");
                Error::unauthorized_error()
            })?;

        let user_id: Uuid = row.try_get("user_id")?;

        Ok(User::new(user_id))
    }
}

/// Accepts any token that is a user id. Only for the in-memory development setup.
pub struct TrustingVerifier;

#[async_trait]
impl TokenVerifier for TrustingVerifier {
    async fn verify(&self, token: &str) -> Result<User, Error> {
        Uuid::parse_str(token)
            .map(User::new)
            .map_err(|_| Error::unauthorized_error())
    }
}

pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<B: Send> FromRequest<B> for User {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let verifier = req
            .extensions()
            .get::<DynVerifier>()
            .cloned()
            .ok_or_else(|| Error::config_error("token verifier is not configured"))?;

        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(Error::unauthorized_error)?;

        verifier.verify(token).await
    }
}

use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("expected postgres or memory, got {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_address: SocketAddr,
    pub provider_search_radius_km: f64,
    pub notification_webhook_url: Option<String>,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> Result<Self, Error> {
        if let Err(err) = dotenv::dotenv() {
            tracing::info!("no .env file loaded: {}", err);
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store: StoreKind = try_load(&lookup, "STORE", "postgres")?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(Error::config_error("DATABASE_URL is required for the postgres store"));
        }

        let provider_search_radius_km: f64 = try_load(&lookup, "PROVIDER_SEARCH_RADIUS_KM", "5.0")?;
        if !provider_search_radius_km.is_finite() || provider_search_radius_km <= 0.0 {
            return Err(Error::config_error(
                "PROVIDER_SEARCH_RADIUS_KM must be greater than 0",
            ));
        }

        Ok(Self {
            store,
            database_url,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            bind_address: try_load(&lookup, "BIND_ADDRESS", "127.0.0.1:3000")?,
            provider_search_radius_km,
            notification_webhook_url: lookup("NOTIFICATION_WEBHOOK_URL")
                .filter(|url| !url.trim().is_empty()),
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            tracing::info!("{} not set, using default: {}", key, default);
            default.to_string()
        })
        .parse()
        .map_err(|err| Error::config_error(format!("invalid {} value: {}", key, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_to_unset_variables() {
        let config = config(&[("DATABASE_URL", "postgresql://localhost/market")]).unwrap();

        assert_eq!(config.store, StoreKind::Postgres);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(
            config.bind_address,
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.provider_search_radius_km, 5.0);
        assert_eq!(config.notification_webhook_url, None);
    }

    #[test]
    fn postgres_store_needs_a_database_url() {
        let err = config(&[]).unwrap_err();
        assert!(err.message.contains("DATABASE_URL"));

        let config = config(&[("STORE", "memory")]).unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(config(&[("STORE", "redis")]).is_err());
        assert!(config(&[("STORE", "memory"), ("BIND_ADDRESS", "localhost")]).is_err());
        assert!(config(&[("STORE", "memory"), ("PROVIDER_SEARCH_RADIUS_KM", "-2")]).is_err());
        assert!(config(&[("STORE", "memory"), ("DATABASE_MAX_CONNECTIONS", "many")]).is_err());
    }
}

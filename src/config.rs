use crate::domain::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub min_withdrawal: Decimal,
    /// Deepest level (relative to the sponsor) the spillover search may place at.
    /// None means unbounded.
    pub placement_max_depth: Option<u32>,
    pub placement_retries: u32,
    pub tree_default_depth: u32,
    pub tree_max_depth: u32,
    pub session_ttl_ms: i64,
    pub notify: NotifyConfig,
    pub matching_sweep_concurrency: usize,
    pub root: Option<RootAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub timeout_ms: u64,
    pub max_elapsed_ms: u64,
}

/// Root admin created on startup when the tree is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let min_withdrawal = match env_map.get("MIN_WITHDRAWAL") {
            Some(raw) => Decimal::from_str_canonical(raw)
                .ok()
                .filter(|d| !d.is_negative())
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "MIN_WITHDRAWAL".to_string(),
                        "must be a non-negative decimal".to_string(),
                    )
                })?,
            None => Decimal::from_i64(1000),
        };

        let placement_max_depth = match env_map.get("PLACEMENT_MAX_DEPTH") {
            Some(raw) if !raw.trim().is_empty() => {
                let depth = raw.trim().parse::<u32>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "PLACEMENT_MAX_DEPTH".to_string(),
                        "must be a valid u32".to_string(),
                    )
                })?;
                if depth == 0 {
                    return Err(ConfigError::InvalidValue(
                        "PLACEMENT_MAX_DEPTH".to_string(),
                        "must be at least 1".to_string(),
                    ));
                }
                Some(depth)
            }
            _ => None,
        };

        let placement_retries = parse_or(&env_map, "PLACEMENT_RETRIES", 5u32, "must be a valid u32")?;
        if placement_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "PLACEMENT_RETRIES".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let tree_default_depth =
            parse_or(&env_map, "TREE_DEFAULT_DEPTH", 3u32, "must be a valid u32")?;
        let tree_max_depth = parse_or(&env_map, "TREE_MAX_DEPTH", 6u32, "must be a valid u32")?;
        if tree_default_depth == 0 || tree_default_depth > tree_max_depth {
            return Err(ConfigError::InvalidValue(
                "TREE_DEFAULT_DEPTH".to_string(),
                format!("must be between 1 and TREE_MAX_DEPTH ({})", tree_max_depth),
            ));
        }

        let session_ttl_ms = parse_or(
            &env_map,
            "SESSION_TTL_MS",
            7 * 86_400_000i64,
            "must be a valid i64",
        )?;
        if session_ttl_ms <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_MS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let notify = NotifyConfig {
            webhook_url: env_map
                .get("NOTIFY_WEBHOOK_URL")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            timeout_ms: parse_or(&env_map, "NOTIFY_TIMEOUT_MS", 5000u64, "must be a valid u64")?,
            max_elapsed_ms: parse_or(
                &env_map,
                "NOTIFY_MAX_ELAPSED_MS",
                30_000u64,
                "must be a valid u64",
            )?,
        };

        let matching_sweep_concurrency = parse_or(
            &env_map,
            "MATCHING_SWEEP_CONCURRENCY",
            8usize,
            "must be a valid usize",
        )?
        .max(1);

        let root = parse_root_account(&env_map)?;

        Ok(Config {
            port,
            database_path,
            min_withdrawal,
            placement_max_depth,
            placement_retries,
            tree_default_depth,
            tree_max_depth,
            session_ttl_ms,
            notify,
            matching_sweep_concurrency,
            root,
        })
    }

    /// Defaults suitable for tests and local runs against `database_path`.
    pub fn for_database(database_path: impl Into<String>) -> Self {
        Config {
            port: 8080,
            database_path: database_path.into(),
            min_withdrawal: Decimal::from_i64(1000),
            placement_max_depth: None,
            placement_retries: 5,
            tree_default_depth: 3,
            tree_max_depth: 6,
            session_ttl_ms: 7 * 86_400_000,
            notify: NotifyConfig {
                webhook_url: None,
                timeout_ms: 5000,
                max_elapsed_ms: 30_000,
            },
            matching_sweep_concurrency: 8,
            root: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string())),
        None => Ok(default),
    }
}

fn parse_root_account(env_map: &HashMap<String, String>) -> Result<Option<RootAccount>, ConfigError> {
    let email = env_map.get("ROOT_EMAIL").map(|s| s.trim().to_string());
    let password = env_map.get("ROOT_PASSWORD").cloned();

    match (email, password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            let name = env_map
                .get("ROOT_NAME")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Root".to_string());
            Ok(Some(RootAccount {
                name,
                email,
                password,
            }))
        }
        (None, None) => Ok(None),
        (Some(_), None) | (Some(_), Some(_)) => Err(ConfigError::MissingEnv(
            "ROOT_PASSWORD".to_string(),
        )),
        (None, Some(_)) => Err(ConfigError::MissingEnv("ROOT_EMAIL".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.min_withdrawal, Decimal::from_i64(1000));
        assert_eq!(config.placement_max_depth, None);
        assert_eq!(config.placement_retries, 5);
        assert_eq!(config.tree_default_depth, 3);
        assert_eq!(config.tree_max_depth, 6);
        assert!(config.notify.webhook_url.is_none());
        assert!(config.root.is_none());
    }

    #[test]
    fn test_for_database_matches_env_defaults() {
        let from_env = Config::from_env_map(setup_required_env()).unwrap();
        let direct = Config::for_database("/tmp/test.db");
        assert_eq!(direct.port, from_env.port);
        assert_eq!(direct.min_withdrawal, from_env.min_withdrawal);
        assert_eq!(direct.placement_retries, from_env.placement_retries);
        assert_eq!(direct.session_ttl_ms, from_env.session_ttl_ms);
        assert_eq!(direct.notify, from_env.notify);
        assert_eq!(
            direct.matching_sweep_concurrency,
            from_env.matching_sweep_concurrency
        );
    }

    #[test]
    fn test_missing_database_path() {
        let result = Config::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_min_withdrawal() {
        let mut env_map = setup_required_env();
        env_map.insert("MIN_WITHDRAWAL".to_string(), "-5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MIN_WITHDRAWAL"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_placement_depth_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("PLACEMENT_MAX_DEPTH".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PLACEMENT_MAX_DEPTH"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_default_depth_above_max_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("TREE_DEFAULT_DEPTH".to_string(), "9".to_string());
        env_map.insert("TREE_MAX_DEPTH".to_string(), "4".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TREE_DEFAULT_DEPTH"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_root_account_requires_password() {
        let mut env_map = setup_required_env();
        env_map.insert("ROOT_EMAIL".to_string(), "root@example.com".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "ROOT_PASSWORD"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_root_account_parsed() {
        let mut env_map = setup_required_env();
        env_map.insert("ROOT_EMAIL".to_string(), "root@example.com".to_string());
        env_map.insert("ROOT_PASSWORD".to_string(), "secret".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        let root = config.root.unwrap();
        assert_eq!(root.name, "Root");
        assert_eq!(root.email, "root@example.com");
    }
}

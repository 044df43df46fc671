use std::env;
use std::path::PathBuf;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailBackend {
    Console,
    File,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub mail: MailConfig,
    pub seed: SeedConfig,
    pub notify_workers: usize,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub default_from_email: String,
    pub backend: MailBackend,
    pub outbox_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub default_password: String,
    pub rng_seed: Option<u64>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            default_password: "password123".into(),
            rng_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://alx_travel.db".into());
        let default_from_email =
            lookup("DEFAULT_FROM_EMAIL").unwrap_or_else(|| "noreply@alxtravel.com".into());
        let backend = match lookup("MAIL_BACKEND").as_deref() {
            None | Some("console") => MailBackend::Console,
            Some("file") => MailBackend::File,
            Some(other) => {
                return Err(AppError::InvalidConfig(format!(
                    "MAIL_BACKEND must be 'console' or 'file', got '{}'",
                    other
                )))
            }
        };
        let outbox_dir = lookup("MAIL_OUTBOX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./outbox"));
        let notify_workers = match lookup("NOTIFY_WORKERS") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    AppError::InvalidConfig(format!(
                        "NOTIFY_WORKERS must be a positive integer, got '{}'",
                        raw
                    ))
                })?,
            None => 4,
        };
        let default_password =
            lookup("SEED_DEFAULT_PASSWORD").unwrap_or_else(|| "password123".into());
        let rng_seed = match lookup("SEED_RNG_SEED") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                AppError::InvalidConfig(format!("SEED_RNG_SEED must be a u64, got '{}'", raw))
            })?),
            None => None,
        };

        Ok(Self {
            database_url,
            mail: MailConfig {
                default_from_email,
                backend,
                outbox_dir,
            },
            seed: SeedConfig {
                default_password,
                rng_seed,
            },
            notify_workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://alx_travel.db");
        assert_eq!(config.mail.default_from_email, "noreply@alxtravel.com");
        assert_eq!(config.mail.backend, MailBackend::Console);
        assert_eq!(config.notify_workers, 4);
        assert_eq!(config.seed.default_password, "password123");
        assert_eq!(config.seed.rng_seed, None);
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("MAIL_BACKEND", "file"),
            ("MAIL_OUTBOX_DIR", "/tmp/outbox"),
            ("NOTIFY_WORKERS", "2"),
            ("SEED_RNG_SEED", "7"),
        ])
        .unwrap();
        assert_eq!(config.mail.backend, MailBackend::File);
        assert_eq!(config.mail.outbox_dir, PathBuf::from("/tmp/outbox"));
        assert_eq!(config.notify_workers, 2);
        assert_eq!(config.seed.rng_seed, Some(7));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            config_from(&[("NOTIFY_WORKERS", "0")]),
            Err(AppError::InvalidConfig(_))
        ));
        assert!(matches!(
            config_from(&[("MAIL_BACKEND", "smtp")]),
            Err(AppError::InvalidConfig(_))
        ));
        assert!(matches!(
            config_from(&[("SEED_RNG_SEED", "abc")]),
            Err(AppError::InvalidConfig(_))
        ));
    }
}

//! Configuration validation.

use super::Config;
use crate::error::{Result, UpsertError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.host.is_empty() {
        return Err(UpsertError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(UpsertError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(UpsertError::Config("target.user is required".into()));
    }
    match config.target.r#type.to_lowercase().as_str() {
        "mysql" | "mariadb" | "mssql" | "sqlserver" | "sql_server" => {}
        other => {
            return Err(UpsertError::Config(format!(
                "target.type must be 'mysql' or 'mssql', got '{}'",
                other
            )))
        }
    }

    if config.scheduler.max_workers == 0 {
        return Err(UpsertError::Config(
            "scheduler.max_workers must be at least 1".into(),
        ));
    }
    if config.scheduler.max_connections == 0 {
        return Err(UpsertError::Config(
            "scheduler.max_connections must be at least 1".into(),
        ));
    }
    if let Some(0) = config.upsert.chunk_size {
        return Err(UpsertError::Config(
            "upsert.chunk_size must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedulerConfig, TargetConfig};
    use crate::core::traits::Dialect;
    use crate::upsert::request::{NullPolicy, UpsertMode, UpsertOptions};

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                r#type: "mysql".to_string(),
                host: "localhost".to_string(),
                port: 3306,
                database: "market".to_string(),
                user: "loader".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
                trust_server_cert: false,
            },
            upsert: UpsertOptions::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "postgres".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_zero_workers_and_chunk() {
        let mut config = valid_config();
        config.scheduler.max_workers = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.upsert.chunk_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }

    #[test]
    fn test_from_yaml_applies_defaults() {
        let yaml = r#"
target:
  host: db.internal
  database: market
  user: loader
  password: secret
upsert:
  mode: IGNORE
  chunk_size: 1000
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.target.r#type, "mysql");
        assert_eq!(config.target.port, 3306);
        assert_eq!(config.upsert.mode, UpsertMode::Ignore);
        assert_eq!(config.upsert.null_policy, NullPolicy::New);
        assert_eq!(config.upsert.chunk_size, Some(1000));
        assert_eq!(config.scheduler.max_workers, 8);
        assert_eq!(config.scheduler.max_connections, 8);
        assert_eq!(config.dialect().unwrap().name(), "mysql");
    }

    #[test]
    fn test_from_yaml_rejects_bad_policy() {
        let yaml = r#"
target:
  host: db.internal
  database: market
  user: loader
upsert:
  null_policy: newest
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}

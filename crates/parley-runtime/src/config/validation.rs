//! Configuration validation utilities.

use figment::value::Value;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LogOutput, LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_bot(&config.bot)?;
    for (name, table) in &config.adapters {
        validate_adapter(name, table)?;
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_bot(bot: &BotConfig) -> ConfigResult<()> {
    if bot.prefixes.is_empty() {
        return Err(ConfigError::validation("At least one command prefix is required"));
    }
    for prefix in &bot.prefixes {
        if prefix.is_empty() {
            return Err(ConfigError::validation("Command prefixes cannot be empty"));
        }
        if prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Command prefix {prefix:?} cannot contain whitespace"
            )));
        }
    }

    for (field, ids) in [("bot.admins", &bot.admins), ("bot.moderators", &bot.moderators)] {
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::validation(format!("{field} contains an empty user id")));
        }
    }
    Ok(())
}

/// Checks the fields every adapter table shares: an enabled adapter needs its
/// token, and a webhook needs a usable port and path.
fn validate_adapter(name: &str, table: &Value) -> ConfigResult<()> {
    let enabled = table
        .find_ref("enabled")
        .and_then(Value::to_bool)
        .unwrap_or(true);
    if !enabled {
        return Ok(());
    }

    let token_field = match name {
        "discord" => Some("token"),
        "facebook" => Some("access_token"),
        _ => None,
    };
    if let Some(field) = token_field {
        let token = table.find_ref(field).and_then(Value::as_str).unwrap_or("");
        if token.trim().is_empty() {
            return Err(ConfigError::missing_field(format!("adapters.{name}.{field}")));
        }
    }

    if let Some(webhook) = table.find_ref("webhook") {
        if let Some(port) = webhook.find_ref("port") {
            let port = port
                .to_u128()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| {
                    ConfigError::validation(format!("adapters.{name}.webhook.port is not a port"))
                })?;
            if port == 0 {
                return Err(ConfigError::InvalidPort(port));
            }
        }
        if let Some(path) = webhook.find_ref("path").and_then(Value::as_str)
            && !path.starts_with('/')
        {
            return Err(ConfigError::validation(format!(
                "adapters.{name}.webhook.path must start with '/'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_adapters(yaml: &str) -> ParleyConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_prefixes() {
        let mut config = ParleyConfig::default();
        config.bot.prefixes = vec!["! ".into()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));

        config.bot.prefixes.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_role_ids() {
        let mut config = ParleyConfig::default();
        config.bot.admins = vec!["".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_enabled_adapter_needs_token() {
        let config = with_adapters("adapters:\n  discord:\n    intents: 1\n");
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "adapters.discord.token"
        ));

        let config = with_adapters("adapters:\n  discord:\n    enabled: false\n");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_webhook() {
        let config = with_adapters(
            "adapters:\n  facebook:\n    access_token: t\n    webhook:\n      port: 0\n",
        );
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidPort(0))));

        let config = with_adapters(
            "adapters:\n  facebook:\n    access_token: t\n    webhook:\n      path: hook\n",
        );
        assert!(validate_config(&config).is_err());

        let config = with_adapters(
            "adapters:\n  facebook:\n    access_token: t\n    webhook:\n      port: 9000\n      path: /hook\n",
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = ParleyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}

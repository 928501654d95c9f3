// =============================================================================
// Environment configuration — loaded once at boot
// =============================================================================
//
// All six variables are required (spec.md §6). A missing variable is fatal:
// the caller logs it and aborts startup, matching the teacher's "fail fast"
// discipline in `main.rs`.
// =============================================================================

use tracing::info;

use crate::error::EngineError;

/// Engine-wide configuration, read from the environment once at boot.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_public: String,
    pub api_private: String,
    pub dsn: String,
    pub port: String,
    pub tg_bot_url: String,
    pub tg_chat_id: i64,
}

impl Config {
    /// Load and validate all required environment variables.
    pub fn load() -> Result<Self, EngineError> {
        let api_public = required("APIPublic")?;
        let api_private = required("APIPrivate")?;
        let dsn = required("dsn")?;
        let port = required("port")?;
        let tg_bot_url = required("TgBotURL")?;
        let tg_chat_id_raw = required("TgChatID")?;
        let tg_chat_id = tg_chat_id_raw
            .parse::<i64>()
            .map_err(|_| EngineError::ConfigMissing("TgChatID"))?;

        info!(port = %port, "configuration loaded");

        Ok(Self {
            api_public,
            api_private,
            dsn,
            port,
            tg_bot_url,
            tg_chat_id,
        })
    }
}

fn required(key: &'static str) -> Result<String, EngineError> {
    std::env::var(key).map_err(|_| EngineError::ConfigMissing(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't race with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in ["APIPublic", "APIPrivate", "dsn", "port", "TgBotURL", "TgChatID"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_variable_is_config_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let err = Config::load().unwrap_err();
        assert!(matches!(err, EngineError::ConfigMissing(_)));
    }

    #[test]
    fn all_present_loads_successfully() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("APIPublic", "pub");
        std::env::set_var("APIPrivate", "priv");
        std::env::set_var("dsn", "postgres://localhost/x");
        std::env::set_var("port", "8080");
        std::env::set_var("TgBotURL", "123:abc");
        std::env::set_var("TgChatID", "555");

        let cfg = Config::load().expect("config should load");
        assert_eq!(cfg.port, "8080");
        assert_eq!(cfg.tg_chat_id, 555);
        clear_all();
    }

    #[test]
    fn non_integer_chat_id_is_config_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("APIPublic", "pub");
        std::env::set_var("APIPrivate", "priv");
        std::env::set_var("dsn", "postgres://localhost/x");
        std::env::set_var("port", "8080");
        std::env::set_var("TgBotURL", "123:abc");
        std::env::set_var("TgChatID", "not-a-number");

        let err = Config::load().unwrap_err();
        assert!(matches!(err, EngineError::ConfigMissing("TgChatID")));
        clear_all();
    }
}

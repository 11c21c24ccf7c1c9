//! Инициализация логирования для приложений, встраивающих доску.
//!
//! Сама доска пишет события через `tracing` и не навязывает подписчика;
//! этот модуль — готовый минимальный бутстрап для тех, кому не нужен свой.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Конфигурация логирования.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Минимальный уровень: trace / debug / info / warn / error.
    pub level: String,
    /// Выводить события в stderr.
    pub console_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            console_enabled: true,
        }
    }
}

impl LoggingConfig {
    /// Применяет переопределения из переменных окружения `BLACKBOARD_*`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BLACKBOARD_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(console) = std::env::var("BLACKBOARD_LOG_CONSOLE") {
            self.console_enabled = console != "0" && !console.eq_ignore_ascii_case("false");
        }
    }

    /// Проверяет конфигурацию перед установкой подписчика.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("unknown log level: {other}").into()),
        }
    }
}

/// Устанавливает глобальный подписчик `tracing` по конфигурации.
pub fn init_logging(mut config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.apply_env_overrides();
    config.validate()?;

    let filter = EnvFilter::try_new(&config.level)?;
    let console_layer = config
        .console_enabled
        .then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()?;

    tracing::info!(log_level = %config.level, "logging initialized");
    Ok(())
}

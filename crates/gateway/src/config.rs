use common::Environment;
use serde::Deserialize;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: i64 = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Service settings. The model path and input size are fixed and deliberately absent.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub otel_endpoint: Option<String>,
    /// Label text per class id, from a comma-separated `GATEWAY_CLASS_NAMES`.
    #[serde(default)]
    pub class_names: Vec<String>,
}

pub fn get_configuration() -> Result<Config, ::config::ConfigError> {
    let config = ::config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("bind_addr", DEFAULT_BIND_ADDR)?
        .set_default("max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES)?
        .add_source(
            ::config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("class_names"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}

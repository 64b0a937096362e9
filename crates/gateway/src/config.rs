use std::collections::BTreeMap;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub schema_dir: PathBuf,
    pub engine_url: String,
    pub engine_timeout_ms: u64,
    pub game_sources: BTreeMap<String, String>,
    pub cors_allowed_origins: CorsOrigins,
    pub domain_error_status: DomainErrorStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

/// Transport status used for DOMAIN_ERROR envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainErrorStatus {
    Ok,
    BadRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl GatewayConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("POPGATE_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("POPGATE_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "POPGATE_BIND_ADDR",
        )?;

        let schema_dir: PathBuf = kv
            .get("POPGATE_SCHEMA_DIR")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("games")
            .into();

        let engine_url = require_nonempty(kv, "POPGATE_ENGINE_URL")?;
        if !(engine_url.starts_with("http://") || engine_url.starts_with("https://")) {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "POPGATE_ENGINE_URL must be an http(s) URL".to_string(),
            });
        }
        let engine_url = engine_url.trim_end_matches('/').to_string();

        let engine_timeout_ms = parse_u64(
            kv.get("POPGATE_ENGINE_TIMEOUT_MS"),
            30_000,
            "POPGATE_ENGINE_TIMEOUT_MS",
        )?;
        if engine_timeout_ms == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "POPGATE_ENGINE_TIMEOUT_MS must be >= 1".to_string(),
            });
        }

        let game_sources = parse_game_sources(kv.get("POPGATE_GAME_SOURCES"))?;
        let cors_allowed_origins = parse_cors_origins(kv.get("POPGATE_CORS_ALLOWED_ORIGINS"));
        let domain_error_status = parse_domain_error_status(kv.get("POPGATE_DOMAIN_ERROR_STATUS"))?;

        Ok(Self {
            bind_addr,
            schema_dir,
            engine_url,
            engine_timeout_ms,
            game_sources,
            cors_allowed_origins,
            domain_error_status,
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    kv.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

/// `GAME=source` pairs separated by commas.
fn parse_game_sources(value: Option<&String>) -> Result<BTreeMap<String, String>, StartupError> {
    let raw = value.map(|s| s.trim()).unwrap_or("");

    let mut sources = BTreeMap::new();
    for entry in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let (game_id, source) = entry
            .split_once('=')
            .map(|(game_id, source)| (game_id.trim(), source.trim()))
            .filter(|(game_id, source)| !game_id.is_empty() && !source.is_empty())
            .ok_or_else(|| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "POPGATE_GAME_SOURCES entry '{}' must look like GAME=source",
                    entry
                ),
            })?;
        sources.insert(game_id.to_string(), source.to_string());
    }

    Ok(sources)
}

fn parse_cors_origins(value: Option<&String>) -> CorsOrigins {
    let raw = value.map(|s| s.trim()).filter(|s| !s.is_empty()).unwrap_or("*");

    let mut origins = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsOrigins::Any;
    }

    origins.sort();
    origins.dedup();
    CorsOrigins::List(origins)
}

fn parse_domain_error_status(value: Option<&String>) -> Result<DomainErrorStatus, StartupError> {
    let mode = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("ok");

    match mode {
        "ok" => Ok(DomainErrorStatus::Ok),
        "bad-request" => Ok(DomainErrorStatus::BadRequest),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "POPGATE_DOMAIN_ERROR_STATUS must be ok or bad-request".to_string(),
        }),
    }
}

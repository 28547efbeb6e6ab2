#![forbid(unsafe_code)]

use std::collections::HashMap;

use thiserror::Error;

pub const ENV_AUDIT_ENABLED: &str = "QUARRY_AUDIT_ENABLED";
pub const ENV_CATALOG_MAX_RESULTS: &str = "QUARRY_CATALOG_MAX_RESULTS";
pub const ENV_MAX_PAGE_ROWS: &str = "QUARRY_MAX_PAGE_ROWS";

const DEFAULT_CATALOG_MAX_RESULTS: u32 = 100;
const DEFAULT_MAX_PAGE_ROWS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ConfigError {
    pub code: &'static str,
    pub message: String,
}

fn invalid(message: String) -> ConfigError {
    ConfigError {
        code: "ERR_INVALID_CONFIG",
        message,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditWiringConfig {
    pub audit_enabled: bool,
    /// Applied when catalog parameters carry `maxResults == 0`.
    pub default_catalog_max_results: u32,
    /// Caps `endRow` on list and history reads; `0` disables the cap.
    pub max_page_rows: u32,
}

impl AuditWiringConfig {
    pub fn mvp_v1(audit_enabled: bool) -> Self {
        Self {
            audit_enabled,
            default_catalog_max_results: DEFAULT_CATALOG_MAX_RESULTS,
            max_page_rows: DEFAULT_MAX_PAGE_ROWS,
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        let kv: HashMap<String, String> = std::env::vars().collect();
        Self::from_kv(&kv)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::mvp_v1(true);
        Ok(Self {
            audit_enabled: parse_bool(
                kv.get(ENV_AUDIT_ENABLED),
                defaults.audit_enabled,
                ENV_AUDIT_ENABLED,
            )?,
            default_catalog_max_results: parse_u32(
                kv.get(ENV_CATALOG_MAX_RESULTS),
                defaults.default_catalog_max_results,
                ENV_CATALOG_MAX_RESULTS,
            )?,
            max_page_rows: parse_u32(
                kv.get(ENV_MAX_PAGE_ROWS),
                defaults.max_page_rows,
                ENV_MAX_PAGE_ROWS,
            )?,
        })
    }
}

fn parse_bool(
    value: Option<&String>,
    default: bool,
    key: &'static str,
) -> Result<bool, ConfigError> {
    match value.map(|v| v.trim()) {
        None | Some("") => Ok(default),
        Some("1" | "true" | "TRUE" | "yes" | "YES") => Ok(true),
        Some("0" | "false" | "FALSE" | "no" | "NO") => Ok(false),
        Some(_) => Err(invalid(format!("{key} must be a boolean"))),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid(format!("{key} must be an integer"))),
    }
}

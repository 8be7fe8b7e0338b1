//! Arbiter config loader (strict parsing).

pub mod schema;

use std::fs;

use arbiter_core::error::{ArbiterError, Result};

pub use schema::{ArbiterConfig, ExecutorSection, LedgerSection, OpsSection, PolicySection};

pub fn load_from_file(path: &str) -> Result<ArbiterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ArbiterError::InvalidConfig(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ArbiterConfig> {
    let cfg: ArbiterConfig = serde_yaml::from_str(s)
        .map_err(|e| ArbiterError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

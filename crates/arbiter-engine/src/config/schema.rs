use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use arbiter_core::error::{ArbiterError, Result};

use crate::executor::{RetryPolicy, MAX_RETRIES_CAP};
use crate::ledger::LedgerOptions;
use crate::policy::decode::MAX_DECODE_ATTEMPTS;
use crate::policy::EvalSettings;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArbiterConfig {
    pub version: u32,

    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub ledger: LedgerSection,

    #[serde(default)]
    pub ops: OpsSection,
}

impl ArbiterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ArbiterError::UnsupportedVersion);
        }
        self.executor.validate()?;
        self.policy.validate()?;
        self.ledger.validate()?;
        self.ops.validate()?;
        Ok(())
    }
}

fn invalid(msg: &str) -> ArbiterError {
    ArbiterError::InvalidConfig(msg.into())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl ExecutorSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=600_000).contains(&self.timeout_ms) {
            return Err(invalid("executor.timeout_ms must be between 10 and 600000"));
        }
        if self.max_retries > MAX_RETRIES_CAP {
            return Err(invalid("executor.max_retries must be at most 8"));
        }
        if !(1..=60_000).contains(&self.backoff_ms) {
            return Err(invalid("executor.backoff_ms must be between 1 and 60000"));
        }
        if !(1..=64 * 1024 * 1024).contains(&self.max_output_bytes) {
            return Err(invalid("executor.max_output_bytes must be between 1 and 64 MiB"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
            max_output_bytes: self.max_output_bytes,
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    250
}
fn default_max_output_bytes() -> usize {
    256 * 1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    #[serde(default = "default_pack_path")]
    pub pack_path: String,

    #[serde(default = "default_max_decode_attempts")]
    pub max_decode_attempts: u32,

    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            pack_path: default_pack_path(),
            max_decode_attempts: default_max_decode_attempts(),
            max_input_bytes: default_max_input_bytes(),
        }
    }
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        if self.pack_path.trim().is_empty() {
            return Err(invalid("policy.pack_path must not be empty"));
        }
        if self.max_decode_attempts > MAX_DECODE_ATTEMPTS {
            return Err(invalid("policy.max_decode_attempts must be at most 3"));
        }
        if !(1024..=16 * 1024 * 1024).contains(&self.max_input_bytes) {
            return Err(invalid("policy.max_input_bytes must be between 1 KiB and 16 MiB"));
        }
        Ok(())
    }

    pub fn eval_settings(&self) -> EvalSettings {
        EvalSettings {
            max_decode_attempts: self.max_decode_attempts,
            max_input_bytes: self.max_input_bytes,
        }
    }
}

fn default_pack_path() -> String {
    "policy.yaml".into()
}
fn default_max_decode_attempts() -> u32 {
    MAX_DECODE_ATTEMPTS
}
fn default_max_input_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSection {
    #[serde(default = "default_ledger_dir")]
    pub dir: String,

    /// Environment variable holding `k0` as 64 hex characters.
    #[serde(default = "default_key_env")]
    pub key_env: String,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// 0 disables automatic checkpoints.
    #[serde(default)]
    pub checkpoint_every: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            dir: default_ledger_dir(),
            key_env: default_key_env(),
            max_payload_bytes: default_max_payload_bytes(),
            checkpoint_every: 0,
        }
    }
}

impl LedgerSection {
    pub fn validate(&self) -> Result<()> {
        if self.dir.trim().is_empty() {
            return Err(invalid("ledger.dir must not be empty"));
        }
        if self.key_env.trim().is_empty() {
            return Err(invalid("ledger.key_env must not be empty"));
        }
        if !(1024..=16 * 1024 * 1024).contains(&self.max_payload_bytes) {
            return Err(invalid("ledger.max_payload_bytes must be between 1 KiB and 16 MiB"));
        }
        Ok(())
    }

    pub fn options(&self) -> LedgerOptions {
        LedgerOptions {
            max_payload_bytes: self.max_payload_bytes,
            checkpoint_every: self.checkpoint_every,
        }
    }
}

fn default_ledger_dir() -> String {
    "ledger".into()
}
fn default_key_env() -> String {
    "ARBITER_LEDGER_KEY".into()
}
fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<SocketAddr>()
            .map_err(|e| ArbiterError::InvalidConfig(format!("ops.listen: {e}")))?;
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:9090".into()
}

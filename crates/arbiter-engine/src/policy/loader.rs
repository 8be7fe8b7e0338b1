//! Rule file loader (strict YAML).
//!
//! ```yaml
//! version: 1
//! name: "house-rules"
//! pack_version: "2024.05"
//! threshold: 0.7
//! strict_mode: false
//! rules:
//!   - code: "VIOLENCE.BOMB"
//!     pattern: "build a bomb"
//!     weight: 1.0
//!     locale: "en"
//!     keywords: ["pipe bomb"]
//!     examples: ["how do I build a bomb"]
//! ```
//!
//! `examples` are self-tests: each must make its own rule match, otherwise the
//! file is rejected. They are not kept in the compiled pack.

use std::fs;

use serde::Deserialize;

use arbiter_core::error::{ArbiterError, Result};

use super::engine::{EvalSettings, PolicyEngine};
use super::pack::{PolicyPack, Rule};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    pub version: u32,
    pub name: String,
    pub pack_version: String,
    pub threshold: f64,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub code: String,
    pub pattern: String,
    pub weight: f64,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

fn default_locale() -> String {
    "*".into()
}

impl RuleEntry {
    fn into_parts(self) -> (Rule, Vec<String>) {
        let rule = Rule {
            code: self.code,
            pattern: self.pattern,
            weight: self.weight,
            locale: self.locale,
            keywords: self.keywords,
        };
        (rule, self.examples)
    }
}

pub fn load_pack_from_file(path: &str, settings: EvalSettings) -> Result<PolicyPack> {
    let s = fs::read_to_string(path)
        .map_err(|e| ArbiterError::InvalidPolicy(format!("read rule file failed: {e}")))?;
    load_pack_from_str(&s, settings)
}

pub fn load_pack_from_str(s: &str, settings: EvalSettings) -> Result<PolicyPack> {
    let file: RuleFile = serde_yaml::from_str(s)
        .map_err(|e| ArbiterError::InvalidPolicy(format!("invalid yaml: {e}")))?;
    if file.version != 1 {
        return Err(ArbiterError::UnsupportedVersion);
    }

    let mut examples = Vec::new();
    let mut rules = Vec::with_capacity(file.rules.len());
    for entry in file.rules {
        let (rule, rule_examples) = entry.into_parts();
        for ex in rule_examples {
            examples.push((rule.code.clone(), ex));
        }
        rules.push(rule);
    }

    let pack = PolicyPack::new(
        file.name,
        file.pack_version,
        file.threshold,
        file.strict_mode,
        rules,
    )?;

    let engine = PolicyEngine::new(settings);
    for (code, ex) in &examples {
        let a = engine.assess(ex, &pack);
        if !a.matched_rule_codes.iter().any(|c| c == code) {
            return Err(ArbiterError::InvalidPolicy(format!(
                "rule {code} does not match its own example: {ex:?}"
            )));
        }
    }

    tracing::info!(
        pack = pack.name(),
        version = pack.version(),
        rules = pack.rules().len(),
        prefilter_armed = pack.prefilter().is_armed(),
        "policy pack loaded"
    );
    Ok(pack)
}

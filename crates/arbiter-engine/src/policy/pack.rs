//! Versioned, immutable policy packs.
//!
//! A pack is compiled once (regexes, fuzzy keyword skeletons, prefilter
//! pieces) and then shared behind `Arc`. There is no mutation API: a new
//! version is a new `PolicyPack`.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::PolicyRef;

use super::fuzzy::{edit_budget, pigeonhole_pieces, MIN_FUZZY_LEN};
use super::normalize::{normalize, skeleton};
use super::prefilter::Prefilter;

/// Threshold multiplier applied when a pack runs in strict mode.
pub const STRICT_MODE_FACTOR: f64 = 0.75;

/// Compiled regexes are capped to keep adversarial patterns cheap.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Declarative rule as it appears in a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub code: String,
    pub pattern: String,
    pub weight: f64,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Extra fuzzy keywords (literal patterns are keywords already).
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_locale() -> String {
    "*".into()
}

impl Rule {
    pub fn new(code: impl Into<String>, pattern: impl Into<String>, weight: f64) -> Self {
        Self {
            code: code.into(),
            pattern: pattern.into(),
            weight,
            locale: default_locale(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Fuzzy keyword in skeleton form.
#[derive(Debug, Clone)]
pub(crate) struct Keyword {
    pub skeleton: Vec<char>,
    pub max_edits: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub code: String,
    pub weight: f64,
    pub regex: Regex,
    pub keywords: Vec<Keyword>,
}

/// Immutable, versioned rule set.
#[derive(Debug, Clone)]
pub struct PolicyPack {
    name: String,
    version: String,
    threshold: f64,
    strict_mode: bool,
    rules: Vec<Rule>,
    compiled: Vec<CompiledRule>,
    prefilter: Prefilter,
}

fn is_literal(pattern: &str) -> bool {
    regex::escape(pattern) == pattern
}

fn check_unit(what: &str, v: f64) -> Result<()> {
    if !v.is_finite() || !(0.0..=1.0).contains(&v) {
        return Err(ArbiterError::InvalidPolicy(format!(
            "{what} must be within [0, 1], got {v}"
        )));
    }
    Ok(())
}

impl PolicyPack {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        threshold: f64,
        strict_mode: bool,
        rules: Vec<Rule>,
    ) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        if name.trim().is_empty() || version.trim().is_empty() {
            return Err(ArbiterError::InvalidPolicy(
                "pack name and version must not be empty".into(),
            ));
        }
        check_unit("threshold", threshold)?;

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());
        let mut prefilter = Prefilter::armed();
        let mut armed = true;

        for r in &rules {
            if !seen.insert(r.code.as_str()) {
                return Err(ArbiterError::InvalidPolicy(format!(
                    "duplicate rule code: {}",
                    r.code
                )));
            }
            check_unit(&format!("rule {} weight", r.code), r.weight)?;

            let (rule, literal_skeleton) = compile_rule(r)?;
            match literal_skeleton {
                Some(skel) if !skel.is_empty() => prefilter.insert_piece(skel),
                _ => armed = false,
            }
            for kw in &rule.keywords {
                for piece in pigeonhole_pieces(&kw.skeleton, kw.max_edits + 1) {
                    prefilter.insert_piece(piece.chars().collect());
                }
            }
            compiled.push(rule);
        }

        if !armed {
            prefilter = Prefilter::disarmed();
        }

        Ok(Self {
            name,
            version,
            threshold,
            strict_mode,
            rules,
            compiled,
            prefilter,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Threshold actually used by the decision rule.
    pub fn effective_threshold(&self) -> f64 {
        if self.strict_mode {
            self.threshold * STRICT_MODE_FACTOR
        } else {
            self.threshold
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn prefilter(&self) -> &Prefilter {
        &self.prefilter
    }

    pub(crate) fn compiled(&self) -> &[CompiledRule] {
        &self.compiled
    }
}

/// Compile one rule. Returns the literal pattern's skeleton when the pattern
/// is literal, which the prefilter needs to stay sound.
fn compile_rule(r: &Rule) -> Result<(CompiledRule, Option<Vec<char>>)> {
    if r.code.trim().is_empty() {
        return Err(ArbiterError::InvalidPolicy("rule code must not be empty".into()));
    }
    if r.pattern.trim().is_empty() {
        return Err(ArbiterError::InvalidPolicy(format!(
            "rule {} has an empty pattern",
            r.code
        )));
    }

    let literal = is_literal(&r.pattern);
    let (source, case_insensitive) = if literal {
        (regex::escape(&normalize(&r.pattern)), false)
    } else {
        (r.pattern.clone(), true)
    };

    let regex = RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ArbiterError::InvalidPolicy(format!("rule {} regex: {e}", r.code)))?;

    let mut keyword_sources: Vec<&str> = r.keywords.iter().map(String::as_str).collect();
    if literal {
        keyword_sources.insert(0, r.pattern.as_str());
    }

    let mut keywords: Vec<Keyword> = Vec::new();
    for src in keyword_sources {
        let skel = skeleton(&normalize(src));
        if skel.len() < MIN_FUZZY_LEN || keywords.iter().any(|k| k.skeleton == skel) {
            continue;
        }
        keywords.push(Keyword {
            max_edits: edit_budget(skel.len()),
            skeleton: skel,
        });
    }

    let literal_skeleton = literal.then(|| skeleton(&normalize(&r.pattern)));

    Ok((
        CompiledRule {
            code: r.code.clone(),
            weight: r.weight,
            regex,
            keywords,
        },
        literal_skeleton,
    ))
}

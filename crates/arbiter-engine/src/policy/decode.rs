//! Bounded decoding of encoded substrings for rescoring.
//!
//! Candidates are taken from the *raw* text (base64 is case-sensitive), in a
//! fixed order: base64 runs, hex runs, then a ROT13 view. A run only becomes
//! a candidate once it decodes to printable UTF-8, so ordinary words that
//! happen to fit the base64 alphabet cannot use up the budget ahead of a real
//! payload. Screening decodes each run once, linear in the input. Each
//! candidate then costs one unit of budget when it is scored, and its text
//! may enqueue nested candidates. The budget is the only thing that lets
//! nesting continue, so work is linear in depth and hard-capped.
//!
//! A failed decode is never an error: the run is simply not a candidate.

use std::collections::VecDeque;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;

use super::normalize::rot13;

/// Hard ceiling on decode attempts per evaluation.
pub const MAX_DECODE_ATTEMPTS: u32 = 3;

/// Shortest run considered an encoded payload.
pub const MIN_ENCODED_RUN: usize = 8;

/// Decoded text must be at least this share printable to count as a view.
const MIN_PRINTABLE_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    Base64,
    Hex,
    Rot13,
}

/// One successfully decoded view of the input.
#[derive(Debug, Clone)]
pub struct DecodedView {
    pub kind: DecodeKind,
    pub text: String,
}

fn in_run_alphabet(c: char) -> bool {
    // Standard and URL-safe base64 alphabets (hex digits are a subset).
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '_' | '-')
}

/// Maximal alphabet runs of at least `MIN_ENCODED_RUN` chars, each with up
/// to two trailing `=` pads.
fn encoded_runs(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !in_run_alphabet(bytes[i] as char) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && in_run_alphabet(bytes[i] as char) {
            i += 1;
        }
        let body_end = i;
        let mut pads = 0;
        while pads < 2 && i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            pads += 1;
        }
        if body_end - start >= MIN_ENCODED_RUN {
            // Run bounds sit on ASCII bytes, so these are char boundaries.
            if let Some(run) = raw.get(start..i) {
                out.push(run);
            }
        }
    }
    out
}

/// True when `raw` yields at least one base64/hex decode attempt.
///
/// Together with the same check on the ROT13 view this covers every attempt
/// the queue can ever make beyond the plain ROT13 rotation itself.
pub fn has_decode_candidates(raw: &str) -> bool {
    !candidates(raw, false).is_empty()
}

fn candidates(raw: &str, with_rot13: bool) -> Vec<DecodedView> {
    let mut b64 = Vec::new();
    let mut hexes = Vec::new();

    for run in encoded_runs(raw) {
        let body = run.trim_end_matches('=');
        if body.len() % 2 == 0 && body.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Some(text) = hex::decode(body).ok().and_then(readable) {
                hexes.push(DecodedView {
                    kind: DecodeKind::Hex,
                    text,
                });
            }
        } else if run.len() % 4 == 0 || run.ends_with('=') {
            if let Some(text) = decode_base64(run).and_then(readable) {
                b64.push(DecodedView {
                    kind: DecodeKind::Base64,
                    text,
                });
            }
        }
    }

    let mut out = b64;
    out.append(&mut hexes);
    if with_rot13 && raw.chars().any(|c| c.is_ascii_alphabetic()) {
        out.push(DecodedView {
            kind: DecodeKind::Rot13,
            text: rot13(raw),
        });
    }
    out
}

fn decode_base64(run: &str) -> Option<Vec<u8>> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(run.as_bytes()).ok())
}

/// Printable UTF-8 or nothing.
fn readable(bytes: Vec<u8>) -> Option<String> {
    let text = String::from_utf8(bytes).ok()?;
    printable(&text).then_some(text)
}

fn printable(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let ok = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    (ok as f64) / (total as f64) >= MIN_PRINTABLE_RATIO
}

/// Lazily walks the decode queue; the caller decides when to stop pulling.
pub struct DecodeQueue {
    queue: VecDeque<DecodedView>,
    budget: u32,
    attempts: u32,
}

impl DecodeQueue {
    pub fn new(raw: &str, budget: u32) -> Self {
        Self {
            queue: candidates(raw, true).into(),
            budget: budget.min(MAX_DECODE_ATTEMPTS),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Spend one attempt on the next candidate; `None` once the budget or
    /// the queue is exhausted.
    pub fn next_attempt(&mut self) -> Option<DecodedView> {
        if self.attempts >= self.budget {
            return None;
        }
        let view = self.queue.pop_front()?;
        self.attempts += 1;
        // ROT13 is an involution; re-rotating its output only returns the input.
        let nested = candidates(&view.text, view.kind != DecodeKind::Rot13);
        self.queue.extend(nested);
        Some(view)
    }
}

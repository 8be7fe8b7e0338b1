//! Text normalization and skeleton projection.
//!
//! `normalize` collapses visually-equivalent encodings to one representation:
//! lowercase, NFKD, combining marks and invisible format characters removed,
//! whitespace runs folded to a single space. The pass is repeated until it
//! reaches a fixed point, so `normalize(normalize(x)) == normalize(x)`.
//!
//! `skeleton` is a lossy projection used only for fuzzy matching: leetspeak
//! digits/symbols fold to letters and every non-alphanumeric is dropped, so
//! `k.1.l l` and `kill` share the skeleton `kill`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Upper bound on normalization rounds. Real inputs settle in one or two.
const MAX_ROUNDS: usize = 8;

pub fn normalize(text: &str) -> String {
    let mut cur = normalize_once(text);
    for _ in 1..MAX_ROUNDS {
        let next = normalize_once(&cur);
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

fn normalize_once(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.nfkd() {
        if is_combining_mark(c) || is_invisible(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Zero-width and soft formatting characters used to split keywords invisibly.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{FEFF}'
    )
}

/// Leetspeak / symbol substitution back to the letter it imitates.
fn leet_fold(c: char) -> char {
    match c {
        '0' => 'o',
        '1' | '!' => 'i',
        '3' => 'e',
        '4' | '@' => 'a',
        '5' | '$' => 's',
        '7' | '+' => 't',
        '8' => 'b',
        '9' => 'g',
        '|' => 'l',
        other => other,
    }
}

/// Fuzzy-matching projection of already-normalized text.
pub fn skeleton(normalized: &str) -> Vec<char> {
    normalized
        .chars()
        .map(leet_fold)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// ROT13 over ASCII letters; everything else passes through.
pub fn rot13(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            other => other,
        })
        .collect()
}

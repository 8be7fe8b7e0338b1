//! Approximate keyword search over skeleton text.
//!
//! Uses the semi-global (Sellers) edit distance: the smallest Levenshtein
//! distance between the keyword and *any* substring of the text, in
//! `O(|text| * |keyword|)` time and `O(|keyword|)` space.

/// Keywords shorter than this are matched exactly only.
pub const MIN_FUZZY_LEN: usize = 3;

/// Edits tolerated for a keyword skeleton of length `len`.
pub fn edit_budget(len: usize) -> usize {
    match len {
        0..=3 => 0,
        4..=7 => 1,
        _ => 2,
    }
}

/// Best edit distance of `keyword` against any substring of `text`, if it is
/// within `max_edits`.
pub fn best_match(keyword: &[char], text: &[char], max_edits: usize) -> Option<usize> {
    let m = keyword.len();
    if m == 0 {
        return None;
    }

    // col[i] = distance between keyword[..i] and the best substring ending here.
    let mut col: Vec<usize> = (0..=m).collect();
    let mut best = col[m];

    for &t in text {
        let mut diag = col[0]; // value of col[i-1] from the previous column
        col[0] = 0; // a match may start anywhere
        for i in 1..=m {
            let cost = usize::from(keyword[i - 1] != t);
            let next = (diag + cost).min(col[i] + 1).min(col[i - 1] + 1);
            diag = col[i];
            col[i] = next;
        }
        best = best.min(col[m]);
        if best == 0 {
            break;
        }
    }

    (best <= max_edits).then_some(best)
}

/// Split `keyword` into `pieces` contiguous, near-equal, non-empty parts.
///
/// Any substring within `pieces - 1` edits of `keyword` contains at least one
/// of these parts verbatim.
pub fn pigeonhole_pieces(keyword: &[char], pieces: usize) -> Vec<String> {
    let pieces = pieces.clamp(1, keyword.len().max(1));
    let base = keyword.len() / pieces;
    let extra = keyword.len() % pieces;

    let mut out = Vec::with_capacity(pieces);
    let mut start = 0;
    for i in 0..pieces {
        let len = base + usize::from(i < extra);
        out.push(keyword[start..start + len].iter().collect());
        start += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn finds_keyword_inside_longer_text() {
        assert_eq!(best_match(&chars("attack"), &chars("weplantoattacknow"), 1), Some(0));
        assert_eq!(best_match(&chars("attack"), &chars("weplantoatackknow"), 1), Some(1));
        assert_eq!(best_match(&chars("attack"), &chars("peacefulday"), 1), None);
    }

    #[test]
    fn pieces_cover_keyword() {
        let p = pigeonhole_pieces(&chars("detonate"), 3);
        assert_eq!(p, vec!["det", "ona", "te"]);
        assert_eq!(p.concat(), "detonate");
    }
}

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use proptest::prelude::*;

use arbiter_engine::policy::{normalize, EvalSettings, PolicyEngine, PolicyPack, Rule};

fn rules() -> Vec<Rule> {
    vec![
        Rule::new("VIOLENCE.BOMB", "build a bomb", 1.0).with_keywords(&["pipe bomb"]),
        Rule::new("FRAUD.CARD", "stolen credit card", 0.8),
        Rule::new("SPAM.WORD", "viagra", 0.3),
    ]
}

fn armed_pack() -> PolicyPack {
    PolicyPack::new("p", "1", 0.7, false, rules()).unwrap()
}

/// Same rules plus a weightless regex rule, which keeps the prefilter off.
fn disarmed_pack() -> PolicyPack {
    let mut r = rules();
    r.push(Rule::new("NOOP", "(?:never){2}", 0.0));
    PolicyPack::new("p", "1", 0.7, false, r).unwrap()
}

fn fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "build", "bu1ld", "b.u.i.l.d", "a", "bomb", "b0mb", "pipe", "stolen", "credit",
        "card", "via", "gra", "v1agra", "ohvyq", "n", "obzo", " ", ".", "-", "x", "hello",
        "\u{200b}", "é", "ｂ", "aGVsbG8gd29ybGQ=", "6869",
    ])
}

proptest! {
    #[test]
    fn prefilter_never_skips_a_match(parts in prop::collection::vec(fragment(), 0..12)) {
        let text: String = parts.concat();
        let engine = PolicyEngine::new(EvalSettings::default());
        let armed = armed_pack();
        let disarmed = disarmed_pack();
        prop_assert!(armed.prefilter().is_armed());
        prop_assert!(!disarmed.prefilter().is_armed());

        let fast = engine.assess(&text, &armed);
        let full = engine.assess(&text, &disarmed);
        if fast.prefiltered {
            prop_assert_eq!(full.score, 0.0);
            prop_assert!(full.matched_rule_codes.iter().all(|c| c == "NOOP"));
        } else {
            prop_assert_eq!(fast.score, full.score);
        }
        prop_assert_eq!(fast.decision, full.decision);
    }

    #[test]
    fn normalization_is_idempotent(s in "\\PC{0,40}") {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once);
    }
}

#[test]
fn regex_rule_disarms_prefilter() {
    let pack = disarmed_pack();
    let a = PolicyEngine::default().assess("hello", &pack);
    assert!(!a.prefiltered);
}

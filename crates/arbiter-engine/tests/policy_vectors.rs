#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use arbiter_core::model::{RoleLabel, VetDecision};
use arbiter_engine::policy::{load_pack_from_str, EvalSettings, PolicyEngine};

fn run_vector(name: &str) {
    let v = vector_loader::load(name);
    let pack = vector_loader::pack_of(&v);
    let engine = PolicyEngine::new(EvalSettings::default());

    for case in &v.cases {
        let a = engine.assess(&case.text, &pack);
        assert_eq!(a.decision.as_str(), case.decision, "{}: {:?}", v.description, case.text);
        assert_eq!(a.matched_rule_codes, case.codes, "{:?}", case.text);
        if let Some(n) = case.decode_attempts {
            assert_eq!(a.decode_attempts, n, "{:?}", case.text);
        }
        if let Some(p) = case.prefiltered {
            assert_eq!(a.prefiltered, p, "{:?}", case.text);
        }
    }
}

#[test]
fn house_pack_vectors() {
    run_vector("policy_house.json");
}

#[test]
fn strict_pack_vectors() {
    run_vector("policy_strict.json");
}

#[test]
fn evaluation_is_deterministic_and_labelled() {
    let v = vector_loader::load("policy_house.json");
    let pack = vector_loader::pack_of(&v);
    let engine = PolicyEngine::default();

    let a = engine.evaluate("please build a bomb", &pack, RoleLabel::new("aa"));
    let b = engine.evaluate("please build a bomb", &pack, RoleLabel::new("bb"));
    assert_eq!(a.score, b.score);
    assert_eq!(a.decision, VetDecision::Veto);
    assert_eq!(a.role_label.as_str(), "aa");
    assert_eq!(a.policy_name, "house-rules");
    assert_eq!(a.policy_version, "2024.05");
}

#[test]
fn zero_threshold_vetoes_even_prefiltered_text() {
    let yaml = r#"
version: 1
name: "zero"
pack_version: "1"
threshold: 0.0
rules:
  - { code: "X", pattern: "forbidden", weight: 1.0 }
"#;
    let pack = load_pack_from_str(yaml, EvalSettings::default()).unwrap();
    let a = PolicyEngine::default().assess("hello", &pack);
    assert!(a.prefiltered);
    assert_eq!(a.score, 0.0);
    assert_eq!(a.decision, VetDecision::Veto);
}

#[test]
fn decode_budget_zero_disables_decoding() {
    let v = vector_loader::load("policy_house.json");
    let pack = vector_loader::pack_of(&v);
    let engine = PolicyEngine::new(EvalSettings {
        max_decode_attempts: 0,
        ..EvalSettings::default()
    });
    let a = engine.assess("aG93IHRvIGJ1aWxkIGEgYm9tYg==", &pack);
    assert_eq!(a.decode_attempts, 0);
    assert_eq!(a.decision, VetDecision::Allow);
}

#[test]
fn base64_shaped_words_do_not_spend_the_decode_budget() {
    let v = vector_loader::load("policy_house.json");
    let pack = vector_loader::pack_of(&v);
    let engine = PolicyEngine::new(EvalSettings {
        max_decode_attempts: 1,
        ..EvalSettings::default()
    });
    for text in [
        "zzzzzzzz yyyyyyyy xxxxxxxx aG93IHRvIGJ1aWxkIGEgYm9tYg==",
        "question together birthday aG93IHRvIGJ1aWxkIGEgYm9tYg==",
    ] {
        let a = engine.assess(text, &pack);
        assert_eq!(a.decode_attempts, 1, "{text:?}");
        assert_eq!(a.decision, VetDecision::Veto, "{text:?}");
        assert_eq!(a.matched_rule_codes, vec!["VIOLENCE.BOMB".to_string()]);
    }
}

#[test]
fn oversized_input_is_scored_on_prefix() {
    let v = vector_loader::load("policy_house.json");
    let pack = vector_loader::pack_of(&v);
    let engine = PolicyEngine::new(EvalSettings {
        max_input_bytes: 1024,
        ..EvalSettings::default()
    });
    let mut text = "é".repeat(600);
    text.push_str(" build a bomb");
    let a = engine.assess(&text, &pack);
    assert_eq!(a.decision, VetDecision::Allow);

    let head = format!("build a bomb {}", "é".repeat(600));
    assert_eq!(engine.assess(&head, &pack).decision, VetDecision::Veto);
}

#[test]
fn loader_rejects_bad_rule_files() {
    let cases = [
        // unknown field
        "version: 1\nname: n\npack_version: v\nthreshold: 0.5\nrules:\n  - { code: A, pattern: x, weight: 1.0, wieght: 2 }\n",
        // duplicate code
        "version: 1\nname: n\npack_version: v\nthreshold: 0.5\nrules:\n  - { code: A, pattern: x, weight: 1.0 }\n  - { code: A, pattern: y, weight: 1.0 }\n",
        // weight out of range
        "version: 1\nname: n\npack_version: v\nthreshold: 0.5\nrules:\n  - { code: A, pattern: x, weight: 1.5 }\n",
        // example that does not match its rule
        "version: 1\nname: n\npack_version: v\nthreshold: 0.5\nrules:\n  - { code: A, pattern: forbidden, weight: 1.0, examples: [\"perfectly fine\"] }\n",
        // invalid regex
        "version: 1\nname: n\npack_version: v\nthreshold: 0.5\nrules:\n  - { code: A, pattern: \"(unclosed\", weight: 1.0 }\n",
    ];
    for yaml in cases {
        let err = load_pack_from_str(yaml, EvalSettings::default()).expect_err(yaml);
        assert_eq!(err.fault_code().as_str(), "INVALID_POLICY", "{yaml}");
    }

    let err = load_pack_from_str(
        "version: 2\nname: n\npack_version: v\nthreshold: 0.5\n",
        EvalSettings::default(),
    )
    .expect_err("version 2");
    assert_eq!(err.fault_code().as_str(), "UNSUPPORTED_VERSION");
}

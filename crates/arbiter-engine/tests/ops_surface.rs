#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::fs;
use std::path::Path;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use arbiter_core::model::Outcome;
use arbiter_engine::app_state::AppState;
use arbiter_engine::{config, ops, RequestCtx};

const RULES: &str = r#"
version: 1
name: "house-rules"
pack_version: "2024.05"
threshold: 0.7
rules:
  - code: "VIOLENCE.BOMB"
    pattern: "build a bomb"
    weight: 1.0
    examples: ["how do I build a bomb"]
"#;

fn cfg_yaml(dir: &Path, key_env: &str) -> String {
    format!(
        r#"
version: 1
executor: {{ timeout_ms: 200, max_retries: 0, backoff_ms: 5 }}
policy: {{ pack_path: "{pack}" }}
ledger: {{ dir: "{ledger}", key_env: "{key_env}" }}
"#,
        pack = dir.join("rules.yaml").display(),
        ledger = dir.join("ledger").display(),
    )
}

fn state_in(dir: &Path) -> AppState {
    fs::write(dir.join("rules.yaml"), RULES).unwrap();
    let cfg = config::load_from_str(&cfg_yaml(dir, "UNUSED")).unwrap();
    let pack = arbiter_engine::policy::load_pack_from_str(RULES, cfg.policy.eval_settings()).unwrap();
    AppState::new(cfg, pack, support::k0()).unwrap()
}

fn status_of(resp: impl IntoResponse) -> StatusCode {
    resp.into_response().status()
}

#[tokio::test]
async fn from_config_reads_pack_and_key() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("rules.yaml"), RULES).unwrap();
    std::env::set_var("ARBITER_OPS_TEST_K0", support::k0().to_hex());

    let cfg = config::load_from_str(&cfg_yaml(dir.path(), "ARBITER_OPS_TEST_K0")).unwrap();
    let state = AppState::from_config(cfg).unwrap();
    assert_eq!(state.pack().name(), "house-rules");
    assert!(state.is_ready());

    let cfg = config::load_from_str(&cfg_yaml(dir.path(), "ARBITER_OPS_TEST_MISSING")).unwrap();
    let err = AppState::from_config(cfg).err().unwrap();
    assert_eq!(err.fault_code().as_str(), "INVALID_CONFIG");
}

#[tokio::test]
async fn readiness_tracks_ledger_health() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_in(dir.path());
    assert_eq!(status_of(ops::healthz().await), StatusCode::OK);
    assert_eq!(status_of(ops::readyz(State(state.clone())).await), StatusCode::OK);

    let (p, _) = support::replying("primary", "a calm answer");
    let (f, _) = support::replying("fallback", "unused");
    let d = state
        .arbiter()
        .arbitrate(p, f, RequestCtx::new(), &state.pack())
        .await
        .unwrap();
    assert_eq!(d.decision, Outcome::Approved);

    let resp = ops::verify_ledger(State(state.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let segment = dir.path().join("ledger").join("segment-000000.jsonl");
    let text = fs::read_to_string(&segment).unwrap();
    fs::write(&segment, text.replace("APPROVED", "FAILED")).unwrap();

    let resp = ops::verify_ledger(State(state.clone())).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(!state.is_ready());
    assert_eq!(
        status_of(ops::readyz(State(state.clone())).await),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert!(state
        .metrics_extra()
        .contains(&("arbiter_ledger_corrupted", 1)));
}

#[tokio::test]
async fn metrics_endpoint_reports_ledger_gauges() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_in(dir.path());
    let (p, _) = support::replying("primary", "fine");
    let (f, _) = support::replying("fallback", "fine");
    state
        .arbiter()
        .arbitrate(p, f, RequestCtx::new(), &state.pack())
        .await
        .unwrap();

    let resp = ops::metrics(State(state.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("arbiter_ledger_entries 1"));
    assert!(text.contains("arbiter_ledger_corrupted 0"));
    assert!(text.contains("arbiter_arbitrations_total{decision=\"APPROVED\"} 1"));
}

#[tokio::test]
async fn drain_seals_and_reports_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_in(dir.path());
    let (p, _) = support::replying("primary", "fine");
    let (f, _) = support::replying("fallback", "fine");
    state
        .arbiter()
        .arbitrate(p, f, RequestCtx::new(), &state.pack())
        .await
        .unwrap();

    let checkpoint = state.drain().await.unwrap();
    assert!(state.is_draining());
    assert_eq!(
        status_of(ops::readyz(State(state.clone())).await),
        StatusCode::SERVICE_UNAVAILABLE
    );

    let seal_path = dir.path().join("ledger").join("segment-000000.seal.json");
    let proof = arbiter_engine::ledger::read_seal_file(&seal_path).unwrap();
    assert_eq!(proof.entry_count, 1);
    assert_eq!(arbiter_engine::ledger::checkpoint_hash(&proof).unwrap(), checkpoint);
}

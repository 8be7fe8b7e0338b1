#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use arbiter_engine::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
executor:
  timeout_ms: 1000
  max_retires: 2 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.fault_code().as_str(), "INVALID_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.executor.max_retries, 2);
    assert_eq!(cfg.policy.max_decode_attempts, 3);
    assert_eq!(cfg.ledger.key_env, "ARBITER_LEDGER_KEY");
    assert_eq!(cfg.ledger.checkpoint_every, 0);
    assert_eq!(cfg.ops.listen, "127.0.0.1:9090");
}

#[test]
fn full_config_maps_to_runtime_settings() {
    let ok = r#"
version: 1
executor: { timeout_ms: 2000, max_retries: 3, backoff_ms: 50, max_output_bytes: 4096 }
policy: { pack_path: "rules/house.yaml", max_decode_attempts: 2, max_input_bytes: 65536 }
ledger: { dir: "/var/lib/arbiter", key_env: "K0", max_payload_bytes: 8192, checkpoint_every: 1000 }
ops: { listen: "0.0.0.0:9100" }
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let retry = cfg.executor.retry_policy();
    assert_eq!(retry.timeout, Duration::from_secs(2));
    assert_eq!(retry.max_retries, 3);
    assert_eq!(retry.backoff, Duration::from_millis(50));
    assert_eq!(retry.max_output_bytes, 4096);

    let eval = cfg.policy.eval_settings();
    assert_eq!(eval.max_decode_attempts, 2);
    assert_eq!(eval.max_input_bytes, 65536);

    let opts = cfg.ledger.options();
    assert_eq!(opts.max_payload_bytes, 8192);
    assert_eq!(opts.checkpoint_every, 1000);
}

#[test]
fn unsupported_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.fault_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn out_of_range_values_are_rejected() {
    for bad in [
        "version: 1\nexecutor: { max_retries: 9 }\n",
        "version: 1\nexecutor: { timeout_ms: 5 }\n",
        "version: 1\nexecutor: { backoff_ms: 0 }\n",
        "version: 1\npolicy: { max_decode_attempts: 4 }\n",
        "version: 1\nledger: { max_payload_bytes: 10 }\n",
        "version: 1\nledger: { key_env: \"\" }\n",
        "version: 1\nops: { listen: \"not-an-addr\" }\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.fault_code().as_str(), "INVALID_CONFIG", "{bad}");
    }
}

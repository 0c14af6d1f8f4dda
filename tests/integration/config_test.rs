//! Configuration loading

use exit_guard::config::{Config, ExecutionMode, LogFormat};
use rust_decimal_macros::dec;
use std::io::Write;

fn example_path() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml.example")
}

#[test]
fn test_example_config_loads_cleanly() {
    let config = Config::load(example_path()).unwrap();

    assert!(config.gaps.is_empty(), "{:?}", config.gaps);
    assert_eq!(config.session.utc_offset_minutes, 330);
    assert_eq!(config.capital.bands.len(), 4);
    assert_eq!(config.capital.policy_for("BANKNIFTY").lot_size, 35);
    assert_eq!(config.capital.policy_for("SENSEX").drawdown_floor_pct, dec!(1.5));
    assert_eq!(config.trailing.tiers.len(), 8);
    assert_eq!(config.halt.min_confidence, dec!(0.6));
    assert_eq!(config.execution.mode, ExecutionMode::Paper);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
}

#[test]
fn test_bad_section_degrades_to_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [executor]
        max_retries = "many"

        [breaker]
        exit_failure_threshold = 5
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.executor.max_retries, 3);
    assert_eq!(config.breaker.exit_failure_threshold, 5);
    assert_eq!(config.gaps.len(), 1);
    assert_eq!(config.gaps[0].section, "executor");
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_or_default(dir.path().join("absent.toml"));

    assert_eq!(config.capital.initial_balance, dec!(100000));
    assert_eq!(config.limits.stop_loss_pct, dec!(30));
    assert_eq!(config.gaps.len(), 1);
}

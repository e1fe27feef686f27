use std::io::Write;

use dartdbg_config::{AutoExpressionStrategy, ConfigError, DebuggerConfig};

#[test]
fn empty_file_yields_defaults() {
    let config = DebuggerConfig::from_toml_str("").unwrap();
    assert_eq!(config, DebuggerConfig::default());
}

#[test]
fn loads_sections_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "debug"
json = true

[data_view]
auto_expressions = true
auto_expression_strategy = "member-access"

[vm_service]
reply_timeout_ms = 250

[frames]
max_cached_frames = 8
"#
    )
    .unwrap();

    let config = DebuggerConfig::load(file.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert!(config.data_view.auto_expressions);
    assert_eq!(
        config.data_view.auto_expression_strategy,
        AutoExpressionStrategy::MemberAccess
    );
    assert_eq!(config.vm_service.reply_timeout_ms, 250);
    assert_eq!(config.vm_service.pending_capacity, 256);
    assert_eq!(config.frames.max_cached_frames, 8);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = DebuggerConfig::from_toml_str("[data_view]\nauto_expresions = true\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
}

#[test]
fn zero_timeout_is_invalid() {
    let err = DebuggerConfig::from_toml_str("[vm_service]\nreply_timeout_ms = 0\n").unwrap_err();
    match err {
        ConfigError::Invalid { key, .. } => assert_eq!(key, "vm_service.reply_timeout_ms"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dartdbg.toml");
    let err = DebuggerConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("dartdbg.toml"), "{err}");
}

use portus::config::{LogConfig, ServerConfig};
use portus::error::ConfigError;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults() {
    let config = ServerConfig::default();

    assert_eq!(config.port, 1316);
    assert_eq!(config.trigger_mode, 3);
    assert_eq!(config.idle_timeout(), Some(Duration::from_secs(60)));
    assert_eq!(config.worker_threads, 6);
    assert_eq!(config.max_connections, 65_536);
    assert_eq!(config.log, LogConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn partial_yaml_keeps_defaults() {
    let config = ServerConfig::from_yaml(
        "port: 8080\ntrigger_mode: 1\nresource_dir: /srv/www\nlog:\n  level: debug\n",
    )
    .unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.trigger_mode, 1);
    assert_eq!(config.resource_dir, PathBuf::from("/srv/www"));
    assert_eq!(config.log.level, "debug");
    assert!(config.log.enabled);
    assert_eq!(config.worker_threads, 6);
}

#[test]
fn empty_yaml_is_default() {
    assert_eq!(ServerConfig::from_yaml("  \n").unwrap(), ServerConfig::default());
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = ServerConfig::from_yaml("port: [not a number").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn unreadable_file_names_the_path() {
    let path = std::env::temp_dir().join("portus-no-such-config.yaml");
    let err = ServerConfig::from_file(&path).unwrap_err();

    match err {
        ConfigError::Read { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn overrides_take_precedence() {
    let mut config = ServerConfig::from_yaml("port: 8080\n").unwrap();

    config
        .apply_overrides(lookup(&[
            ("PORTUS_PORT", "9090"),
            ("PORTUS_TRIGGER_MODE", "0"),
            ("PORTUS_TIMEOUT_MS", "0"),
            ("PORTUS_WORKERS", " 2 "),
            ("PORTUS_RESOURCES", "/tmp/res"),
            ("PORTUS_LOG", "trace"),
        ]))
        .unwrap();

    assert_eq!(config.port, 9090);
    assert_eq!(config.trigger_mode, 0);
    assert_eq!(config.idle_timeout(), None);
    assert_eq!(config.worker_threads, 2);
    assert_eq!(config.resource_dir, PathBuf::from("/tmp/res"));
    assert_eq!(config.log.level, "trace");
}

#[test]
fn invalid_override_is_reported() {
    let mut config = ServerConfig::default();
    let err = config
        .apply_overrides(lookup(&[("PORTUS_PORT", "eighty")]))
        .unwrap_err();

    match err {
        ConfigError::InvalidOverride { key, value } => {
            assert_eq!(key, "PORTUS_PORT");
            assert_eq!(value, "eighty");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn validation_errors() {
    let config = ServerConfig {
        port: 80,
        ..ServerConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::ReservedPort(80))));

    let config = ServerConfig {
        worker_threads: 0,
        ..ServerConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));

    let config = ServerConfig {
        trigger_mode: 4,
        ..ServerConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::TriggerMode(4))));

    let config = ServerConfig {
        host: "localhost:80".to_owned(),
        ..ServerConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Host(_))));

    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn trigger_modes() {
    let modes: Vec<(bool, bool)> = (0..=3)
        .map(|trigger_mode| {
            let config = ServerConfig {
                trigger_mode,
                ..ServerConfig::default()
            };
            (config.listen_edge(), config.conn_edge())
        })
        .collect();

    assert_eq!(
        modes,
        vec![(false, false), (false, true), (true, false), (true, true)]
    );
}

#[test]
fn listen_addr_accepts_ipv6() {
    let config = ServerConfig {
        host: "::1".to_owned(),
        port: 4000,
        ..ServerConfig::default()
    };

    assert_eq!(config.listen_addr().unwrap(), "[::1]:4000".parse::<SocketAddr>().unwrap());
}

use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::load_config;
use super::settings::Settings;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.relay.period_ms, 100);
    assert_eq!(settings.relay.queue_size, 1);
    assert_eq!(settings.relay.handshake_retry_ms, 1000);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [relay]
        queue_size = 8
        write_timeout_ms = 500
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.relay.queue_size, 8);
    assert_eq!(cfg.relay.write_timeout_ms, 500);
    // untouched keys keep their defaults
    assert_eq!(cfg.relay.period_ms, 100);
    assert_eq!(cfg.relay.connection_queue_depth, 64);
}

#[test]
#[serial]
fn load_config_reads_prefixed_environment() {
    temp_env::with_vars(
        [
            ("VIZRELAY__SERVER__PORT", Some("9100")),
            ("VIZRELAY__RELAY__PERIOD_MS", Some("250")),
            ("VIZRELAY__LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.relay.period_ms, 250);
            assert_eq!(cfg.relay.period(), std::time::Duration::from_millis(250));
            assert_eq!(cfg.log.level, "debug");
        },
    );
}

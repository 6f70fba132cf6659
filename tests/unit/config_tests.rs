use std::time::Duration;

use agent_supervisor::config::BackoffKind;
use agent_supervisor::supervisor::BackoffPolicy;
use agent_supervisor::{AppError, SupervisorConfig};

fn sample_toml() -> &'static str {
    r#"
command = "node"
args = ["server.js", "--quiet"]
host = "127.0.0.1"
resource = "/tmp/agent-project"
data_dir = "/tmp/agent-data"

[env]
NODE_ENV = "development"

[api_server]
var = "AGENT_API_URL"
url = "http://localhost:9000"

[health]
path = "api/health"
backoff = "fixed"
delay_ms = 100
max_attempts = 20
request_timeout_ms = 500

[lock]
enabled = true
stale_check = false
retries = 3
retry_interval_ms = 250
"#
}

#[test]
fn parses_full_config() {
    let config = SupervisorConfig::from_toml_str(sample_toml()).expect("config should parse");

    assert_eq!(config.command, "node");
    assert_eq!(config.args, vec!["server.js", "--quiet"]);
    assert_eq!(config.env.get("NODE_ENV").map(String::as_str), Some("development"));
    assert_eq!(config.health.backoff, BackoffKind::Fixed);
    assert_eq!(config.request_timeout(), Duration::from_millis(500));

    let options = config.lock_options();
    assert!(!options.stale_check);
    assert_eq!(options.retries, 3);
    assert_eq!(options.retry_interval, Duration::from_millis(250));
    assert_eq!(
        config.lock_target().map(|p| p.to_string_lossy().into_owned()),
        Some("/tmp/agent-project".to_owned())
    );
}

#[test]
fn health_path_is_normalized() {
    let config = SupervisorConfig::from_toml_str(sample_toml()).expect("config should parse");
    assert_eq!(config.health.path, "/api/health");
}

#[test]
fn minimal_config_uses_defaults() {
    let config = SupervisorConfig::from_toml_str(r#"command = "agent""#).expect("minimal config");

    assert!(config.args.is_empty());
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.health.path, "/health");
    assert_eq!(config.health.max_attempts, 100);
    assert_eq!(config.health.delay_ms, 5);
    assert_eq!(config.health.backoff, BackoffKind::Linear);
    assert!(config.lock.enabled);
    assert!(config.lock.stale_check);
    assert_eq!(config.lock.retries, 0);
    assert!(config.lock_target().is_none(), "no resource means no lock");
}

#[test]
fn probe_maps_backoff_kind() {
    let linear = SupervisorConfig::from_toml_str(r#"command = "agent""#).expect("config");
    assert_eq!(linear.probe().max_attempts(), 100);
    assert_eq!(
        BackoffPolicy::Linear {
            base: Duration::from_millis(5)
        }
        .delay_for(3),
        Duration::from_millis(15)
    );

    let fixed = SupervisorConfig::from_toml_str(sample_toml()).expect("config");
    assert_eq!(fixed.probe().max_attempts(), 20);
}

#[test]
fn disabled_lock_has_no_target() {
    let raw = r#"
command = "agent"
resource = "/tmp/r"

[lock]
enabled = false
"#;
    let config = SupervisorConfig::from_toml_str(raw).expect("config");
    assert!(config.lock_target().is_none());
}

#[test]
fn launch_spec_carries_process_and_api_server() {
    let config = SupervisorConfig::from_toml_str(sample_toml()).expect("config");
    let spec = config.launch_spec();

    assert_eq!(spec.process.command, "node");
    assert_eq!(spec.process.args, vec!["server.js", "--quiet"]);
    assert_eq!(spec.host, "127.0.0.1");
    let api = spec.api_server.expect("api server configured");
    assert_eq!(api.var, "AGENT_API_URL");
    assert_eq!(api.url, "http://localhost:9000");
    assert_eq!(spec.probe.max_attempts(), 20);
}

#[test]
fn rejects_empty_command() {
    let err = SupervisorConfig::from_toml_str(r#"command = "  ""#).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("command")));
}

#[test]
fn rejects_zero_attempt_ceiling() {
    let raw = r#"
command = "agent"

[health]
max_attempts = 0
"#;
    let err = SupervisorConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("max_attempts")));
}

#[test]
fn rejects_api_server_var_shadowing_port() {
    let raw = r#"
command = "agent"

[api_server]
var = "PORT"
url = "http://localhost:1"
"#;
    let err = SupervisorConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_invalid_toml() {
    let err = SupervisorConfig::from_toml_str("command = [").unwrap_err();
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn load_from_missing_path_is_config_error() {
    let err = SupervisorConfig::load_from_path("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}

use anyhow::Result;
use nova::config::toml_config::RncMode;
use nova::utils::validation::Validate;
use nova::{NovaConfig, NovaError};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_config_file_with_env_substitution() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("nova.toml");
    std::env::set_var("NOVA_TEST_RNC_PASS", "s3cret");
    std::fs::write(
        &path,
        r#"
[default]
vendor = "VendorB"

[vendors.VendorB]
mpdra_ip = "172.16.0.1"
mpdra_user = "ua"
mpdra_pass = "pa"
mpdrz_ip = "172.16.0.2"
mpdrz_user = "uz"
mpdrz_pass = "pz"

[rnc]
host = "192.168.1.10"
rest_user = "admin"
rest_pass = "${NOVA_TEST_RNC_PASS}"
ssh_user = "tunnel"
ssh_pass = "${NOVA_TEST_UNSET_VAR}"

[events]
enabled = true
broker = "nats://127.0.0.1:4222"
topic = "tpce.notifications"
pacing_ms = 0
"#,
    )?;

    let config = NovaConfig::from_file(&path)?;
    config.validate()?;

    assert_eq!(config.rnc.rest_pass, "s3cret");
    assert_eq!(config.rnc.ssh_pass.as_deref(), Some("${NOVA_TEST_UNSET_VAR}"));
    assert_eq!(config.rnc.mode, RncMode::Tunnel);
    assert_eq!(config.rnc.heavy_timeout(), Duration::from_secs(180));
    assert_eq!(config.default_vendor(), "vendorb");
    assert_eq!(config.events.group, "nova");
    assert_eq!(config.events.pacing(), Duration::ZERO);
    assert_eq!(config.server.listen, "0.0.0.0:5000");
    Ok(())
}

#[test]
fn test_tunnel_mode_requires_ssh_credentials() -> Result<()> {
    let config = NovaConfig::from_str(
        r#"
[rnc]
host = "192.168.1.10"
rest_user = "admin"
rest_pass = "admin"
"#,
    )?;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("rnc.ssh_user"));
    Ok(())
}

#[test]
fn test_missing_file_is_config_error() {
    let err = NovaConfig::from_file("/nonexistent/nova.toml").unwrap_err();
    assert!(matches!(err, NovaError::ConfigError { .. }));
    assert_eq!(err.status_code(), 500);
}

#[test]
fn test_enabled_events_need_a_topic() -> Result<()> {
    let config = NovaConfig::from_str(
        r#"
[rnc]
host = "rnc"
mode = "direct"
rest_user = "admin"
rest_pass = "admin"

[events]
enabled = true
"#,
    )?;
    assert!(config.validate().is_err());
    Ok(())
}

//! Parsing of the Zabbix agent daemon configuration file.
//!
//! `zabbix_agentd.conf` is a flat `Key=Value` format with `#` comments.
//! The sender only needs the `ServerActive` target list (and `Hostname`
//! for callers that default the metric host), so this stays a minimal
//! line parser rather than a full configuration system.

use std::collections::HashMap;
use std::path::Path;

use crate::errors::ZbxError;
use crate::sender::DEFAULT_TRAPPER_PORT;

/// Conventional location of the agent configuration.
pub const DEFAULT_AGENT_CONFIG: &str = "/etc/zabbix/zabbix_agentd.conf";

/// Parsed `zabbix_agentd.conf` contents.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    entries: HashMap<String, String>,
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ZbxError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ZbxError::Config(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        let mut entries = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get("Hostname")
    }

    /// The trapper targets: `ServerActive` split on commas, each entry a
    /// `host[:port]` with port defaulting to 10051. Falls back to
    /// `Server` when `ServerActive` is absent.
    pub fn active_servers(&self) -> Result<Vec<(String, u16)>, ZbxError> {
        let raw = self
            .get("ServerActive")
            .or_else(|| self.get("Server"))
            .ok_or_else(|| {
                ZbxError::Config(
                    "neither ServerActive nor Server is configured".to_string(),
                )
            })?;

        raw.split(',')
            .map(|entry| {
                let entry = entry.trim();
                match entry.split_once(':') {
                    Some((host, port)) => port
                        .parse()
                        .map(|port| (host.to_string(), port))
                        .map_err(|_| {
                            ZbxError::Config(format!("invalid port in {entry:?}"))
                        }),
                    None => Ok((entry.to_string(), DEFAULT_TRAPPER_PORT)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# This is a configuration file for Zabbix agent daemon

PidFile=/var/run/zabbix/zabbix_agentd.pid
LogFile=/var/log/zabbix/zabbix_agentd.log
Server=127.0.0.1
ServerActive=192.168.1.2:10055, zabbix.example.com
Hostname=web01
";

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let config = AgentConfig::parse(SAMPLE);

        assert_eq!(config.get("PidFile"), Some("/var/run/zabbix/zabbix_agentd.pid"));
        assert_eq!(config.hostname(), Some("web01"));
        assert!(config.get("This").is_none());
    }

    #[test]
    fn test_active_servers_with_ports_and_defaults() {
        let config = AgentConfig::parse(SAMPLE);
        let servers = config.active_servers().unwrap();

        assert_eq!(
            servers,
            vec![
                ("192.168.1.2".to_string(), 10055),
                ("zabbix.example.com".to_string(), DEFAULT_TRAPPER_PORT),
            ]
        );
    }

    #[test]
    fn test_server_fallback_when_no_server_active() {
        let config = AgentConfig::parse("Server=10.0.0.5\n");
        let servers = config.active_servers().unwrap();

        assert_eq!(servers, vec![("10.0.0.5".to_string(), DEFAULT_TRAPPER_PORT)]);
    }

    #[test]
    fn test_missing_servers_is_a_config_error() {
        let config = AgentConfig::parse("Hostname=web01\n");

        assert!(matches!(
            config.active_servers(),
            Err(ZbxError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_port_is_a_config_error() {
        let config = AgentConfig::parse("ServerActive=zabbix.example.com:trapper\n");

        assert!(matches!(
            config.active_servers(),
            Err(ZbxError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.hostname(), Some("web01"));
        assert_eq!(config.active_servers().unwrap().len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_a_config_error() {
        assert!(matches!(
            AgentConfig::load("/nonexistent/zabbix_agentd.conf"),
            Err(ZbxError::Config(_))
        ));
    }
}

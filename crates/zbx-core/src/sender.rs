//! Zabbix sender protocol, for pushing metric values to a trapper port.
//!
//! The wire format is a `ZBXD` magic, a protocol byte, a little-endian
//! 64-bit payload length, and a JSON payload of
//! `{"request":"sender data","data":[...],"clock":...}`. The server
//! replies with the same framing around
//! `{"response":"success","info":"processed: ...; failed: ...; ..."}`.
//!
//! Metrics are sent in chunks (250 values per request, matching the
//! native `zabbix_sender`), and every chunk goes to every configured
//! target, so an agent-style `ServerActive` list with several servers
//! receives the same data on each.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::agentconf::AgentConfig;
use crate::errors::ZbxError;

/// Default trapper port of a Zabbix server or proxy.
pub const DEFAULT_TRAPPER_PORT: u16 = 10051;

/// Protocol magic plus the protocol version byte.
const ZBX_HEADER: &[u8; 5] = b"ZBXD\x01";
/// Magic + version + little-endian u64 payload length.
const ZBX_HEADER_LEN: usize = 13;

const DEFAULT_CHUNK_SIZE: usize = 250;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One measurement for a trapper item.
///
/// Values travel as strings regardless of the item's value type; `clock`
/// is Unix seconds and optional (the server stamps receipt time when it
/// is absent).
#[derive(Debug, Clone, Serialize)]
pub struct ZabbixMetric {
    pub host: String,
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<i64>,
}

impl ZabbixMetric {
    pub fn new(
        host: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            value: value.into(),
            clock: None,
        }
    }

    pub fn with_clock(mut self, clock: i64) -> Self {
        self.clock = Some(clock);
        self
    }
}

#[derive(Debug, Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: &'a [ZabbixMetric],
    clock: i64,
}

#[derive(Debug, Deserialize)]
struct SenderReply {
    response: String,
    #[serde(default)]
    info: Option<String>,
}

/// Aggregate outcome of a [`ZabbixSender::send`] call, summed over every
/// chunk sent to every target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderResponse {
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
    pub seconds_spent: f64,
    pub chunks: u64,
}

impl SenderResponse {
    fn absorb(&mut self, info: &str) -> Result<(), ZbxError> {
        let caps = info_pattern().captures(info).ok_or_else(|| {
            ZbxError::Protocol(format!("unparseable trapper summary: {info:?}"))
        })?;
        // capture groups are digit runs
        self.processed += caps[1].parse::<u64>().unwrap_or(0);
        self.failed += caps[2].parse::<u64>().unwrap_or(0);
        self.total += caps[3].parse::<u64>().unwrap_or(0);
        self.seconds_spent += caps[4].parse::<f64>().unwrap_or(0.0);
        self.chunks += 1;
        Ok(())
    }
}

impl fmt::Display for SenderResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed: {}; failed: {}; total: {}; seconds spent: {:.6}; chunks: {}",
            self.processed, self.failed, self.total, self.seconds_spent, self.chunks
        )
    }
}

fn info_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"processed: (\d+); failed: (\d+); total: (\d+); seconds spent: (\d+\.\d+)")
            .expect("summary pattern is a valid regex")
    })
}

fn frame_packet(payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ZBX_HEADER_LEN + payload.len());
    packet.extend_from_slice(ZBX_HEADER);
    packet.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Client for the trapper protocol.
pub struct ZabbixSender {
    targets: Vec<(String, u16)>,
    chunk_size: usize,
    timeout: Duration,
}

impl ZabbixSender {
    /// Sender with a single target.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            targets: vec![(server.into(), port)],
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sender targeting every `ServerActive` entry of a
    /// `zabbix_agentd.conf` (falling back to `Server`).
    pub fn from_agent_config(path: impl AsRef<Path>) -> Result<Self, ZbxError> {
        let config = AgentConfig::load(path)?;
        Ok(Self {
            targets: config.active_servers()?,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn targets(&self) -> &[(String, u16)] {
        &self.targets
    }

    /// Sends every metric to every configured target and returns the
    /// aggregated summary. An empty slice opens no connections.
    pub async fn send(&self, metrics: &[ZabbixMetric]) -> Result<SenderResponse, ZbxError> {
        let mut response = SenderResponse::default();
        for chunk in metrics.chunks(self.chunk_size) {
            for (host, port) in &self.targets {
                let reply = self.send_chunk(host, *port, chunk).await?;
                let info = reply.info.ok_or_else(|| {
                    ZbxError::Protocol("trapper response carried no summary".to_string())
                })?;
                response.absorb(&info)?;
            }
        }
        Ok(response)
    }

    async fn send_chunk(
        &self,
        host: &str,
        port: u16,
        metrics: &[ZabbixMetric],
    ) -> Result<SenderReply, ZbxError> {
        let payload = serde_json::to_vec(&SenderRequest {
            request: "sender data",
            data: metrics,
            clock: chrono::Utc::now().timestamp(),
        })?;
        let packet = frame_packet(&payload);

        log::debug!("sending {} values to {host}:{port}", metrics.len());
        let mut stream = timeout(self.timeout, TcpStream::connect((host, port))).await??;
        stream.write_all(&packet).await?;

        let mut header = [0u8; ZBX_HEADER_LEN];
        timeout(self.timeout, stream.read_exact(&mut header)).await??;
        if &header[..ZBX_HEADER.len()] != ZBX_HEADER {
            return Err(ZbxError::Protocol(
                "malformed trapper response header".to_string(),
            ));
        }
        let mut length = [0u8; 8];
        length.copy_from_slice(&header[ZBX_HEADER.len()..]);
        let body_len = u64::from_le_bytes(length) as usize;

        let mut body = vec![0u8; body_len];
        timeout(self.timeout, stream.read_exact(&mut body)).await??;
        let reply: SenderReply = serde_json::from_slice(&body).map_err(|e| {
            ZbxError::Protocol(format!("malformed trapper response body: {e}"))
        })?;
        log::debug!("trapper {host}:{port} answered {:?}", reply.info);

        if reply.response != "success" {
            return Err(ZbxError::Rejected(format!(
                "trapper {host}:{port} answered {:?}",
                reply.response
            )));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_packet_layout() {
        let packet = frame_packet(b"{}");

        assert_eq!(&packet[..5], b"ZBXD\x01");
        assert_eq!(&packet[5..13], &2u64.to_le_bytes());
        assert_eq!(&packet[13..], b"{}");
        assert_eq!(packet.len(), ZBX_HEADER_LEN + 2);
    }

    #[test]
    fn test_metric_serialization_skips_missing_clock() {
        let metric = ZabbixMetric::new("web01", "system.cpu.load", "1.25");
        let serialized = serde_json::to_value(&metric).unwrap();

        assert_eq!(
            serialized,
            json!({ "host": "web01", "key": "system.cpu.load", "value": "1.25" })
        );
    }

    #[test]
    fn test_metric_serialization_with_clock() {
        let metric = ZabbixMetric::new("web01", "system.cpu.load", "1.25").with_clock(1700000000);
        let serialized = serde_json::to_value(&metric).unwrap();

        assert_eq!(serialized["clock"], 1700000000);
    }

    #[test]
    fn test_sender_request_shape() {
        let metrics = vec![ZabbixMetric::new("web01", "key", "1")];
        let request = SenderRequest {
            request: "sender data",
            data: &metrics,
            clock: 1700000000,
        };

        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(serialized["request"], "sender data");
        assert_eq!(serialized["clock"], 1700000000);
        assert_eq!(serialized["data"].as_array().unwrap().len(), 1);
        assert_eq!(serialized["data"][0]["host"], "web01");
    }

    #[test]
    fn test_summary_parsing() {
        let mut response = SenderResponse::default();
        response
            .absorb("processed: 2; failed: 0; total: 2; seconds spent: 0.000100")
            .unwrap();

        assert_eq!(response.processed, 2);
        assert_eq!(response.failed, 0);
        assert_eq!(response.total, 2);
        assert!((response.seconds_spent - 0.0001).abs() < 1e-9);
        assert_eq!(response.chunks, 1);
    }

    #[test]
    fn test_summary_aggregation_over_chunks() {
        let mut response = SenderResponse::default();
        response
            .absorb("processed: 250; failed: 0; total: 250; seconds spent: 0.001000")
            .unwrap();
        response
            .absorb("processed: 249; failed: 1; total: 250; seconds spent: 0.002000")
            .unwrap();
        response
            .absorb("processed: 5; failed: 0; total: 5; seconds spent: 0.000500")
            .unwrap();

        assert_eq!(response.processed, 504);
        assert_eq!(response.failed, 1);
        assert_eq!(response.total, 505);
        assert_eq!(response.chunks, 3);
        assert!((response.seconds_spent - 0.0035).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_summary_is_an_error() {
        let mut response = SenderResponse::default();
        let result = response.absorb("status: fine");

        assert!(matches!(result, Err(ZbxError::Protocol(_))));
        assert_eq!(response.chunks, 0);
    }

    #[test]
    fn test_chunk_size_floor() {
        let sender = ZabbixSender::new("127.0.0.1", DEFAULT_TRAPPER_PORT).with_chunk_size(0);
        assert_eq!(sender.chunk_size, 1);
    }

    #[tokio::test]
    async fn test_empty_send_opens_no_connection() {
        // Port 9 on localhost has nothing listening; an attempted
        // connection would fail the send.
        let sender = ZabbixSender::new("127.0.0.1", 9);
        let response = sender.send(&[]).await.unwrap();

        assert_eq!(response, SenderResponse::default());
    }
}

//! Client library for the Zabbix monitoring system.
//!
//! This crate provides the two building blocks needed to integrate with a
//! Zabbix installation from Rust: a JSON-RPC client for the frontend API and
//! an implementation of the sender protocol used to push metric values to a
//! server or proxy trapper port. Both are async and share a single error
//! type, so applications can mix read-side automation (querying hosts,
//! resolving object ids) with write-side ingestion (trapping item values)
//! without juggling transports.
//!
//! # Architecture Overview
//!
//! The crate is organized around a small number of subsystems:
//!
//! - **API client** (`api`): JSON-RPC 2.0 over HTTP against
//!   `<url>/api_jsonrpc.php`, with session management and an object-id
//!   lookup helper
//! - **Sender** (`sender`): the binary trapper protocol, with chunking and
//!   multi-server fan-out
//! - **Agent configuration** (`agentconf`): parsing of `zabbix_agentd.conf`
//!   so the sender can reuse an agent's `ServerActive` targets
//! - **Sensitive-data hygiene** (`mask`): masking of passwords and session
//!   tokens before anything reaches a log line or an error payload

pub mod agentconf;
pub mod api;
pub mod errors;
pub mod mask;
pub mod sender;

pub use agentconf::AgentConfig;
pub use api::{ZabbixApi, ZabbixApiBuilder};
pub use errors::ZbxError;
pub use sender::{SenderResponse, ZabbixMetric, ZabbixSender};

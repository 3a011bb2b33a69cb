//! JSON-RPC client for the Zabbix frontend API.
//!
//! Implements the JSON-RPC 2.0 envelope spoken by `api_jsonrpc.php`:
//! session authentication via `user.login` (or `user.authenticate` on
//! pre-2.4 servers), arbitrary method invocation, the unauthenticated
//! `apiinfo.version` probe, and a lookup helper that resolves object names
//! to their numeric ids. Method names are passed as strings
//! (`call("host.get", ...)`); Zabbix exposes hundreds of `object.verb`
//! methods and the envelope is identical for all of them.
//!
//! Request and response bodies are logged at DEBUG with sensitive values
//! masked, and an API-level error carries a masked copy of the request
//! that produced it.

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::ZbxError;
use crate::mask::{self, HIDE_MASK};

const DEFAULT_URL: &str = "https://localhost/zabbix";
const DEFAULT_USER: &str = "Admin";
const DEFAULT_PASSWORD: &str = "zabbix";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Methods that must never carry a session token.
const UNAUTHENTICATED_METHODS: &[&str] =
    &["apiinfo.version", "user.login", "user.checkAuthentication"];

/// Whether `method` expects the session token in its envelope.
pub fn requires_auth(method: &str) -> bool {
    !UNAUTHENTICATED_METHODS.contains(&method)
}

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// The `error` member of a failed envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// Builder for [`ZabbixApi`].
///
/// Unset fields fall back to the `ZABBIX_URL`, `ZABBIX_USER` and
/// `ZABBIX_PASSWORD` environment variables, then to the stock frontend
/// defaults (`https://localhost/zabbix`, `Admin`, `zabbix`).
#[derive(Debug, Default)]
pub struct ZabbixApiBuilder {
    url: Option<String>,
    user: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    legacy_authenticate: bool,
    accept_invalid_certs: bool,
    basic_auth: Option<(String, String)>,
}

impl ZabbixApiBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Authenticate with `user.authenticate` instead of `user.login`
    /// (servers older than 2.4).
    pub fn legacy_authenticate(mut self, legacy: bool) -> Self {
        self.legacy_authenticate = legacy;
        self
    }

    /// Skip TLS certificate verification, for frontends behind
    /// self-signed certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// HTTP basic authentication in front of the Zabbix frontend.
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    pub fn build(self) -> Result<ZabbixApi, ZbxError> {
        let url = self
            .url
            .or_else(|| env::var("ZABBIX_URL").ok())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let user = self
            .user
            .or_else(|| env::var("ZABBIX_USER").ok())
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        let password = self
            .password
            .or_else(|| env::var("ZABBIX_PASSWORD").ok())
            .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| ZbxError::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoint = endpoint_url(&url);
        log::debug!("JSON-RPC server endpoint: {endpoint}");

        Ok(ZabbixApi {
            endpoint,
            client,
            user,
            password,
            legacy_authenticate: self.legacy_authenticate,
            basic_auth: self.basic_auth,
            auth: None,
            request_id: AtomicU64::new(1),
        })
    }
}

fn endpoint_url(url: &str) -> String {
    format!("{}/api_jsonrpc.php", url.trim_end_matches('/'))
}

/// Async client for the Zabbix frontend API.
pub struct ZabbixApi {
    endpoint: String,
    client: Client,
    user: String,
    password: String,
    legacy_authenticate: bool,
    basic_auth: Option<(String, String)>,
    auth: Option<String>,
    request_id: AtomicU64,
}

impl ZabbixApi {
    pub fn builder() -> ZabbixApiBuilder {
        ZabbixApiBuilder::default()
    }

    /// Client for `url` with credentials from the environment or the
    /// frontend defaults.
    pub fn new(url: impl Into<String>) -> Result<Self, ZbxError> {
        Self::builder().url(url).build()
    }

    /// The current session token, if a session is open.
    pub fn auth(&self) -> Option<&str> {
        self.auth.as_deref()
    }

    /// Opens a session with the configured credentials and stores the
    /// returned token for subsequent requests.
    pub async fn login(&mut self) -> Result<(), ZbxError> {
        log::debug!("ZabbixApi.login({},{})", self.user, HIDE_MASK);
        self.auth = None;

        let method = if self.legacy_authenticate {
            "user.authenticate"
        } else {
            "user.login"
        };
        let params = json!({ "user": self.user, "password": self.password });
        let response = self.do_request(method, Some(params)).await?;

        let token = response
            .result
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                ZbxError::Protocol("login response carried no session token".to_string())
            })?;
        self.auth = Some(token);
        Ok(())
    }

    /// Closes the session. A no-op when no session is open.
    pub async fn logout(&mut self) -> Result<(), ZbxError> {
        if self.auth.is_none() {
            return Ok(());
        }
        self.do_request("user.logout", Some(json!([]))).await?;
        self.auth = None;
        Ok(())
    }

    /// The server's API version string, via the unauthenticated
    /// `apiinfo.version` method.
    pub async fn api_version(&self) -> Result<String, ZbxError> {
        let response = self.do_request("apiinfo.version", None).await?;
        response
            .result
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                ZbxError::Protocol("apiinfo.version returned no version string".to_string())
            })
    }

    /// Invokes `method` and returns its `result` value.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ZbxError> {
        let response = self.do_request(method, params).await?;
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Sends one JSON-RPC envelope and returns the full response.
    ///
    /// The session token is attached to every method except the
    /// unauthenticated ones. An `error` member in the response maps to
    /// [`ZbxError::Api`] with the masked request attached.
    pub async fn do_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, ZbxError> {
        let auth = if requires_auth(method) {
            self.auth.clone()
        } else {
            None
        };
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params: params.unwrap_or_else(|| json!({})),
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            auth,
        };
        let request_json = serde_json::to_string(&request)?;
        log::debug!(
            "request {} -> {}",
            self.endpoint,
            mask::hide_sensitive(&request_json)
        );

        let mut http = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json-rpc")
            .body(request_json.clone());
        if let Some((user, password)) = &self.basic_auth {
            http = http.basic_auth(user, Some(password));
        }

        let http_response = http.send().await?;
        let status = http_response.status();
        if !status.is_success() {
            return Err(ZbxError::Transport(format!(
                "HTTP {status} from {}",
                self.endpoint
            )));
        }

        let body = http_response.text().await?;
        log::debug!("response body: {}", mask::hide_sensitive(&body));

        let response: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            ZbxError::Protocol(format!("malformed JSON-RPC response: {e}"))
        })?;

        if let Some(error) = &response.error {
            return Err(ZbxError::Api {
                code: error.code,
                message: error.message.clone(),
                data: error.data.clone(),
                json: mask::hide_sensitive(&request_json),
            });
        }
        Ok(response)
    }

    /// Resolves an object name to its numeric id via `<object_type>.get`.
    ///
    /// Returns `Some(id)` only when exactly one object matches. An
    /// optional `hostid` narrows the filter for host-scoped object types
    /// such as items.
    pub async fn get_id(
        &self,
        object_type: &str,
        name: &str,
        hostid: Option<u64>,
    ) -> Result<Option<u64>, ZbxError> {
        let mut filter = serde_json::Map::new();
        filter.insert(filter_field(object_type).to_string(), json!(name));
        if let Some(hostid) = hostid {
            filter.insert("hostid".to_string(), json!(hostid.to_string()));
        }
        let params = json!({ "filter": filter, "output": "extend" });

        let response = self
            .do_request(&format!("{object_type}.get"), Some(params))
            .await?;
        let rows = match response.result {
            Some(Value::Array(rows)) => rows,
            _ => return Ok(None),
        };
        if rows.len() != 1 {
            return Ok(None);
        }
        Ok(parse_object_id(&rows[0], &id_field(object_type)))
    }
}

/// The field `<object_type>.get` filters on when looking up by name.
fn filter_field(object_type: &str) -> &'static str {
    match object_type {
        "trigger" | "triggerprototype" | "mediatype" => "description",
        "user" => "alias",
        "usermacro" => "macro",
        _ => "name",
    }
}

/// The field carrying the object's id in `<object_type>.get` rows.
fn id_field(object_type: &str) -> String {
    match object_type {
        "discoveryrule" | "itemprototype" => "itemid".to_string(),
        "graphprototype" => "graphid".to_string(),
        "hostgroup" => "groupid".to_string(),
        "triggerprototype" => "triggerid".to_string(),
        "usergroup" => "usrgrpid".to_string(),
        "usermacro" => "hostmacroid".to_string(),
        _ => format!("{object_type}id"),
    }
}

// Ids arrive as JSON strings ("23298") from the frontend; numbers are
// accepted as well.
fn parse_object_id(row: &Value, field: &str) -> Option<u64> {
    match row.get(field) {
        Some(Value::String(id)) => id.parse().ok(),
        Some(Value::Number(id)) => id.as_u64(),
        _ => None,
    }
}

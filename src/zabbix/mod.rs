//! Client for the Zabbix JSON-RPC API.
//!
//! Every remote object kind the provider manages has a typed struct here and a
//! small set of methods on [`ZabbixApi`] (`<kind>s_get`, `<kind>s_create`,
//! `<kind>s_update`, `<kind>s_delete_by_ids`). All of them go through
//! [`ZabbixApi::call`], which frames the JSON-RPC 2.0 request, attaches the
//! session token obtained by [`ZabbixApi::login`] and unwraps the result.
//!
//! # Example
//!
//! ```ignore
//! use zabbix_provider::zabbix::{Params, ZabbixApi, ZabbixConfig};
//!
//! let api = ZabbixApi::new(ZabbixConfig::new("https://zabbix.example.com/api_jsonrpc.php"))?;
//! api.login("Admin", "zabbix").await?;
//!
//! let mut params = Params::new();
//! params.insert("filter".into(), serde_json::json!({"name": "Linux servers"}));
//! let groups = api.hostgroups_get(params).await?;
//! ```

mod application;
mod error;
mod host;
mod hostgroup;
mod item;
mod proxy;
mod template;
mod trigger;

pub use application::Application;
pub use error::ZabbixError;
pub use host::{GroupRef, Host, HostInterface, Macro, SnmpDetails, TemplateRef};
pub use hostgroup::HostGroup;
pub use item::{Item, Preprocessor};
pub use proxy::Proxy;
pub use template::Template;
pub use trigger::{Trigger, TriggerRef};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use reqwest::header::CONTENT_TYPE;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

/// Parameter object passed to an API method.
pub type Params = serde_json::Map<String, Value>;

/// Settings used to build a [`ZabbixApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZabbixConfig {
    /// Full URL of the JSON-RPC endpoint, usually ending in `api_jsonrpc.php`.
    pub url: String,
    /// Skip TLS certificate verification.
    pub tls_no_verify: bool,
    /// Send at most one request at a time.
    pub serialize: bool,
}

impl ZabbixConfig {
    /// Create a config for the given endpoint with verification on and
    /// concurrent requests allowed.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tls_no_verify: false,
            serialize: false,
        }
    }

    /// Enable or disable TLS certificate verification bypass.
    pub fn with_tls_no_verify(mut self, tls_no_verify: bool) -> Self {
        self.tls_no_verify = tls_no_verify;
        self
    }

    /// Enable or disable request serialization.
    pub fn with_serialize(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }
}

#[derive(Serialize)]
struct RpcRequest<'a, P: ?Sized> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a P,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a str>,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

/// Handle to a Zabbix server.
pub struct ZabbixApi {
    http: reqwest::Client,
    url: String,
    auth: RwLock<Option<String>>,
    next_id: AtomicU64,
    serialize: Option<Mutex<()>>,
}

impl std::fmt::Debug for ZabbixApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZabbixApi")
            .field("url", &self.url)
            .field("serialize", &self.serialize.is_some())
            .finish_non_exhaustive()
    }
}

impl ZabbixApi {
    /// Build a client. No request is sent until the first call.
    pub fn new(config: ZabbixConfig) -> Result<Self, ZabbixError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.tls_no_verify)
            .build()
            .map_err(ZabbixError::Client)?;

        Ok(Self {
            http,
            url: config.url,
            auth: RwLock::new(None),
            next_id: AtomicU64::new(1),
            serialize: config.serialize.then(|| Mutex::new(())),
        })
    }

    /// Whether requests are sent one at a time.
    pub fn serializes_requests(&self) -> bool {
        self.serialize.is_some()
    }

    /// Log in and keep the returned session token for subsequent calls.
    pub async fn login(&self, user: &str, password: &str) -> Result<String, ZabbixError> {
        let mut params = Params::new();
        params.insert("user".to_string(), Value::from(user));
        params.insert("password".to_string(), Value::from(password));

        let token: String = self.request("user.login", &params, None).await?;
        *self.auth.write().await = Some(token.clone());
        Ok(token)
    }

    /// Whether a session token is held.
    pub async fn is_logged_in(&self) -> bool {
        self.auth.read().await.is_some()
    }

    /// Return the API version reported by the server. Does not need a session.
    pub async fn version(&self) -> Result<String, ZabbixError> {
        self.request("apiinfo.version", &Params::new(), None).await
    }

    /// Call an API method with the current session token.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, ZabbixError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let auth = self.auth.read().await.clone();
        self.request(method, params, auth.as_deref()).await
    }

    #[instrument(skip(self, params, auth), name = "zabbix.call")]
    async fn request<P, R>(
        &self,
        method: &str,
        params: &P,
        auth: Option<&str>,
    ) -> Result<R, ZabbixError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let _serialized = match &self.serialize {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            auth,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let body = serde_json::to_vec(&request).map_err(ZabbixError::Encode)?;

        let started = Instant::now();
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json-rpc")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "API call completed"
        );

        if let Some(err) = response.error {
            return Err(ZabbixError::Api {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        let result = response.result.ok_or_else(|| {
            ZabbixError::MalformedResponse(format!("{method} returned neither result nor error"))
        })?;
        serde_json::from_value(result).map_err(ZabbixError::Decode)
    }

    pub(crate) async fn get_objects<T>(
        &self,
        method: &str,
        params: Params,
    ) -> Result<Vec<T>, ZabbixError>
    where
        T: DeserializeOwned,
    {
        self.call(method, &params).await
    }

    pub(crate) async fn create_objects<T>(
        &self,
        method: &str,
        objects: &[T],
        id_key: &str,
    ) -> Result<Vec<String>, ZabbixError>
    where
        T: Serialize + Sync,
    {
        let result: Value = self.call(method, objects).await?;
        let ids = extract_ids(&result, id_key)?;
        if ids.len() != objects.len() {
            return Err(ZabbixError::MalformedResponse(format!(
                "{method} returned {} id(s) for {} object(s)",
                ids.len(),
                objects.len()
            )));
        }
        Ok(ids)
    }

    pub(crate) async fn update_objects<T>(
        &self,
        method: &str,
        objects: &[T],
        id_key: &str,
    ) -> Result<(), ZabbixError>
    where
        T: Serialize + Sync,
    {
        let result: Value = self.call(method, objects).await?;
        extract_ids(&result, id_key)?;
        Ok(())
    }

    pub(crate) async fn delete_ids(
        &self,
        method: &str,
        ids: &[String],
        id_key: &str,
    ) -> Result<(), ZabbixError> {
        let result: Value = self.call(method, ids).await?;
        extract_ids(&result, id_key)?;
        Ok(())
    }
}

/// Pull the id list out of a create/update/delete result such as
/// `{"hostids": ["10084"]}`. Some server versions return numbers.
fn extract_ids(result: &Value, id_key: &str) -> Result<Vec<String>, ZabbixError> {
    let ids = result
        .get(id_key)
        .and_then(Value::as_array)
        .ok_or_else(|| ZabbixError::MalformedResponse(format!("missing {id_key} in result")))?;

    ids.iter()
        .map(|id| match id {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(ZabbixError::MalformedResponse(format!(
                "unexpected id {other} in {id_key}"
            ))),
        })
        .collect()
}

/// Accept either a list of ids (`["1", "2"]`) or a list of reference objects
/// (`[{"applicationid": "1"}]`) as returned by the `select*` get options.
pub(crate) fn ids_or_refs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Id(String),
        Ref(serde_json::Map<String, Value>),
    }

    let entries = Vec::<Entry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Entry::Id(id) => Some(id),
            Entry::Ref(map) => map
                .into_iter()
                .find(|(key, _)| key.ends_with("id"))
                .and_then(|(_, value)| value.as_str().map(str::to_owned)),
        })
        .collect())
}

/// The API renders empty objects as `[]`; treat anything that is not an
/// object as the default value.
pub(crate) fn object_or_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(T::default()),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! wiremock helpers that answer JSON-RPC calls by method name.

    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ZabbixApi, ZabbixConfig};

    /// Start a mock server and a client pointed at it.
    pub(crate) async fn server() -> (MockServer, ZabbixApi) {
        let server = MockServer::start().await;
        let api = ZabbixApi::new(ZabbixConfig::new(endpoint(&server))).unwrap();
        (server, api)
    }

    /// URL of the JSON-RPC endpoint on the mock server.
    pub(crate) fn endpoint(server: &MockServer) -> String {
        format!("{}/api_jsonrpc.php", server.uri())
    }

    /// Answer every call of `rpc_method` with `result`.
    pub(crate) async fn respond(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "result": result, "id": 1})),
            )
            .mount(server)
            .await;
    }

    /// Answer calls of `rpc_method` whose body contains `params` with `result`.
    pub(crate) async fn respond_to(
        server: &MockServer,
        rpc_method: &str,
        params: Value,
        result: Value,
    ) {
        Mock::given(method("POST"))
            .and(body_partial_json(
                json!({ "method": rpc_method, "params": params }),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "result": result, "id": 1})),
            )
            .mount(server)
            .await;
    }

    /// Answer every call of `rpc_method` with a JSON-RPC error.
    pub(crate) async fn respond_error(server: &MockServer, rpc_method: &str, code: i64, data: &str) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "error": {"code": code, "message": "Invalid params.", "data": data},
                "id": 1
            })))
            .mount(server)
            .await;
    }

    /// Body of the first received request for `rpc_method`.
    pub(crate) async fn request_body(server: &MockServer, rpc_method: &str) -> Value {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|req| serde_json::from_slice::<Value>(&req.body).ok())
            .find(|body| body["method"] == rpc_method)
            .unwrap_or_else(|| panic!("no {rpc_method} request received"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_login_stores_token_and_sends_it() {
        let (server, api) = mock::server().await;
        mock::respond(&server, "user.login", json!("0424bd59b807674191e7d77572075f33")).await;
        mock::respond(&server, "hostgroup.get", json!([])).await;

        let token = api.login("Admin", "zabbix").await.unwrap();
        assert_eq!(token, "0424bd59b807674191e7d77572075f33");
        assert!(api.is_logged_in().await);

        let groups = api.hostgroups_get(Params::new()).await.unwrap();
        assert!(groups.is_empty());

        let login = mock::request_body(&server, "user.login").await;
        assert_eq!(login["params"], json!({"user": "Admin", "password": "zabbix"}));
        assert!(login.get("auth").is_none());

        let get = mock::request_body(&server, "hostgroup.get").await;
        assert_eq!(get["auth"], "0424bd59b807674191e7d77572075f33");
        assert_eq!(get["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn test_requests_use_json_rpc_content_type() {
        let (server, api) = mock::server().await;
        Mock::given(method("POST"))
            .and(header("Content-Type", "application/json-rpc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "result": "5.0.12", "id": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(api.version().await.unwrap(), "5.0.12");
    }

    #[tokio::test]
    async fn test_api_error_is_returned_verbatim() {
        let (server, api) = mock::server().await;
        mock::respond_error(&server, "user.login", -32602, "Login name or password is incorrect.")
            .await;

        let err = api.login("Admin", "wrong").await.unwrap_err();
        match err {
            ZabbixError::Api { code, ref data, .. } => {
                assert_eq!(code, -32602);
                assert_eq!(data, "Login name or password is incorrect.");
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!api.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let (server, api) = mock::server().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = api.version().await.unwrap_err();
        assert!(matches!(err, ZabbixError::Http(_)));
    }

    #[tokio::test]
    async fn test_serialized_client_still_completes_concurrent_calls() {
        let server = wiremock::MockServer::start().await;
        let api = ZabbixApi::new(
            ZabbixConfig::new(mock::endpoint(&server)).with_serialize(true),
        )
        .unwrap();
        assert!(api.serializes_requests());
        mock::respond(&server, "apiinfo.version", json!("5.0.12")).await;

        let (a, b) = tokio::join!(api.version(), api.version());
        assert_eq!(a.unwrap(), "5.0.12");
        assert_eq!(b.unwrap(), "5.0.12");
    }

    #[test]
    fn test_extract_ids_accepts_strings_and_numbers() {
        let ids = extract_ids(&json!({"itemids": ["23296", 23297]}), "itemids").unwrap();
        assert_eq!(ids, vec!["23296".to_string(), "23297".to_string()]);

        let err = extract_ids(&json!({"hostids": ["1"]}), "itemids").unwrap_err();
        assert!(matches!(err, ZabbixError::MalformedResponse(_)));
    }

    #[test]
    fn test_ids_or_refs_handles_both_shapes() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "ids_or_refs")]
            ids: Vec<String>,
        }

        let plain: Wrapper = serde_json::from_value(json!({"ids": ["1", "2"]})).unwrap();
        assert_eq!(plain.ids, vec!["1", "2"]);

        let refs: Wrapper =
            serde_json::from_value(json!({"ids": [{"applicationid": "7"}]})).unwrap();
        assert_eq!(refs.ids, vec!["7"]);
    }
}

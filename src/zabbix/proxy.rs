use serde::{Deserialize, Serialize};

use super::{Params, ZabbixApi, ZabbixError};

/// A Zabbix proxy. Proxies are only ever looked up, never managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxy {
    /// Proxy id.
    #[serde(rename = "proxyid")]
    pub proxy_id: String,
    /// Proxy name.
    pub host: String,
}

impl ZabbixApi {
    /// `proxy.get`
    pub async fn proxies_get(&self, params: Params) -> Result<Vec<Proxy>, ZabbixError> {
        self.get_objects("proxy.get", params).await
    }
}

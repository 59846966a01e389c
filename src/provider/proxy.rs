//! `zabbix_proxy` data source.

use serde_json::json;
use tracing::debug;

use super::{at_most_one, id_attribute, params, DataSource, ResourceData};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::zabbix::ZabbixApi;

pub(crate) struct ProxyDataSource;

#[async_trait::async_trait]
impl DataSource for ProxyDataSource {
    fn type_name(&self) -> &'static str {
        "zabbix_proxy"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a proxy by host name")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "host",
                Attribute::required_string().with_description("Technical name of the proxy"),
            )
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let host = d.get_str("host").to_string();
        debug!(%host, "looking up proxy");

        let found = api
            .proxies_get(params(json!({ "filter": { "host": host } })))
            .await?;
        if let Some(proxy) = at_most_one(found, "proxies")? {
            d.set_id(proxy.proxy_id);
            d.set("host", proxy.host);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::provider::test_support::configured;
    use crate::zabbix::mock;

    #[tokio::test]
    async fn test_lookup_by_host() {
        let (server, tester) = configured().await;
        mock::respond(&server, "proxy.get", json!([{"proxyid": "10452", "host": "dc1-proxy"}]))
            .await;

        let state = tester
            .read_data_source("zabbix_proxy", json!({"host": "dc1-proxy"}))
            .await
            .unwrap();
        assert_eq!(state, json!({"id": "10452", "host": "dc1-proxy"}));

        let body = mock::request_body(&server, "proxy.get").await;
        assert_eq!(body["params"], json!({"filter": {"host": "dc1-proxy"}}));
    }

    #[tokio::test]
    async fn test_multiple_proxies() {
        let (server, tester) = configured().await;
        mock::respond(
            &server,
            "proxy.get",
            json!([{"proxyid": "1", "host": "p"}, {"proxyid": "2", "host": "p"}]),
        )
        .await;

        let err = tester
            .read_data_source("zabbix_proxy", json!({"host": "p"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "multiple proxies found");
    }
}

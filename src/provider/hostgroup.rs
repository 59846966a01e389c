//! `zabbix_hostgroup` resource and data source.

use serde_json::json;
use tracing::debug;

use super::{at_most_one, id_attribute, params, DataSource, Resource, ResourceData};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::zabbix::{HostGroup, ZabbixApi};

const TYPE_NAME: &str = "zabbix_hostgroup";

pub(crate) struct HostGroupResource;

pub(crate) struct HostGroupDataSource;

fn build(d: &ResourceData) -> HostGroup {
    HostGroup {
        group_id: d.id().to_string(),
        name: d.get_str("name").to_string(),
    }
}

#[async_trait::async_trait]
impl Resource for HostGroupResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Host group")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the host group"),
            )
    }

    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut groups = [build(d)];
        api.hostgroups_create(&mut groups).await?;

        let [created] = groups;
        debug!(groupid = %created.group_id, "created host group");
        d.set_id(created.group_id);
        self.read(api, d).await
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let found = api
            .hostgroups_get(params(json!({ "groupids": d.id() })))
            .await?;
        match at_most_one(found, "host groups")? {
            Some(group) => d.set("name", group.name),
            None => d.set_id(""),
        }
        Ok(())
    }

    async fn update(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        api.hostgroups_update(&[build(d)]).await?;
        self.read(api, d).await
    }

    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError> {
        api.hostgroups_delete_by_ids(&[d.id().to_string()]).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSource for HostGroupDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a host group by name")
            .with_attribute("id", id_attribute())
            .with_attribute("name", Attribute::required_string())
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let name = d.get_str("name").to_string();
        debug!(%name, "looking up host group");

        let found = api
            .hostgroups_get(params(json!({ "filter": { "name": name } })))
            .await?;
        if let Some(group) = at_most_one(found, "host groups")? {
            d.set_id(group.group_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::provider::test_support::configured;
    use crate::zabbix::mock;

    #[tokio::test]
    async fn test_lifecycle() {
        let (server, tester) = configured().await;
        mock::respond(&server, "hostgroup.create", json!({"groupids": ["21"]})).await;
        mock::respond(&server, "hostgroup.update", json!({"groupids": ["21"]})).await;
        mock::respond(&server, "hostgroup.delete", json!({"groupids": ["21"]})).await;
        mock::respond(&server, "hostgroup.get", json!([{"groupid": "21", "name": "Web"}])).await;

        let state = tester
            .create("zabbix_hostgroup", json!({"name": "Web"}))
            .await
            .unwrap();
        assert_eq!(state, json!({"id": "21", "name": "Web"}));

        tester
            .update("zabbix_hostgroup", state.clone(), json!({"id": "21", "name": "Web"}))
            .await
            .unwrap();
        let update = mock::request_body(&server, "hostgroup.update").await;
        assert_eq!(update["params"], json!([{"groupid": "21", "name": "Web"}]));

        tester.delete("zabbix_hostgroup", state).await.unwrap();
        let delete = mock::request_body(&server, "hostgroup.delete").await;
        assert_eq!(delete["params"], json!(["21"]));
    }

    #[tokio::test]
    async fn test_import() {
        let (server, tester) = configured().await;
        mock::respond(&server, "hostgroup.get", json!([{"groupid": "2", "name": "Linux servers"}]))
            .await;

        let imported = tester.import_resource("zabbix_hostgroup", "2").await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "zabbix_hostgroup");
        assert_eq!(imported[0].state, json!({"id": "2", "name": "Linux servers"}));
    }

    #[tokio::test]
    async fn test_data_source() {
        let (server, tester) = configured().await;
        mock::respond_to(
            &server,
            "hostgroup.get",
            json!({"filter": {"name": "Linux servers"}}),
            json!([{"groupid": "2", "name": "Linux servers"}]),
        )
        .await;
        mock::respond(&server, "hostgroup.get", json!([])).await;

        let state = tester
            .read_data_source("zabbix_hostgroup", json!({"name": "Linux servers"}))
            .await
            .unwrap();
        assert_eq!(state, json!({"id": "2", "name": "Linux servers"}));

        let missing = tester
            .read_data_source("zabbix_hostgroup", json!({"name": "Databases"}))
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);
    }
}

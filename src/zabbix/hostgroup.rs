use serde::{Deserialize, Serialize};

use super::{Params, ZabbixApi, ZabbixError};

/// A host group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostGroup {
    /// Empty until the group is created.
    #[serde(rename = "groupid", skip_serializing_if = "String::is_empty")]
    pub group_id: String,
    /// Group name.
    pub name: String,
}

impl ZabbixApi {
    /// `hostgroup.get`
    pub async fn hostgroups_get(&self, params: Params) -> Result<Vec<HostGroup>, ZabbixError> {
        self.get_objects("hostgroup.get", params).await
    }

    /// `hostgroup.create`; fills in the id of every created group.
    pub async fn hostgroups_create(&self, groups: &mut [HostGroup]) -> Result<(), ZabbixError> {
        let ids = self
            .create_objects("hostgroup.create", groups, "groupids")
            .await?;
        for (group, id) in groups.iter_mut().zip(ids) {
            group.group_id = id;
        }
        Ok(())
    }

    /// `hostgroup.update`
    pub async fn hostgroups_update(&self, groups: &[HostGroup]) -> Result<(), ZabbixError> {
        self.update_objects("hostgroup.update", groups, "groupids")
            .await
    }

    /// `hostgroup.delete`
    pub async fn hostgroups_delete_by_ids(&self, ids: &[String]) -> Result<(), ZabbixError> {
        self.delete_ids("hostgroup.delete", ids, "groupids").await
    }
}

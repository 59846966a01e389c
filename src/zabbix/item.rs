use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ids_or_refs, object_or_empty, Params, ZabbixApi, ZabbixError};

/// One preprocessing step of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocessor {
    /// Step type code, e.g. `5` for a regular expression.
    #[serde(rename = "type")]
    pub kind: String,
    /// Step parameters separated by newlines.
    pub params: String,
    /// What to do when the step fails, `0` meaning the default handling.
    pub error_handler: String,
    /// Value or message used by the error handler.
    pub error_handler_params: String,
}

/// An item of any type.
///
/// Fields owned by a single item type are `None` for every other type and
/// are then left out of requests. `Some("")` is sent as is, which clears
/// the remote value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Empty until the item is created.
    #[serde(rename = "itemid", skip_serializing_if = "String::is_empty")]
    pub item_id: String,
    /// Owning host or template. Left empty on update.
    #[serde(rename = "hostid", skip_serializing_if = "String::is_empty")]
    pub host_id: String,
    /// Visible name.
    pub name: String,
    /// Item key, e.g. `system.cpu.load`.
    #[serde(rename = "key_")]
    pub key: String,
    /// Item type code.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type of information code.
    pub value_type: String,
    /// Polling interval, empty for items that are not polled.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub delay: String,
    /// History storage period.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub history: String,
    /// Trend storage period, empty for non-numeric items.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trends: String,
    /// Host interface the item is polled through; `0` remotely means none.
    #[serde(rename = "interfaceid", skip_serializing_if = "Option::is_none")]
    pub interface_id: Option<String>,
    /// Application ids.
    #[serde(deserialize_with = "ids_or_refs")]
    pub applications: Vec<String>,
    /// Preprocessing steps in order.
    pub preprocessing: Vec<Preprocessor>,

    /// Trapper items: hosts allowed to send values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trapper_hosts: Option<String>,

    /// Dependent items: the master item.
    #[serde(rename = "master_itemid", skip_serializing_if = "Option::is_none")]
    pub master_item_id: Option<String>,

    /// SNMP items: the OID to query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_oid: Option<String>,

    /// Simple checks: login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Simple checks: password. Never returned by `item.get`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// HTTP items: the URL to request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP items: request method code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    /// HTTP items: request body type code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_type: Option<String>,
    /// HTTP items: request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<String>,
    /// HTTP items: request timeout, e.g. `3s`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// HTTP items: accepted status codes, e.g. `200,201`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<String>,
    /// HTTP items: `1` to follow redirects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<String>,
    /// HTTP items: `1` to verify the certificate host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_host: Option<String>,
    /// HTTP items: `1` to verify the certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_peer: Option<String>,
    /// HTTP items: which part of the response to store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieve_mode: Option<String>,
    /// HTTP items: request headers. The API reports "none" as `[]`.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "object_or_empty")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ZabbixApi {
    /// `item.get`
    pub async fn items_get(&self, params: Params) -> Result<Vec<Item>, ZabbixError> {
        self.get_objects("item.get", params).await
    }

    /// `item.create`; fills in the id of every created item.
    pub async fn items_create(&self, items: &mut [Item]) -> Result<(), ZabbixError> {
        let ids = self.create_objects("item.create", items, "itemids").await?;
        for (item, id) in items.iter_mut().zip(ids) {
            item.item_id = id;
        }
        Ok(())
    }

    /// `item.update`. The owning host cannot change, so `host_id` should be
    /// left empty.
    pub async fn items_update(&self, items: &[Item]) -> Result<(), ZabbixError> {
        self.update_objects("item.update", items, "itemids").await
    }

    /// `item.delete`
    pub async fn items_delete_by_ids(&self, ids: &[String]) -> Result<(), ZabbixError> {
        self.delete_ids("item.delete", ids, "itemids").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_decodes_selected_applications_and_empty_headers() {
        let item: Item = serde_json::from_value(json!({
            "itemid": "23296",
            "hostid": "10084",
            "name": "Ping",
            "key_": "agent.ping",
            "type": "0",
            "value_type": "3",
            "delay": "1m",
            "interfaceid": "1",
            "applications": [{"applicationid": "551"}],
            "preprocessing": [{"type": "1", "params": "2", "error_handler": "0", "error_handler_params": ""}],
            "headers": []
        }))
        .unwrap();

        assert_eq!(item.key, "agent.ping");
        assert_eq!(item.applications, vec!["551"]);
        assert_eq!(item.preprocessing[0].params, "2");
        assert_eq!(item.interface_id.as_deref(), Some("1"));
        assert_eq!(item.headers, None);
        assert_eq!(item.url, None);
    }

    #[test]
    fn test_item_skips_unset_variant_fields() {
        let item = Item {
            host_id: "10084".into(),
            name: "Trap".into(),
            key: "trap.key".into(),
            kind: "2".into(),
            value_type: "3".into(),
            trapper_hosts: Some("10.0.0.0/24".into()),
            ..Default::default()
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["trapper_hosts"], "10.0.0.0/24");
        assert_eq!(value["applications"], json!([]));
        assert!(value.get("url").is_none());
        assert!(value.get("headers").is_none());
        assert!(value.get("itemid").is_none());
    }

    #[test]
    fn test_item_sends_cleared_variant_fields() {
        let item = Item {
            item_id: "28002".into(),
            trapper_hosts: Some(String::new()),
            headers: Some(BTreeMap::new()),
            ..Default::default()
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["trapper_hosts"], "");
        assert_eq!(value["headers"], json!({}));
    }
}

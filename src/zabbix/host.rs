use serde::{Deserialize, Serialize};

use super::{object_or_empty, Params, ZabbixApi, ZabbixError};

/// Reference to a host group by id, as used in host and template objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    /// Host group id.
    #[serde(rename = "groupid")]
    pub group_id: String,
}

/// Reference to a template by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Template id.
    #[serde(rename = "templateid")]
    pub template_id: String,
}

/// User macro attached to a host or template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Macro {
    /// Macro name in `{$NAME}` form.
    #[serde(rename = "macro")]
    pub name: String,
    /// Macro value.
    pub value: String,
}

/// SNMP settings of an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpDetails {
    /// SNMP version code: `1`, `2` (v2c) or `3`.
    pub version: String,
    /// `1` to use bulk requests.
    pub bulk: String,
    /// SNMP community string.
    pub community: String,
}

/// A host interface. `kind` is the numeric interface type
/// (1 agent, 2 SNMP, 3 IPMI, 4 JMX).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInterface {
    /// Empty for interfaces not created yet.
    #[serde(rename = "interfaceid", skip_serializing_if = "String::is_empty")]
    pub interface_id: String,
    /// Interface type code.
    #[serde(rename = "type")]
    pub kind: String,
    /// `1` for the default interface of its type.
    pub main: String,
    /// `1` to connect by IP, `0` by DNS name.
    #[serde(rename = "useip")]
    pub use_ip: String,
    /// IP address, may be empty when connecting by DNS.
    pub ip: String,
    /// DNS name, may be empty when connecting by IP.
    pub dns: String,
    /// Port number as a string.
    pub port: String,
    /// Only present on SNMP interfaces.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "object_or_empty"
    )]
    pub details: Option<SnmpDetails>,
}

/// A monitored host.
///
/// `templates` is only ever sent; linked templates come back in
/// `parent_templates` when `selectParentTemplates` is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    /// Empty until the host is created.
    #[serde(rename = "hostid", skip_serializing_if = "String::is_empty")]
    pub host_id: String,
    /// Technical host name.
    pub host: String,
    /// Visible name; Zabbix uses `host` when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// `"0"` monitored, `"1"` unmonitored.
    pub status: String,
    /// Monitoring proxy, `0` for none.
    #[serde(rename = "proxy_hostid")]
    pub proxy_id: String,
    /// Host groups, at least one.
    pub groups: Vec<GroupRef>,
    /// Templates to link.
    #[serde(skip_deserializing)]
    pub templates: Vec<TemplateRef>,
    /// Linked templates as reported by `host.get`.
    #[serde(rename = "parentTemplates", skip_serializing)]
    pub parent_templates: Vec<TemplateRef>,
    /// Interfaces in declaration order.
    pub interfaces: Vec<HostInterface>,
    /// User macros.
    pub macros: Vec<Macro>,
}

impl ZabbixApi {
    /// `host.get`
    pub async fn hosts_get(&self, params: Params) -> Result<Vec<Host>, ZabbixError> {
        self.get_objects("host.get", params).await
    }

    /// `host.create`; fills in the id of every created host.
    pub async fn hosts_create(&self, hosts: &mut [Host]) -> Result<(), ZabbixError> {
        let ids = self.create_objects("host.create", hosts, "hostids").await?;
        for (host, id) in hosts.iter_mut().zip(ids) {
            host.host_id = id;
        }
        Ok(())
    }

    /// `host.update`
    pub async fn hosts_update(&self, hosts: &[Host]) -> Result<(), ZabbixError> {
        self.update_objects("host.update", hosts, "hostids").await
    }

    /// `host.delete`
    pub async fn hosts_delete_by_ids(&self, ids: &[String]) -> Result<(), ZabbixError> {
        self.delete_ids("host.delete", ids, "hostids").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_decodes_get_response() {
        let host: Host = serde_json::from_value(json!({
            "hostid": "10084",
            "host": "web-01",
            "name": "Web 01",
            "status": "0",
            "proxy_hostid": "0",
            "groups": [{"groupid": "2", "name": "Linux servers"}],
            "parentTemplates": [{"templateid": "10001", "name": "Template OS Linux"}],
            "interfaces": [
                {"interfaceid": "1", "type": "1", "main": "1", "useip": "1",
                 "ip": "10.0.0.1", "dns": "", "port": "10050", "details": []},
                {"interfaceid": "2", "type": "2", "main": "1", "useip": "1",
                 "ip": "10.0.0.1", "dns": "", "port": "161",
                 "details": {"version": "2", "bulk": "1", "community": "public"}}
            ],
            "macros": [{"hostmacroid": "5", "macro": "{$A}", "value": "1"}]
        }))
        .unwrap();

        assert_eq!(host.host_id, "10084");
        assert_eq!(host.groups, vec![GroupRef { group_id: "2".into() }]);
        assert_eq!(
            host.parent_templates,
            vec![TemplateRef { template_id: "10001".into() }]
        );
        assert!(host.templates.is_empty());
        assert_eq!(host.interfaces[0].details, None);
        assert_eq!(
            host.interfaces[1].details.as_ref().map(|d| d.community.as_str()),
            Some("public")
        );
        assert_eq!(host.macros[0].name, "{$A}");
    }

    #[test]
    fn test_host_encodes_templates_not_parent_templates() {
        let host = Host {
            host: "web-01".into(),
            status: "0".into(),
            proxy_id: "0".into(),
            groups: vec![GroupRef { group_id: "2".into() }],
            templates: vec![TemplateRef { template_id: "10001".into() }],
            parent_templates: vec![TemplateRef { template_id: "99".into() }],
            ..Default::default()
        };

        let value = serde_json::to_value(&host).unwrap();
        assert_eq!(value["templates"], json!([{"templateid": "10001"}]));
        assert!(value.get("parentTemplates").is_none());
        assert!(value.get("hostid").is_none());
        assert!(value.get("name").is_none());
        assert_eq!(value["macros"], json!([]));
    }
}

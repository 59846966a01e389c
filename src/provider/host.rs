//! `zabbix_host` resource and data source.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, trace};

use super::template::{build_macros, flatten_macros, group_refs, macro_block, template_refs};
use super::{
    at_most_one, flag, id_attribute, lookup_filter, params, Choices, DataSource, Resource,
    ResourceData,
};
use crate::error::ProviderError;
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema, ValueValidator,
};
use crate::zabbix::{Host, HostInterface, Params, SnmpDetails, ZabbixApi};

const TYPE_NAME: &str = "zabbix_host";

const INTERFACE_TYPES: Choices = Choices(&[("agent", "1"), ("snmp", "2"), ("ipmi", "3"), ("jmx", "4")]);

const DEFAULT_SNMP_VERSION: &str = "2";
const DEFAULT_SNMP_COMMUNITY: &str = "{$SNMP_COMMUNITY}";

fn default_port(kind: &str) -> &'static str {
    match kind {
        "snmp" => "161",
        "ipmi" => "623",
        "jmx" => "12345",
        _ => "10050",
    }
}

pub(crate) struct HostResource;

pub(crate) struct HostDataSource;

fn interface_block() -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description("Interface used to poll the host")
            .with_attribute("interfaceid", Attribute::computed_string())
            .with_attribute(
                "type",
                Attribute::optional_string()
                    .with_default(json!("agent"))
                    .with_validator(ValueValidator::one_of(INTERFACE_TYPES.names())),
            )
            .with_attribute("ip", Attribute::optional_string().with_default(json!("")))
            .with_attribute("dns", Attribute::optional_string().with_default(json!("")))
            .with_attribute(
                "port",
                Attribute::optional_string()
                    .with_description("Port; the default port of the interface type when empty")
                    .with_default(json!("")),
            )
            .with_attribute(
                "snmp_version",
                Attribute::optional_string()
                    .with_default(json!(DEFAULT_SNMP_VERSION))
                    .with_validator(ValueValidator::one_of(["1", "2", "3"])),
            )
            .with_attribute(
                "snmp_community",
                Attribute::optional_string().with_default(json!(DEFAULT_SNMP_COMMUNITY)),
            )
            .with_attribute(
                "snmp_bulk",
                Attribute::optional_bool().with_default(json!(true)),
            ),
    )
    .with_min_items(1)
    .with_match_keys(["type", "ip", "dns"])
}

fn build_interfaces(d: &ResourceData) -> Result<Vec<HostInterface>, ProviderError> {
    let mut seen_types = Vec::new();
    let mut interfaces = Vec::new();

    for block in d.get_blocks("interface") {
        let kind = block.get_ok_str("type").unwrap_or("agent");
        let code = INTERFACE_TYPES.code(kind)?;

        let main = !seen_types.contains(&code);
        if main {
            seen_types.push(code);
        }

        let ip = block.get_str("ip");
        let port = block.get_ok_str("port").unwrap_or(default_port(kind));
        let details = (kind == "snmp").then(|| SnmpDetails {
            version: block
                .get_ok_str("snmp_version")
                .unwrap_or(DEFAULT_SNMP_VERSION)
                .to_string(),
            bulk: flag(block.get_bool("snmp_bulk", true)),
            community: block
                .get_ok_str("snmp_community")
                .unwrap_or(DEFAULT_SNMP_COMMUNITY)
                .to_string(),
        });

        interfaces.push(HostInterface {
            interface_id: block.get_str("interfaceid").to_string(),
            kind: code.to_string(),
            main: flag(main),
            use_ip: flag(!ip.is_empty()),
            ip: ip.to_string(),
            dns: block.get_str("dns").to_string(),
            port: port.to_string(),
            details,
        });
    }
    Ok(interfaces)
}

/// Order remote interfaces like the configured ones: by interface id, then
/// by type and address. Unmatched remote interfaces go last.
fn match_interfaces(
    configured: &[ResourceData],
    mut remote: Vec<HostInterface>,
) -> Vec<(Option<&ResourceData>, HostInterface)> {
    let mut ordered = Vec::with_capacity(remote.len());

    for block in configured {
        let kind = block.get_ok_str("type").unwrap_or("agent");
        let position = match block.get_ok_str("interfaceid") {
            Some(id) => remote.iter().position(|i| i.interface_id == id),
            None => remote.iter().position(|i| {
                INTERFACE_TYPES.name(&i.kind) == kind
                    && i.ip == block.get_str("ip")
                    && i.dns == block.get_str("dns")
            }),
        };
        if let Some(position) = position {
            ordered.push((Some(block), remote.remove(position)));
        }
    }
    ordered.extend(remote.into_iter().map(|i| (None, i)));
    ordered
}

fn flatten_interface(configured: Option<&ResourceData>, interface: HostInterface) -> ResourceData {
    let kind = INTERFACE_TYPES.name(&interface.kind);

    let configured_port = configured.map(|b| b.get_str("port")).unwrap_or_default();
    let port = if configured_port.is_empty() && interface.port == default_port(&kind) {
        String::new()
    } else {
        interface.port
    };

    let details = interface.details.filter(|_| kind == "snmp");
    let mut block = ResourceData::new();
    block.set("interfaceid", interface.interface_id);
    block.set("type", kind);
    block.set("ip", interface.ip);
    block.set("dns", interface.dns);
    block.set("port", port);
    match details {
        Some(details) => {
            block.set("snmp_version", details.version);
            block.set("snmp_community", details.community);
            block.set("snmp_bulk", details.bulk != "0");
        },
        None => {
            block.set("snmp_version", DEFAULT_SNMP_VERSION);
            block.set("snmp_community", DEFAULT_SNMP_COMMUNITY);
            block.set("snmp_bulk", true);
        },
    }
    block
}

fn build(d: &ResourceData) -> Result<Host, ProviderError> {
    Ok(Host {
        host_id: d.id().to_string(),
        host: d.get_str("host").to_string(),
        name: d.get_str("name").to_string(),
        status: flag(!d.get_bool("enabled", true)),
        proxy_id: d.get_ok_str("proxyid").unwrap_or("0").to_string(),
        groups: group_refs(d),
        templates: template_refs(d),
        parent_templates: Vec::new(),
        interfaces: build_interfaces(d)?,
        macros: build_macros(d),
    })
}

fn flatten(host: Host, d: &mut ResourceData) {
    let configured = d.get_blocks("interface");
    let interfaces = match_interfaces(&configured, host.interfaces)
        .into_iter()
        .map(|(block, interface)| flatten_interface(block, interface))
        .collect();

    d.set("host", host.host);
    d.set("name", host.name);
    d.set("enabled", host.status == "0");
    d.set("proxyid", host.proxy_id);
    d.set_strings("groups", host.groups.into_iter().map(|g| g.group_id));
    d.set_strings(
        "templates",
        host.parent_templates.into_iter().map(|t| t.template_id),
    );
    d.set_blocks("interface", interfaces);
}

fn get_params(filter: serde_json::Value) -> Params {
    let mut p = params(json!({
        "selectInterfaces": "extend",
        "selectGroups": "extend",
        "selectParentTemplates": "extend",
        "selectMacros": "extend",
    }));
    p.extend(params(filter));
    p
}

#[async_trait::async_trait]
impl Resource for HostResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Monitored host")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "host",
                Attribute::required_string().with_description("Technical name of the host"),
            )
            .with_attribute(
                "name",
                Attribute::optional_computed_string().with_description("Visible name"),
            )
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "proxyid",
                Attribute::optional_string()
                    .with_description("Id of the proxy that monitors the host, 0 for none")
                    .with_default(json!("0"))
                    .with_validator(ValueValidator::Numeric),
            )
            .with_attribute(
                "groups",
                Attribute::required_string_set()
                    .with_description("Ids of the host groups the host belongs to")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_attribute(
                "templates",
                Attribute::optional_string_set()
                    .with_description("Ids of linked templates")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_block("interface", interface_block())
            .with_block("macro", macro_block())
    }

    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut hosts = [build(d)?];
        trace!(?hosts, "creating host");
        api.hosts_create(&mut hosts).await?;

        let [created] = hosts;
        debug!(hostid = %created.host_id, "created host");
        d.set_id(created.host_id);
        self.read(api, d).await
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let found = api
            .hosts_get(get_params(json!({ "hostids": d.id() })))
            .await?;
        match at_most_one(found, "hosts")? {
            Some(mut host) => {
                let macros = std::mem::take(&mut host.macros);
                flatten(host, d);
                d.set_blocks("macro", flatten_macros(macros));
            },
            None => d.set_id(""),
        }
        Ok(())
    }

    async fn update(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let host = build(d)?;
        trace!(?host, "updating host");
        api.hosts_update(&[host]).await?;
        self.read(api, d).await
    }

    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError> {
        api.hosts_delete_by_ids(&[d.id().to_string()]).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSource for HostDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let interface = AttributeType::Object(BTreeMap::from([
            ("interfaceid".to_string(), AttributeType::String),
            ("type".to_string(), AttributeType::String),
            ("ip".to_string(), AttributeType::String),
            ("dns".to_string(), AttributeType::String),
            ("port".to_string(), AttributeType::String),
            ("snmp_version".to_string(), AttributeType::String),
            ("snmp_community".to_string(), AttributeType::String),
            ("snmp_bulk".to_string(), AttributeType::Bool),
        ]));

        Schema::v0()
            .with_description("Look up a host by id, technical name or visible name")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "hostid",
                Attribute::optional_computed_string().with_validator(ValueValidator::Numeric),
            )
            .with_attribute("host", Attribute::optional_computed_string())
            .with_attribute("name", Attribute::optional_computed_string())
            .with_attribute("enabled", Attribute::computed_bool())
            .with_attribute("proxyid", Attribute::computed_string())
            .with_attribute("groups", Attribute::computed_string_set())
            .with_attribute("templates", Attribute::computed_string_set())
            .with_attribute(
                "interface",
                Attribute::new(AttributeType::list(interface), AttributeFlags::computed()),
            )
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let filter = lookup_filter(d, &["hostid", "host", "name"]);
        if filter.is_empty() {
            return Err(ProviderError::Validation(
                "one of 'hostid', 'host' or 'name' must be set".to_string(),
            ));
        }
        debug!(?filter, "looking up host");

        let found = api
            .hosts_get(get_params(json!({ "filter": filter })))
            .await?;
        if let Some(host) = at_most_one(found, "hosts")? {
            d.set_id(host.host_id.clone());
            d.set("hostid", host.host_id.clone());
            flatten(host, d);
        }
        Ok(())
    }
}

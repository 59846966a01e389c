//! `zabbix_item_*` resources.
//!
//! Every item type shares one adapter. The variant decides the remote item
//! type code and which type-specific attributes the schema carries.

use serde_json::{json, Value};
use tracing::{debug, trace};

use super::{at_most_one, flag, id_attribute, params, Choices, Resource, ResourceData};
use crate::error::ProviderError;
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema, ValueValidator,
};
use crate::zabbix::{Item, Preprocessor, ZabbixApi};

const VALUE_TYPES: Choices = Choices(&[
    ("float", "0"),
    ("character", "1"),
    ("log", "2"),
    ("unsigned", "3"),
    ("text", "4"),
]);

const REQUEST_METHODS: Choices = Choices(&[("get", "0"), ("post", "1"), ("put", "2"), ("head", "3")]);

const POST_TYPES: Choices = Choices(&[("raw", "0"), ("json", "2"), ("xml", "3")]);

const RETRIEVE_MODES: Choices = Choices(&[("body", "0"), ("headers", "1"), ("both", "2")]);

const AGENT: &str = "0";
const AGENT_ACTIVE: &str = "7";

const NO_INTERFACE: &str = "0";

/// Item types managed by a `zabbix_item_*` resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemVariant {
    /// Values pushed with zabbix_sender.
    Trapper,
    /// HTTP agent checks.
    Http,
    /// Simple checks such as ICMP ping or TCP port checks.
    Simple,
    /// Server internal metrics.
    Internal,
    /// SNMP agent checks.
    Snmp,
    /// Zabbix agent checks, passive or active.
    Agent,
    /// Aggregates over items of a host group.
    Aggregate,
    /// Values extracted from a master item.
    Dependent,
}

impl ItemVariant {
    /// Resource type name.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Trapper => "zabbix_item_trapper",
            Self::Http => "zabbix_item_http",
            Self::Simple => "zabbix_item_simple",
            Self::Internal => "zabbix_item_internal",
            Self::Snmp => "zabbix_item_snmp",
            Self::Agent => "zabbix_item_agent",
            Self::Aggregate => "zabbix_item_aggregate",
            Self::Dependent => "zabbix_item_dependent",
        }
    }

    /// Remote item type code. Agent items are passive unless `active`.
    pub fn item_type(self, active: bool) -> &'static str {
        match self {
            Self::Trapper => "2",
            Self::Http => "19",
            Self::Simple => "3",
            Self::Internal => "5",
            Self::Snmp => "20",
            Self::Agent if active => AGENT_ACTIVE,
            Self::Agent => AGENT,
            Self::Aggregate => "8",
            Self::Dependent => "18",
        }
    }

    fn polled(self) -> bool {
        !matches!(self, Self::Trapper | Self::Dependent)
    }

    fn uses_interface(self) -> bool {
        matches!(self, Self::Http | Self::Simple | Self::Snmp | Self::Agent)
    }
}

pub(crate) struct ItemResource {
    variant: ItemVariant,
}

impl ItemResource {
    pub(crate) fn new(variant: ItemVariant) -> Self {
        Self { variant }
    }

    fn build(&self, d: &ResourceData) -> Result<Item, ProviderError> {
        let value_type = VALUE_TYPES.code(d.get_str("valuetype"))?;
        let mut item = Item {
            item_id: d.id().to_string(),
            host_id: d.get_str("hostid").to_string(),
            name: d.get_str("name").to_string(),
            key: d.get_str("key").to_string(),
            kind: self
                .variant
                .item_type(d.get_bool("active", false))
                .to_string(),
            value_type: value_type.to_string(),
            history: d.get_str("history").to_string(),
            applications: d.get_string_list("applications"),
            preprocessing: build_preprocessors(d),
            ..Default::default()
        };

        if is_numeric(value_type) {
            item.trends = d.get_str("trends").to_string();
        }
        if self.variant.polled() {
            item.delay = d.get_str("delay").to_string();
        }
        if self.variant.uses_interface() {
            let interface_id = d.get_ok_str("interfaceid").unwrap_or(NO_INTERFACE);
            item.interface_id = Some(interface_id.to_string());
        }

        match self.variant {
            ItemVariant::Trapper => {
                item.trapper_hosts = owned(d, "allowed_hosts");
            },
            ItemVariant::Dependent => {
                item.master_item_id = owned(d, "master_itemid");
            },
            ItemVariant::Snmp => {
                item.snmp_oid = owned(d, "snmp_oid");
            },
            ItemVariant::Simple => {
                item.username = owned(d, "username");
                item.password = owned(d, "password");
            },
            ItemVariant::Http => {
                item.url = owned(d, "url");
                item.request_method =
                    Some(REQUEST_METHODS.code(d.get_ok_str("request_method").unwrap_or("get"))?.to_string());
                item.post_type = Some(POST_TYPES.code(d.get_ok_str("post_type").unwrap_or("raw"))?.to_string());
                item.posts = owned(d, "posts");
                item.timeout = owned(d, "timeout");
                item.status_codes = owned(d, "status_codes");
                item.follow_redirects = Some(flag(d.get_bool("follow_redirects", true)));
                item.verify_host = Some(flag(d.get_bool("verify_host", false)));
                item.verify_peer = Some(flag(d.get_bool("verify_peer", false)));
                item.retrieve_mode =
                    Some(RETRIEVE_MODES.code(d.get_ok_str("retrieve_mode").unwrap_or("body"))?.to_string());
                item.headers = Some(d.get_string_map("headers"));
            },
            ItemVariant::Internal | ItemVariant::Agent | ItemVariant::Aggregate => {},
        }
        Ok(item)
    }

    fn flatten(&self, item: Item, d: &mut ResourceData) {
        d.set("hostid", item.host_id);
        d.set("name", item.name);
        d.set("key", item.key);
        d.set("valuetype", VALUE_TYPES.name(&item.value_type));
        d.set("history", item.history);
        if is_numeric(&item.value_type) {
            d.set("trends", item.trends);
        }
        d.set_strings("applications", item.applications);
        d.set_blocks("preprocessor", flatten_preprocessors(item.preprocessing));

        if self.variant.polled() {
            d.set("delay", item.delay);
        }
        if self.variant.uses_interface() {
            let interface_id = item.interface_id.filter(|id| id != NO_INTERFACE);
            d.set("interfaceid", interface_id.unwrap_or_default());
        }

        match self.variant {
            ItemVariant::Trapper => d.set("allowed_hosts", item.trapper_hosts.unwrap_or_default()),
            ItemVariant::Dependent => d.set("master_itemid", item.master_item_id.unwrap_or_default()),
            ItemVariant::Snmp => d.set("snmp_oid", item.snmp_oid.unwrap_or_default()),
            ItemVariant::Agent => d.set("active", item.kind == AGENT_ACTIVE),
            ItemVariant::Simple => {
                d.set("username", item.username.unwrap_or_default());
                if let Some(password) = item.password.filter(|p| !p.is_empty()) {
                    d.set("password", password);
                }
            },
            ItemVariant::Http => {
                let request_method = item.request_method.unwrap_or_default();
                let post_type = item.post_type.unwrap_or_default();
                let retrieve_mode = item.retrieve_mode.unwrap_or_default();
                d.set("url", item.url.unwrap_or_default());
                d.set("request_method", REQUEST_METHODS.name(&request_method));
                d.set("post_type", POST_TYPES.name(&post_type));
                d.set("posts", item.posts.unwrap_or_default());
                d.set("timeout", item.timeout.unwrap_or_default());
                d.set("status_codes", item.status_codes.unwrap_or_default());
                d.set("follow_redirects", item.follow_redirects.as_deref() == Some("1"));
                d.set("verify_host", item.verify_host.as_deref() == Some("1"));
                d.set("verify_peer", item.verify_peer.as_deref() == Some("1"));
                d.set("retrieve_mode", RETRIEVE_MODES.name(&retrieve_mode));
                match item.headers.filter(|h| !h.is_empty()) {
                    Some(headers) => {
                        let headers: serde_json::Map<String, Value> =
                            headers.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
                        d.set("headers", headers);
                    },
                    None => d.set("headers", Value::Null),
                }
            },
            ItemVariant::Internal | ItemVariant::Aggregate => {},
        }
    }
}

/// A type-specific attribute, always present so that clearing it reaches
/// the API.
fn owned(d: &ResourceData, key: &str) -> Option<String> {
    Some(d.get_str(key).to_string())
}

fn is_numeric(value_type: &str) -> bool {
    value_type == "0" || value_type == "3"
}

fn build_preprocessors(d: &ResourceData) -> Vec<Preprocessor> {
    d.get_blocks("preprocessor")
        .iter()
        .map(|p| Preprocessor {
            kind: p.get_str("type").to_string(),
            params: p.get_string_list("params").join("\n"),
            error_handler: p.get_ok_str("error_handler").unwrap_or("0").to_string(),
            error_handler_params: p.get_str("error_handler_params").to_string(),
        })
        .collect()
}

fn flatten_preprocessors(steps: Vec<Preprocessor>) -> Vec<ResourceData> {
    steps
        .into_iter()
        .map(|step| {
            let mut block = ResourceData::new();
            block.set("type", step.kind);
            if step.params.is_empty() {
                block.set_strings("params", Vec::<String>::new());
            } else {
                block.set_strings("params", step.params.split('\n'));
            }
            block.set("error_handler", step.error_handler);
            block.set("error_handler_params", step.error_handler_params);
            block
        })
        .collect()
}

fn preprocessor_block() -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description("Preprocessing step applied to received values")
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_description("Preprocessing step type code")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_attribute(
                "params",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute(
                "error_handler",
                Attribute::optional_string()
                    .with_default(json!("0"))
                    .with_validator(ValueValidator::Numeric),
            )
            .with_attribute(
                "error_handler_params",
                Attribute::optional_string().with_default(json!("")),
            ),
    )
}

fn optional_with_default(default: &str) -> Attribute {
    Attribute::optional_string().with_default(json!(default))
}

fn optional_flag(default: bool) -> Attribute {
    Attribute::optional_bool().with_default(json!(default))
}

#[async_trait::async_trait]
impl Resource for ItemResource {
    fn type_name(&self) -> &'static str {
        self.variant.type_name()
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::v0()
            .with_attribute("id", id_attribute())
            .with_attribute(
                "hostid",
                Attribute::required_string()
                    .with_description("Id of the host or template the item belongs to")
                    .with_validator(ValueValidator::Numeric)
                    .with_force_new(),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "key",
                Attribute::required_string().with_description("Item key, e.g. system.cpu.load"),
            )
            .with_attribute(
                "valuetype",
                Attribute::required_string()
                    .with_validator(ValueValidator::one_of(VALUE_TYPES.names())),
            )
            .with_attribute("history", optional_with_default("90d"))
            .with_attribute(
                "trends",
                optional_with_default("365d")
                    .with_description("Trend storage period, used by numeric value types"),
            )
            .with_attribute(
                "applications",
                Attribute::optional_string_set()
                    .with_description("Ids of the applications the item belongs to")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_block("preprocessor", preprocessor_block());

        if self.variant.polled() {
            schema = schema.with_attribute("delay", optional_with_default("1m"));
        }

        schema = match self.variant {
            ItemVariant::Snmp => schema.with_attribute(
                "interfaceid",
                Attribute::required_string().with_validator(ValueValidator::Numeric),
            ),
            variant if variant.uses_interface() => schema.with_attribute(
                "interfaceid",
                optional_with_default("").with_validator(ValueValidator::Numeric),
            ),
            _ => schema,
        };

        match self.variant {
            ItemVariant::Trapper => schema
                .with_description("Item receiving values from zabbix_sender")
                .with_attribute(
                    "allowed_hosts",
                    optional_with_default("")
                        .with_description("Addresses allowed to send values"),
                ),
            ItemVariant::Dependent => schema
                .with_description("Item computed from the value of a master item")
                .with_attribute(
                    "master_itemid",
                    Attribute::required_string().with_validator(ValueValidator::Numeric),
                ),
            ItemVariant::Snmp => schema
                .with_description("SNMP agent item")
                .with_attribute("snmp_oid", Attribute::required_string()),
            ItemVariant::Agent => schema
                .with_description("Zabbix agent item")
                .with_attribute(
                    "active",
                    optional_flag(false).with_description("Use an active agent check"),
                ),
            ItemVariant::Simple => schema
                .with_description("Simple check item")
                .with_attribute("username", optional_with_default(""))
                .with_attribute("password", optional_with_default("").sensitive()),
            ItemVariant::Internal => schema.with_description("Zabbix internal item"),
            ItemVariant::Aggregate => schema.with_description("Aggregate item"),
            ItemVariant::Http => schema
                .with_description("HTTP agent item")
                .with_attribute(
                    "url",
                    Attribute::required_string().with_validator(ValueValidator::NotWhitespace),
                )
                .with_attribute(
                    "request_method",
                    optional_with_default("get")
                        .with_validator(ValueValidator::one_of(REQUEST_METHODS.names())),
                )
                .with_attribute(
                    "post_type",
                    optional_with_default("raw")
                        .with_validator(ValueValidator::one_of(POST_TYPES.names())),
                )
                .with_attribute("posts", optional_with_default(""))
                .with_attribute("timeout", optional_with_default("3s"))
                .with_attribute("status_codes", optional_with_default("200"))
                .with_attribute("follow_redirects", optional_flag(true))
                .with_attribute("verify_host", optional_flag(false))
                .with_attribute("verify_peer", optional_flag(false))
                .with_attribute(
                    "retrieve_mode",
                    optional_with_default("body")
                        .with_validator(ValueValidator::one_of(RETRIEVE_MODES.names())),
                )
                .with_attribute(
                    "headers",
                    Attribute::new(
                        AttributeType::map(AttributeType::String),
                        AttributeFlags::optional(),
                    ),
                ),
        }
    }

    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut items = [self.build(d)?];
        trace!(?items, "creating item");
        api.items_create(&mut items).await?;

        let [created] = items;
        debug!(itemid = %created.item_id, item_type = %created.kind, "created item");
        d.set_id(created.item_id);
        self.read(api, d).await
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let found = api
            .items_get(params(json!({
                "itemids": d.id(),
                "selectApplications": "extend",
                "selectPreprocessing": "extend",
            })))
            .await?;
        match at_most_one(found, "items")? {
            Some(item) => self.flatten(item, d),
            None => d.set_id(""),
        }
        Ok(())
    }

    async fn update(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut item = self.build(d)?;
        item.host_id.clear();
        trace!(?item, "updating item");
        api.items_update(&[item]).await?;
        self.read(api, d).await
    }

    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError> {
        api.items_delete_by_ids(&[d.id().to_string()]).await?;
        Ok(())
    }
}

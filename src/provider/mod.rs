//! The Zabbix provider: configuration, registries of resource and data
//! source adapters, and the [`ProviderService`] implementation that routes
//! plugin calls to them.
//!
//! Every adapter follows the same shape: build a request object from the
//! declarative fields, make one API call, copy the response back into state.

mod config;
mod data;

mod application;
mod host;
mod hostgroup;
mod item;
mod proxy;
mod template;
mod trigger;

pub use config::ProviderConfig;
pub use data::ResourceData;
pub use item::ItemVariant;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::plan;
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;
use crate::zabbix::{Params, ZabbixApi};

/// A managed object type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Type name used in configuration, e.g. `zabbix_application`.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource. Must contain a computed `id`.
    fn schema(&self) -> Schema;

    /// Create the remote object, set the identity, then read it back.
    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError>;

    /// Refresh `d` from the remote object. Clears the identity when the
    /// object no longer exists.
    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError>;

    /// Push planned changes to the remote object, then read it back.
    async fn update(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError>;
}

/// A read-only lookup.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Type name used in configuration, e.g. `zabbix_host`.
    fn type_name(&self) -> &'static str;

    /// Schema of the data source.
    fn schema(&self) -> Schema;

    /// Look up the object described by `d` and fill in its attributes.
    /// Leaves the identity empty when nothing matches.
    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError>;
}

/// Provider for Zabbix monitoring objects.
pub struct ZabbixProvider {
    api: RwLock<Option<Arc<ZabbixApi>>>,
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
}

impl Default for ZabbixProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ZabbixProvider {
    /// Create an unconfigured provider with every resource and data source
    /// registered.
    pub fn new() -> Self {
        let resources: Vec<Box<dyn Resource>> = vec![
            Box::new(application::ApplicationResource),
            Box::new(hostgroup::HostGroupResource),
            Box::new(template::TemplateResource),
            Box::new(host::HostResource),
            Box::new(trigger::TriggerResource),
            Box::new(item::ItemResource::new(ItemVariant::Trapper)),
            Box::new(item::ItemResource::new(ItemVariant::Http)),
            Box::new(item::ItemResource::new(ItemVariant::Simple)),
            Box::new(item::ItemResource::new(ItemVariant::Internal)),
            Box::new(item::ItemResource::new(ItemVariant::Snmp)),
            Box::new(item::ItemResource::new(ItemVariant::Agent)),
            Box::new(item::ItemResource::new(ItemVariant::Aggregate)),
            Box::new(item::ItemResource::new(ItemVariant::Dependent)),
        ];
        let data_sources: Vec<Box<dyn DataSource>> = vec![
            Box::new(host::HostDataSource),
            Box::new(proxy::ProxyDataSource),
            Box::new(hostgroup::HostGroupDataSource),
            Box::new(template::TemplateDataSource),
            Box::new(application::ApplicationDataSource),
        ];

        Self {
            api: RwLock::new(None),
            resources: resources.into_iter().map(|r| (r.type_name(), r)).collect(),
            data_sources: data_sources
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
        }
    }

    /// The configured API client.
    async fn api(&self) -> Result<Arc<ZabbixApi>, ProviderError> {
        self.api
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConfigured)
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderService for ZabbixProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(*name, data_source.schema());
        }
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.data_sources.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(ProviderConfig::resolve(config).err().unwrap_or_default())
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match ProviderConfig::resolve(config) {
            Ok(config) => config,
            Err(diagnostics) => return Ok(diagnostics),
        };
        debug!(url = %config.url, tls_insecure = config.tls_insecure, serialize = config.serialize, "configuring Zabbix client");

        let api = ZabbixApi::new(config.client_config())?;
        api.login(&config.username, &config.password).await?;
        info!(url = %config.url, user = %config.username, "logged in to Zabbix");

        *self.api.write().await = Some(Arc::new(api));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if self.api.write().await.take().is_some() {
            debug!("released Zabbix client");
        }
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(validate(&resource.schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(plan::plan(
            &resource.schema(),
            prior_state.as_ref(),
            &proposed_state,
        ))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let api = self.api().await?;

        let mut d = ResourceData::from_state(planned_state);
        d.set_id("");
        resource.create(&api, &mut d).await?;
        Ok(d.into_state())
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let mut d = ResourceData::from_state(current_state);
        if d.id().is_empty() {
            return Ok(Value::Null);
        }

        let api = self.api().await?;
        resource.read(&api, &mut d).await?;
        if d.id().is_empty() {
            warn!(resource_type, "object no longer exists, removing from state");
        }
        Ok(d.into_state())
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let api = self.api().await?;

        let prior = ResourceData::from_state(prior_state);
        let mut d = ResourceData::from_state(planned_state);
        if d.id().is_empty() {
            d.set_id(prior.id());
        }
        resource.update(&api, &mut d).await?;
        Ok(d.into_state())
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let d = ResourceData::from_state(current_state);
        if d.id().is_empty() {
            return Ok(());
        }

        let api = self.api().await?;
        resource.delete(&api, &d).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let api = self.api().await?;

        let mut d = ResourceData::with_id(id);
        resource.read(&api, &mut d).await?;
        if d.id().is_empty() {
            return Err(ProviderError::NotFound(format!("{resource_type} with id {id}")));
        }
        Ok(vec![ImportedResource::new(resource_type, d.into_state())])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        Ok(validate(&data_source.schema(), &config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let api = self.api().await?;

        let mut d = ResourceData::from_state(config);
        d.set_id("");
        data_source.read(&api, &mut d).await?;
        if d.id().is_empty() {
            warn!(data_source_type, "lookup matched nothing");
        }
        Ok(d.into_state())
    }
}

/// The computed `id` attribute every resource schema carries.
pub(crate) fn id_attribute() -> Attribute {
    Attribute::computed_string().with_description("Zabbix object id")
}

/// Build API parameters from a JSON object literal.
pub(crate) fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// Reduce a lookup result to at most one object.
pub(crate) fn at_most_one<T>(
    mut found: Vec<T>,
    kind: &'static str,
) -> Result<Option<T>, ProviderError> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        n => {
            debug!(kind, matches = n, "lookup matched more than one object");
            Err(ProviderError::MultipleFound(kind))
        },
    }
}

/// Build a lookup filter from whichever of `keys` are set in `d`.
pub(crate) fn lookup_filter(d: &ResourceData, keys: &[&str]) -> Params {
    keys.iter()
        .filter_map(|key| {
            d.get_ok_str(key)
                .map(|value| (key.to_string(), Value::from(value)))
        })
        .collect()
}

/// Zabbix flag string for a boolean.
pub(crate) fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// Two-way mapping between configuration names and API codes.
pub(crate) struct Choices(pub(crate) &'static [(&'static str, &'static str)]);

impl Choices {
    /// Configuration names in declaration order.
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|(name, _)| *name).collect()
    }

    /// API code for a configuration name.
    pub(crate) fn code(&self, name: &str) -> Result<&'static str, ProviderError> {
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, code)| *code)
            .ok_or_else(|| {
                ProviderError::Validation(format!(
                    "'{name}' is not one of [{}]",
                    self.names().join(", ")
                ))
            })
    }

    /// Configuration name for an API code. Unknown codes are returned
    /// unchanged.
    pub(crate) fn name(&self, code: &str) -> String {
        self.0
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| code.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::json;
    use wiremock::MockServer;

    use super::ZabbixProvider;
    use crate::testing::ProviderTester;
    use crate::zabbix::mock;

    /// A provider logged in to a fresh mock server.
    pub(crate) async fn configured() -> (MockServer, ProviderTester<ZabbixProvider>) {
        let server = MockServer::start().await;
        mock::respond(&server, "user.login", json!("0424bd59b807674191e7d77572075f33")).await;

        let tester = ProviderTester::new(ZabbixProvider::new());
        tester
            .configure(json!({
                "username": "Admin",
                "password": "zabbix",
                "url": mock::endpoint(&server),
            }))
            .await
            .unwrap();
        (server, tester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_error_contains, ProviderTester};
    use crate::zabbix::mock;
    use serde_json::json;

    #[test]
    fn test_registered_types() {
        let tester = ProviderTester::new(ZabbixProvider::new());
        let resources = tester.resource_types();
        for name in [
            "zabbix_application",
            "zabbix_host",
            "zabbix_hostgroup",
            "zabbix_item_agent",
            "zabbix_item_aggregate",
            "zabbix_item_dependent",
            "zabbix_item_http",
            "zabbix_item_internal",
            "zabbix_item_simple",
            "zabbix_item_snmp",
            "zabbix_item_trapper",
            "zabbix_template",
            "zabbix_trigger",
        ] {
            assert!(resources.iter().any(|r| r == name), "missing {name}");
        }
        assert_eq!(resources.len(), 13);
        assert_eq!(
            tester.data_source_types(),
            vec![
                "zabbix_application",
                "zabbix_host",
                "zabbix_hostgroup",
                "zabbix_proxy",
                "zabbix_template"
            ]
        );
        assert!(tester.provider().metadata().capabilities.plan_destroy);
    }

    #[test]
    fn test_every_resource_schema_has_computed_id() {
        let schema = ZabbixProvider::new().schema();
        for (name, resource) in &schema.resources {
            let id = resource
                .block
                .attributes
                .get("id")
                .unwrap_or_else(|| panic!("{name} has no id"));
            assert!(id.flags.is_computed_only(), "{name} id is not computed");
        }
    }

    #[tokio::test]
    async fn test_operations_require_configure() {
        let tester = ProviderTester::new(ZabbixProvider::new());
        let err = tester
            .create("zabbix_hostgroup", json!({"name": "Linux servers"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (_server, tester) = test_support::configured().await;
        let err = tester.read("zabbix_widget", json!({"id": "1"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_configure_returns_validation_diagnostics() {
        let tester = ProviderTester::new(ZabbixProvider::new());
        let diagnostics = tester
            .provider()
            .configure(json!({"username": "Admin", "password": "zabbix", "url": "ftp://zabbix"}))
            .await
            .unwrap();
        assert_error_contains(&diagnostics, "Invalid value for attribute 'url'");
    }

    #[tokio::test]
    async fn test_configure_surfaces_login_failure() {
        let server = wiremock::MockServer::start().await;
        mock::respond_error(&server, "user.login", -32602, "Login name or password is incorrect.")
            .await;

        let tester = ProviderTester::new(ZabbixProvider::new());
        let err = tester
            .provider()
            .configure(json!({
                "username": "Admin",
                "password": "wrong",
                "url": mock::endpoint(&server),
            }))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid params. (-32602): Login name or password is incorrect."
        );
    }

    #[tokio::test]
    async fn test_read_without_id_is_null() {
        let (_server, tester) = test_support::configured().await;
        let state = tester
            .read("zabbix_application", json!({"id": null, "name": "CPU"}))
            .await
            .unwrap();
        assert_eq!(state, Value::Null);
    }

    #[tokio::test]
    async fn test_import_missing_object_is_not_found() {
        let (server, tester) = test_support::configured().await;
        mock::respond(&server, "hostgroup.get", json!([])).await;

        let err = tester
            .import_resource("zabbix_hostgroup", "404")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stop_releases_client() {
        let (_server, tester) = test_support::configured().await;
        tester.stop().await.unwrap();
        let err = tester
            .read("zabbix_hostgroup", json!({"id": "2"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[test]
    fn test_at_most_one() {
        assert_eq!(at_most_one(Vec::<u8>::new(), "hosts").unwrap(), None);
        assert_eq!(at_most_one(vec![7], "hosts").unwrap(), Some(7));
        let err = at_most_one(vec![1, 2], "hosts").unwrap_err();
        assert_eq!(err.to_string(), "multiple hosts found");
    }

    #[test]
    fn test_choices() {
        let priorities = Choices(&[("info", "1"), ("warn", "2")]);
        assert_eq!(priorities.code("warn").unwrap(), "2");
        assert!(priorities.code("fatal").is_err());
        assert_eq!(priorities.name("1"), "info");
        assert_eq!(priorities.name("9"), "9");
    }

    #[test]
    fn test_lookup_filter_skips_unset_keys() {
        let d = ResourceData::from_state(json!({"hostid": "10084", "name": ""}));
        let filter = lookup_filter(&d, &["applicationid", "hostid", "name"]);
        assert_eq!(Value::Object(filter), json!({"hostid": "10084"}));
    }
}

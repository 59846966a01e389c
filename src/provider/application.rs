//! `zabbix_application` resource and data source.

use serde_json::json;
use tracing::{debug, trace};

use super::{at_most_one, id_attribute, lookup_filter, params, DataSource, Resource, ResourceData};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, ValueValidator};
use crate::zabbix::{Application, ZabbixApi};

const TYPE_NAME: &str = "zabbix_application";

pub(crate) struct ApplicationResource;

pub(crate) struct ApplicationDataSource;

fn build(d: &ResourceData) -> Application {
    Application {
        application_id: d.id().to_string(),
        host_id: d.get_str("hostid").to_string(),
        name: d.get_str("name").to_string(),
    }
}

fn flatten(application: Application, d: &mut ResourceData) {
    d.set_id(application.application_id);
    d.set("name", application.name);
    d.set("hostid", application.host_id);
}

#[async_trait::async_trait]
impl Resource for ApplicationResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Named group of items on a host or template")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the application"),
            )
            .with_attribute(
                "hostid",
                Attribute::required_string()
                    .with_description("Id of the host or template the application belongs to")
                    .with_validator(ValueValidator::Numeric)
                    .with_force_new(),
            )
    }

    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut applications = [build(d)];
        trace!(?applications, "creating application");
        api.applications_create(&mut applications).await?;

        let [created] = applications;
        debug!(applicationid = %created.application_id, "created application");
        d.set_id(created.application_id);
        self.read(api, d).await
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let found = api
            .applications_get(params(json!({ "applicationids": d.id() })))
            .await?;
        match at_most_one(found, "applications")? {
            Some(application) => flatten(application, d),
            None => d.set_id(""),
        }
        Ok(())
    }

    async fn update(&self, _api: &ZabbixApi, _d: &mut ResourceData) -> Result<(), ProviderError> {
        Err(ProviderError::Unimplemented(
            "zabbix_application cannot be updated".to_string(),
        ))
    }

    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError> {
        api.applications_delete_by_ids(&[d.id().to_string()])
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSource for ApplicationDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up an application")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "applicationid",
                Attribute::optional_computed_string().with_validator(ValueValidator::Numeric),
            )
            .with_attribute(
                "hostid",
                Attribute::required_string()
                    .with_description("Host or template the application belongs to")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_attribute("name", Attribute::required_string())
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let filter = lookup_filter(d, &["applicationid", "hostid", "name"]);
        debug!(?filter, "looking up application");

        let found = api
            .applications_get(params(json!({ "filter": filter })))
            .await?;
        if let Some(application) = at_most_one(found, "applications")? {
            d.set("applicationid", application.application_id.clone());
            flatten(application, d);
        }
        Ok(())
    }
}

//! `zabbix_template` resource and data source, plus the user macro block
//! shared with hosts.

use serde_json::json;
use tracing::{debug, trace};

use super::{at_most_one, id_attribute, lookup_filter, params, DataSource, Resource, ResourceData};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema, ValueValidator};
use crate::zabbix::{GroupRef, Macro, Template, TemplateRef, ZabbixApi};

const TYPE_NAME: &str = "zabbix_template";

pub(crate) struct TemplateResource;

pub(crate) struct TemplateDataSource;

/// The `macro` block of hosts and templates.
pub(super) fn macro_block() -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description("User macro")
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Macro name, e.g. {$PORT}"),
            )
            .with_attribute("value", Attribute::required_string()),
    )
}

pub(super) fn build_macros(d: &ResourceData) -> Vec<Macro> {
    d.get_blocks("macro")
        .iter()
        .map(|m| Macro {
            name: m.get_str("name").to_string(),
            value: m.get_str("value").to_string(),
        })
        .collect()
}

pub(super) fn flatten_macros(macros: Vec<Macro>) -> Vec<ResourceData> {
    macros
        .into_iter()
        .map(|m| {
            let mut block = ResourceData::new();
            block.set("name", m.name);
            block.set("value", m.value);
            block
        })
        .collect()
}

pub(super) fn group_refs(d: &ResourceData) -> Vec<GroupRef> {
    d.get_string_list("groups")
        .into_iter()
        .map(|group_id| GroupRef { group_id })
        .collect()
}

pub(super) fn template_refs(d: &ResourceData) -> Vec<TemplateRef> {
    d.get_string_list("templates")
        .into_iter()
        .map(|template_id| TemplateRef { template_id })
        .collect()
}

fn build(d: &ResourceData) -> Template {
    Template {
        template_id: d.id().to_string(),
        host: d.get_str("host").to_string(),
        name: d.get_str("name").to_string(),
        description: d.get_str("description").to_string(),
        groups: group_refs(d),
        templates: template_refs(d),
        parent_templates: Vec::new(),
        macros: build_macros(d),
    }
}

fn flatten(template: Template, d: &mut ResourceData) {
    d.set("host", template.host);
    d.set("name", template.name);
    d.set("description", template.description);
    d.set_strings("groups", template.groups.into_iter().map(|g| g.group_id));
    d.set_strings(
        "templates",
        template.parent_templates.into_iter().map(|t| t.template_id),
    );
    d.set_blocks("macro", flatten_macros(template.macros));
}

#[async_trait::async_trait]
impl Resource for TemplateResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Template of items, triggers and macros linked to hosts")
            .with_attribute("id", id_attribute())
            .with_attribute(
                "host",
                Attribute::required_string().with_description("Technical name of the template"),
            )
            .with_attribute(
                "name",
                Attribute::optional_computed_string().with_description("Visible name"),
            )
            .with_attribute(
                "description",
                Attribute::optional_string().with_default(json!("")),
            )
            .with_attribute(
                "groups",
                Attribute::required_string_set()
                    .with_description("Ids of the host groups the template belongs to")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_attribute(
                "templates",
                Attribute::optional_string_set()
                    .with_description("Ids of linked templates")
                    .with_validator(ValueValidator::Numeric),
            )
            .with_block("macro", macro_block())
    }

    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut templates = [build(d)];
        trace!(?templates, "creating template");
        api.templates_create(&mut templates).await?;

        let [created] = templates;
        debug!(templateid = %created.template_id, "created template");
        d.set_id(created.template_id);
        self.read(api, d).await
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let found = api
            .templates_get(params(json!({
                "templateids": d.id(),
                "selectGroups": "extend",
                "selectParentTemplates": "extend",
                "selectMacros": "extend",
            })))
            .await?;
        match at_most_one(found, "templates")? {
            Some(template) => flatten(template, d),
            None => d.set_id(""),
        }
        Ok(())
    }

    async fn update(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let template = build(d);
        trace!(?template, "updating template");
        api.templates_update(&[template]).await?;
        self.read(api, d).await
    }

    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError> {
        api.templates_delete_by_ids(&[d.id().to_string()]).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSource for TemplateDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a template by technical or visible name")
            .with_attribute("id", id_attribute())
            .with_attribute("host", Attribute::optional_computed_string())
            .with_attribute("name", Attribute::optional_computed_string())
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("groups", Attribute::computed_string_set())
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let filter = lookup_filter(d, &["host", "name"]);
        if filter.is_empty() {
            return Err(ProviderError::Validation(
                "one of 'host' or 'name' must be set".to_string(),
            ));
        }
        debug!(?filter, "looking up template");

        let found = api
            .templates_get(params(json!({
                "filter": filter,
                "selectGroups": "extend",
            })))
            .await?;
        if let Some(template) = at_most_one(found, "templates")? {
            d.set_id(template.template_id);
            d.set("host", template.host);
            d.set("name", template.name);
            d.set("description", template.description);
            d.set_strings("groups", template.groups.into_iter().map(|g| g.group_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::ProviderError;
    use crate::provider::test_support::configured;
    use crate::zabbix::mock;

    fn remote_template() -> serde_json::Value {
        json!([{
            "templateid": "10600",
            "host": "tpl-nginx",
            "name": "Nginx",
            "description": "",
            "groups": [{"groupid": "1", "name": "Templates"}],
            "parentTemplates": [{"templateid": "10001", "name": "Linux"}],
            "macros": [{"hostmacroid": "7", "hostid": "10600", "macro": "{$PORT}", "value": "80"}]
        }])
    }

    #[tokio::test]
    async fn test_create_sends_links_and_reads_back() {
        let (server, tester) = configured().await;
        mock::respond(&server, "template.create", json!({"templateids": ["10600"]})).await;
        mock::respond(&server, "template.get", remote_template()).await;

        let state = tester
            .create(
                "zabbix_template",
                json!({
                    "host": "tpl-nginx",
                    "name": "Nginx",
                    "description": "",
                    "groups": ["1"],
                    "templates": ["10001"],
                    "macro": [{"name": "{$PORT}", "value": "80"}]
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            state,
            json!({
                "id": "10600",
                "host": "tpl-nginx",
                "name": "Nginx",
                "description": "",
                "groups": ["1"],
                "templates": ["10001"],
                "macro": [{"name": "{$PORT}", "value": "80"}]
            })
        );

        let create = mock::request_body(&server, "template.create").await;
        assert_eq!(
            create["params"],
            json!([{
                "host": "tpl-nginx",
                "name": "Nginx",
                "description": "",
                "groups": [{"groupid": "1"}],
                "templates": [{"templateid": "10001"}],
                "macros": [{"macro": "{$PORT}", "value": "80"}]
            }])
        );
    }

    #[tokio::test]
    async fn test_data_source_requires_a_filter() {
        let (_server, tester) = configured().await;
        let err = tester
            .read_data_source("zabbix_template", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_data_source_by_name() {
        let (server, tester) = configured().await;
        mock::respond(&server, "template.get", remote_template()).await;

        let state = tester
            .read_data_source("zabbix_template", json!({"name": "Nginx"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "10600");
        assert_eq!(state["host"], "tpl-nginx");
        assert_eq!(state["groups"], json!(["1"]));

        let body = mock::request_body(&server, "template.get").await;
        assert_eq!(body["params"]["filter"], json!({"name": "Nginx"}));
    }

    #[tokio::test]
    async fn test_update_clears_description_and_macros() {
        let (server, tester) = configured().await;
        mock::respond(&server, "template.update", json!({"templateids": ["10600"]})).await;
        mock::respond(
            &server,
            "template.get",
            json!([{"templateid": "10600", "host": "tpl-nginx", "name": "Nginx web",
                    "description": "", "groups": [{"groupid": "1"}],
                    "parentTemplates": [], "macros": []}]),
        )
        .await;

        let prior = json!({"id": "10600", "host": "tpl-nginx", "name": "Nginx",
                           "description": "Web servers", "groups": ["1"],
                           "templates": ["10001"],
                           "macro": [{"name": "{$PORT}", "value": "80"}]});
        let planned = json!({"id": "10600", "host": "tpl-nginx", "name": "Nginx web",
                             "description": "", "groups": ["1"], "templates": [],
                             "macro": []});

        let state = tester.update("zabbix_template", prior, planned).await.unwrap();
        assert_eq!(state["name"], "Nginx web");
        assert_eq!(state["description"], "");
        assert_eq!(state["templates"], json!([]));
        assert_eq!(state["macro"], json!([]));

        let update = mock::request_body(&server, "template.update").await;
        let params = &update["params"][0];
        assert_eq!(params["templateid"], "10600");
        assert_eq!(params["name"], "Nginx web");
        assert_eq!(params["description"], "");
        assert_eq!(params["templates"], json!([]));
        assert_eq!(params["macros"], json!([]));
        assert_eq!(params["groups"], json!([{"groupid": "1"}]));
    }

    #[tokio::test]
    async fn test_delete() {
        let (server, tester) = configured().await;
        mock::respond(&server, "template.delete", json!({"templateids": ["10600"]})).await;

        tester
            .delete("zabbix_template", json!({"id": "10600", "host": "tpl-nginx"}))
            .await
            .unwrap();

        let delete = mock::request_body(&server, "template.delete").await;
        assert_eq!(delete["params"], json!(["10600"]));
    }
}

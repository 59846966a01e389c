use serde::{Deserialize, Serialize};

use super::{GroupRef, Macro, Params, TemplateRef, ZabbixApi, ZabbixError};

/// A template. Linked templates follow the same send/receive split as
/// [`Host`](super::Host).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    /// Empty until the template is created.
    #[serde(rename = "templateid", skip_serializing_if = "String::is_empty")]
    pub template_id: String,
    /// Technical template name.
    pub host: String,
    /// Visible name; Zabbix uses `host` when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Host groups, at least one.
    pub groups: Vec<GroupRef>,
    /// Templates to link.
    #[serde(skip_deserializing)]
    pub templates: Vec<TemplateRef>,
    /// Linked templates as reported by `template.get`.
    #[serde(rename = "parentTemplates", skip_serializing)]
    pub parent_templates: Vec<TemplateRef>,
    /// User macros.
    pub macros: Vec<Macro>,
}

impl ZabbixApi {
    /// `template.get`
    pub async fn templates_get(&self, params: Params) -> Result<Vec<Template>, ZabbixError> {
        self.get_objects("template.get", params).await
    }

    /// `template.create`; fills in the id of every created template.
    pub async fn templates_create(&self, templates: &mut [Template]) -> Result<(), ZabbixError> {
        let ids = self
            .create_objects("template.create", templates, "templateids")
            .await?;
        for (template, id) in templates.iter_mut().zip(ids) {
            template.template_id = id;
        }
        Ok(())
    }

    /// `template.update`
    pub async fn templates_update(&self, templates: &[Template]) -> Result<(), ZabbixError> {
        self.update_objects("template.update", templates, "templateids")
            .await
    }

    /// `template.delete`
    pub async fn templates_delete_by_ids(&self, ids: &[String]) -> Result<(), ZabbixError> {
        self.delete_ids("template.delete", ids, "templateids").await
    }
}

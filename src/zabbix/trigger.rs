use serde::{Deserialize, Serialize};

use super::{Params, ZabbixApi, ZabbixError};

/// Reference to another trigger, used for dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRef {
    /// Trigger id.
    #[serde(rename = "triggerid")]
    pub trigger_id: String,
}

/// A trigger. The remote API calls the trigger name `description`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    /// Empty until the trigger is created.
    #[serde(rename = "triggerid", skip_serializing_if = "String::is_empty")]
    pub trigger_id: String,
    /// Trigger name.
    pub description: String,
    /// Problem expression.
    pub expression: String,
    /// Free-form notes.
    pub comments: String,
    /// Severity code, `0` (not classified) to `5` (disaster).
    pub priority: String,
    /// `0` enabled, `1` disabled.
    pub status: String,
    /// `"1"` generates an event on every problem evaluation.
    #[serde(rename = "type")]
    pub kind: String,
    /// URL shown with problems.
    pub url: String,
    /// `0` expression, `1` recovery expression, `2` none.
    pub recovery_mode: String,
    /// Used when `recovery_mode` is `1`.
    pub recovery_expression: String,
    /// `0` all problems, `1` by tag.
    pub correlation_mode: String,
    /// Tag used when `correlation_mode` is `1`.
    pub correlation_tag: String,
    /// `1` allows closing problems by hand.
    pub manual_close: String,
    /// Triggers this one depends on.
    pub dependencies: Vec<TriggerRef>,
}

impl ZabbixApi {
    /// `trigger.get`
    pub async fn triggers_get(&self, params: Params) -> Result<Vec<Trigger>, ZabbixError> {
        self.get_objects("trigger.get", params).await
    }

    /// `trigger.create`; fills in the id of every created trigger.
    pub async fn triggers_create(&self, triggers: &mut [Trigger]) -> Result<(), ZabbixError> {
        let ids = self
            .create_objects("trigger.create", triggers, "triggerids")
            .await?;
        for (trigger, id) in triggers.iter_mut().zip(ids) {
            trigger.trigger_id = id;
        }
        Ok(())
    }

    /// `trigger.update`
    pub async fn triggers_update(&self, triggers: &[Trigger]) -> Result<(), ZabbixError> {
        self.update_objects("trigger.update", triggers, "triggerids")
            .await
    }

    /// `trigger.delete`
    pub async fn triggers_delete_by_ids(&self, ids: &[String]) -> Result<(), ZabbixError> {
        self.delete_ids("trigger.delete", ids, "triggerids").await
    }
}

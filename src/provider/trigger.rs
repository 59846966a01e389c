//! `zabbix_trigger` resource.

use serde_json::json;
use tracing::{debug, trace};

use super::{at_most_one, flag, id_attribute, params, Choices, Resource, ResourceData};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, ValueValidator};
use crate::zabbix::{Trigger, TriggerRef, ZabbixApi};

const PRIORITIES: Choices = Choices(&[
    ("not_classified", "0"),
    ("info", "1"),
    ("warn", "2"),
    ("average", "3"),
    ("high", "4"),
    ("disaster", "5"),
]);

const RECOVERY_EXPRESSION: &str = "0";
const RECOVERY_RECOVERY_EXPRESSION: &str = "1";
const RECOVERY_NONE: &str = "2";

pub(crate) struct TriggerResource;

fn build(d: &ResourceData) -> Result<Trigger, ProviderError> {
    let recovery_expression = d.get_str("recovery_expression");
    let recovery_mode = if d.get_bool("recovery_none", false) {
        RECOVERY_NONE
    } else if recovery_expression.is_empty() {
        RECOVERY_EXPRESSION
    } else {
        RECOVERY_RECOVERY_EXPRESSION
    };
    let correlation_tag = d.get_str("correlation_tag");

    Ok(Trigger {
        trigger_id: d.id().to_string(),
        description: d.get_str("name").to_string(),
        expression: d.get_str("expression").to_string(),
        comments: d.get_str("comments").to_string(),
        priority: PRIORITIES
            .code(d.get_ok_str("priority").unwrap_or("not_classified"))?
            .to_string(),
        status: flag(!d.get_bool("enabled", true)),
        kind: flag(d.get_bool("multiple", false)),
        url: d.get_str("url").to_string(),
        recovery_mode: recovery_mode.to_string(),
        recovery_expression: recovery_expression.to_string(),
        correlation_mode: flag(!correlation_tag.is_empty()),
        correlation_tag: correlation_tag.to_string(),
        manual_close: flag(d.get_bool("manual_close", false)),
        dependencies: d
            .get_string_list("dependencies")
            .into_iter()
            .map(|trigger_id| TriggerRef { trigger_id })
            .collect(),
    })
}

fn flatten(trigger: Trigger, d: &mut ResourceData) {
    d.set("name", trigger.description);
    d.set("expression", trigger.expression);
    d.set("comments", trigger.comments);
    d.set("priority", PRIORITIES.name(&trigger.priority));
    d.set("enabled", trigger.status == "0");
    d.set("multiple", trigger.kind == "1");
    d.set("url", trigger.url);
    d.set("recovery_none", trigger.recovery_mode == RECOVERY_NONE);
    d.set("recovery_expression", trigger.recovery_expression);
    d.set("correlation_tag", trigger.correlation_tag);
    d.set("manual_close", trigger.manual_close == "1");
    d.set_strings(
        "dependencies",
        trigger.dependencies.into_iter().map(|t| t.trigger_id),
    );
}

#[async_trait::async_trait]
impl Resource for TriggerResource {
    fn type_name(&self) -> &'static str {
        "zabbix_trigger"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Trigger evaluating an expression over item data")
            .with_attribute("id", id_attribute())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "expression",
                Attribute::required_string()
                    .with_description("Problem expression, e.g. {web-01:system.cpu.load.last()}>5"),
            )
            .with_attribute(
                "comments",
                Attribute::optional_string().with_default(json!("")),
            )
            .with_attribute(
                "priority",
                Attribute::optional_string()
                    .with_default(json!("not_classified"))
                    .with_validator(ValueValidator::one_of(PRIORITIES.names())),
            )
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "multiple",
                Attribute::optional_bool()
                    .with_description("Generate a problem event on every failing evaluation")
                    .with_default(json!(false)),
            )
            .with_attribute("url", Attribute::optional_string().with_default(json!("")))
            .with_attribute(
                "recovery_none",
                Attribute::optional_bool()
                    .with_description("Never recover automatically")
                    .with_default(json!(false)),
            )
            .with_attribute(
                "recovery_expression",
                Attribute::optional_string().with_default(json!("")),
            )
            .with_attribute(
                "manual_close",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "correlation_tag",
                Attribute::optional_string().with_default(json!("")),
            )
            .with_attribute(
                "dependencies",
                Attribute::optional_string_set()
                    .with_description("Ids of triggers this trigger depends on")
                    .with_validator(ValueValidator::Numeric),
            )
    }

    async fn create(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let mut triggers = [build(d)?];
        trace!(?triggers, "creating trigger");
        api.triggers_create(&mut triggers).await?;

        let [created] = triggers;
        debug!(triggerid = %created.trigger_id, "created trigger");
        d.set_id(created.trigger_id);
        self.read(api, d).await
    }

    async fn read(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let found = api
            .triggers_get(params(json!({
                "triggerids": d.id(),
                "expandExpression": true,
                "selectDependencies": "extend",
            })))
            .await?;
        match at_most_one(found, "triggers")? {
            Some(trigger) => flatten(trigger, d),
            None => d.set_id(""),
        }
        Ok(())
    }

    async fn update(&self, api: &ZabbixApi, d: &mut ResourceData) -> Result<(), ProviderError> {
        let trigger = build(d)?;
        trace!(?trigger, "updating trigger");
        api.triggers_update(&[trigger]).await?;
        self.read(api, d).await
    }

    async fn delete(&self, api: &ZabbixApi, d: &ResourceData) -> Result<(), ProviderError> {
        api.triggers_delete_by_ids(&[d.id().to_string()]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::provider::test_support::configured;
    use crate::zabbix::mock;

    #[test]
    fn test_build_maps_names_to_codes() {
        let d = ResourceData::from_state(json!({
            "name": "High CPU load on {HOST.NAME}",
            "expression": "{web-01:system.cpu.load.last()}>5",
            "priority": "high",
            "enabled": false,
            "multiple": true,
            "recovery_expression": "{web-01:system.cpu.load.last()}<2",
            "correlation_tag": "service",
            "manual_close": true,
            "dependencies": ["13501"]
        }));

        let trigger = build(&d).unwrap();
        assert_eq!(trigger.description, "High CPU load on {HOST.NAME}");
        assert_eq!(trigger.priority, "4");
        assert_eq!(trigger.status, "1");
        assert_eq!(trigger.kind, "1");
        assert_eq!(trigger.recovery_mode, RECOVERY_RECOVERY_EXPRESSION);
        assert_eq!(trigger.correlation_mode, "1");
        assert_eq!(trigger.manual_close, "1");
        assert_eq!(
            trigger.dependencies,
            vec![TriggerRef {
                trigger_id: "13501".to_string()
            }]
        );
    }

    #[test]
    fn test_recovery_none_wins() {
        let d = ResourceData::from_state(json!({
            "name": "t", "expression": "e",
            "recovery_none": true,
            "recovery_expression": "{web-01:system.cpu.load.last()}<2"
        }));
        assert_eq!(build(&d).unwrap().recovery_mode, RECOVERY_NONE);
    }

    #[test]
    fn test_unknown_priority() {
        let d = ResourceData::from_state(json!({"name": "t", "expression": "e", "priority": "urgent"}));
        assert!(matches!(build(&d), Err(ProviderError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let (server, tester) = configured().await;
        mock::respond(&server, "trigger.create", json!({"triggerids": ["13502"]})).await;
        mock::respond(
            &server,
            "trigger.get",
            json!([{
                "triggerid": "13502",
                "description": "High CPU load",
                "expression": "{web-01:system.cpu.load.last()}>5",
                "comments": "",
                "priority": "3",
                "status": "0",
                "type": "0",
                "url": "",
                "recovery_mode": "0",
                "recovery_expression": "",
                "correlation_mode": "0",
                "correlation_tag": "",
                "manual_close": "0",
                "dependencies": [{"triggerid": "13501", "description": "Host down"}]
            }]),
        )
        .await;

        let state = tester
            .create(
                "zabbix_trigger",
                json!({
                    "name": "High CPU load",
                    "expression": "{web-01:system.cpu.load.last()}>5",
                    "priority": "average",
                    "dependencies": ["13501"]
                }),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "13502");
        assert_eq!(state["name"], "High CPU load");
        assert_eq!(state["priority"], "average");
        assert_eq!(state["enabled"], true);
        assert_eq!(state["recovery_none"], false);
        assert_eq!(state["dependencies"], json!(["13501"]));

        let get = mock::request_body(&server, "trigger.get").await;
        assert_eq!(get["params"]["expandExpression"], true);
        let create = mock::request_body(&server, "trigger.create").await;
        assert_eq!(create["params"][0]["dependencies"], json!([{"triggerid": "13501"}]));
    }

    #[tokio::test]
    async fn test_update_clears_url_and_dependencies() {
        let (server, tester) = configured().await;
        mock::respond(&server, "trigger.update", json!({"triggerids": ["13502"]})).await;
        mock::respond(
            &server,
            "trigger.get",
            json!([{"triggerid": "13502", "description": "High CPU load",
                    "expression": "{web-01:system.cpu.load.last()}>5", "priority": "4",
                    "status": "0", "type": "0", "url": "", "recovery_mode": "0",
                    "manual_close": "0", "dependencies": []}]),
        )
        .await;

        let prior = json!({"id": "13502", "name": "High CPU load",
                           "expression": "{web-01:system.cpu.load.last()}>5",
                           "priority": "average", "url": "https://wiki.example.com/cpu",
                           "dependencies": ["13501"]});
        let mut planned = prior.clone();
        planned["priority"] = json!("high");
        planned["url"] = json!("");
        planned["dependencies"] = json!([]);

        let state = tester.update("zabbix_trigger", prior, planned).await.unwrap();
        assert_eq!(state["priority"], "high");
        assert_eq!(state["url"], "");
        assert_eq!(state["dependencies"], json!([]));

        let update = mock::request_body(&server, "trigger.update").await;
        let params = &update["params"][0];
        assert_eq!(params["triggerid"], "13502");
        assert_eq!(params["priority"], "4");
        assert_eq!(params["url"], "");
        assert_eq!(params["dependencies"], json!([]));
    }

    #[tokio::test]
    async fn test_delete() {
        let (server, tester) = configured().await;
        mock::respond(&server, "trigger.delete", json!({"triggerids": ["13502"]})).await;

        tester
            .delete("zabbix_trigger", json!({"id": "13502", "name": "High CPU load"}))
            .await
            .unwrap();

        let delete = mock::request_body(&server, "trigger.delete").await;
        assert_eq!(delete["params"], json!(["13502"]));
    }
}

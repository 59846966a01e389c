//! Plan computation shared by every resource.
//!
//! Resources in this provider have no custom planning logic: the planned
//! state is the proposed configuration with defaults applied, and changes
//! are found by comparing top-level attributes and blocks with the prior
//! state.

use serde_json::Value;

use crate::schema::{Block, BlockNestingMode, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Name of the identity attribute every resource carries.
pub const ID_ATTRIBUTE: &str = "id";

/// Compute the plan for moving a resource from `prior` to `proposed`.
///
/// `prior` of `None` or `null` plans a create; a `null` proposal plans a
/// destroy.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.filter(|v| !v.is_null());

    match (prior, proposed) {
        (None, Value::Null) => PlanResult::no_change(Value::Null),
        (Some(prior), Value::Null) => plan_destroy(schema, prior),
        (None, proposed) => plan_create(schema, proposed),
        (Some(prior), proposed) => plan_update(schema, prior, proposed),
    }
}

fn plan_create(schema: &Schema, proposed: &Value) -> PlanResult {
    let mut planned = proposed.clone();
    schema.block.apply_defaults(&mut planned);

    if let Some(obj) = planned.as_object_mut() {
        for (name, attr) in &schema.block.attributes {
            if attr.flags.computed && !obj.contains_key(name) {
                obj.insert(name.clone(), Value::Null);
            }
        }
    }

    let mut changes: Vec<AttributeChange> = field_names(schema)
        .filter_map(|name| {
            let value = planned.get(name).filter(|v| !v.is_null())?;
            Some(AttributeChange::added(name, value.clone()))
        })
        .collect();
    sort_changes(&mut changes);

    PlanResult {
        planned_state: planned,
        changes,
        requires_replace: false,
    }
}

fn plan_update(schema: &Schema, prior: &Value, proposed: &Value) -> PlanResult {
    let mut planned = proposed.clone();
    schema.block.apply_defaults(&mut planned);

    if let Some(obj) = planned.as_object_mut() {
        for (name, attr) in &schema.block.attributes {
            if !attr.flags.computed || !obj.get(name).map_or(true, Value::is_null) {
                continue;
            }
            if let Some(previous) = prior.get(name) {
                obj.insert(name.clone(), previous.clone());
            }
        }

        for (name, nested) in &schema.block.blocks {
            if nested.nesting_mode != BlockNestingMode::List {
                continue;
            }
            let (Some(Value::Array(items)), Some(Value::Array(previous))) =
                (obj.get_mut(name), prior.get(name))
            else {
                continue;
            };
            let pairs = pair_items(&nested.match_keys, items, previous);
            for (item, paired) in items.iter_mut().zip(pairs) {
                if let Some(index) = paired {
                    keep_computed(&nested.block, item, &previous[index]);
                }
            }
        }
    }

    let mut changes = Vec::new();
    let mut requires_replace = false;

    for name in field_names(schema) {
        let before = prior.get(name).unwrap_or(&Value::Null);
        let after = planned.get(name).unwrap_or(&Value::Null);
        let unordered = is_unordered(schema, name);

        if same_value(before, after, unordered) {
            continue;
        }

        if schema
            .block
            .attributes
            .get(name)
            .is_some_and(|attr| attr.force_new)
        {
            requires_replace = true;
        }

        changes.push(match (before.is_null(), after.is_null()) {
            (true, _) => AttributeChange::added(name, after.clone()),
            (false, true) => AttributeChange::removed(name, before.clone()),
            (false, false) => AttributeChange::modified(name, before.clone(), after.clone()),
        });
    }

    if requires_replace {
        if let Some(obj) = planned.as_object_mut() {
            obj.insert(ID_ATTRIBUTE.to_string(), Value::Null);
        }
    }
    sort_changes(&mut changes);

    PlanResult {
        planned_state: planned,
        changes,
        requires_replace,
    }
}

/// For each planned item, the index of the prior item it continues.
///
/// Items whose `keys` all equal a prior item's pair with it first. The rest
/// pair with the unclaimed prior item at the same position, so an item
/// edited in place keeps its computed values.
fn pair_items(keys: &[String], items: &[Value], previous: &[Value]) -> Vec<Option<usize>> {
    let mut claimed = vec![false; previous.len()];
    let mut pairs = vec![None; items.len()];

    if !keys.is_empty() {
        for (pair, item) in pairs.iter_mut().zip(items) {
            let same_keys = |prior: &Value| {
                keys.iter().all(|key| {
                    item.get(key).unwrap_or(&Value::Null) == prior.get(key).unwrap_or(&Value::Null)
                })
            };
            if let Some(index) = (0..previous.len()).find(|&i| !claimed[i] && same_keys(&previous[i])) {
                claimed[index] = true;
                *pair = Some(index);
            }
        }
    }

    for (index, pair) in pairs.iter_mut().enumerate() {
        if pair.is_none() && index < previous.len() && !claimed[index] {
            claimed[index] = true;
            *pair = Some(index);
        }
    }
    pairs
}

/// Carry computed-only attributes of a list block item over from its prior
/// counterpart.
fn keep_computed(block: &Block, item: &mut Value, previous: &Value) {
    let Some(obj) = item.as_object_mut() else {
        return;
    };
    for (name, attr) in &block.attributes {
        if !attr.flags.is_computed_only() || !obj.get(name).map_or(true, Value::is_null) {
            continue;
        }
        if let Some(value) = previous.get(name) {
            obj.insert(name.clone(), value.clone());
        }
    }
}

fn plan_destroy(schema: &Schema, prior: &Value) -> PlanResult {
    let mut changes: Vec<AttributeChange> = field_names(schema)
        .filter_map(|name| {
            let value = prior.get(name).filter(|v| !v.is_null())?;
            Some(AttributeChange::removed(name, value.clone()))
        })
        .collect();
    sort_changes(&mut changes);

    PlanResult {
        planned_state: Value::Null,
        changes,
        requires_replace: false,
    }
}

fn field_names(schema: &Schema) -> impl Iterator<Item = &str> {
    schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys())
        .map(String::as_str)
}

fn is_unordered(schema: &Schema, name: &str) -> bool {
    if let Some(attr) = schema.block.attributes.get(name) {
        return attr.attr_type.is_set();
    }
    schema
        .block
        .blocks
        .get(name)
        .is_some_and(|nested| nested.nesting_mode == BlockNestingMode::Set)
}

/// Compare two values; an empty list and null are the same, and unordered
/// values compare without regard to element order.
fn same_value(before: &Value, after: &Value, unordered: bool) -> bool {
    match (before, after) {
        (Value::Null, Value::Array(items)) | (Value::Array(items), Value::Null) => {
            items.is_empty()
        },
        (Value::Array(a), Value::Array(b)) if unordered => {
            if a.len() != b.len() {
                return false;
            }
            let mut a: Vec<String> = a.iter().map(Value::to_string).collect();
            let mut b: Vec<String> = b.iter().map(Value::to_string).collect();
            a.sort();
            b.sort();
            a == b
        },
        _ => before == after,
    }
}

fn sort_changes(changes: &mut [AttributeChange]) {
    changes.sort_by(|a, b| a.path.cmp(&b.path));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, NestedBlock};
    use serde_json::json;

    fn application_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("hostid", Attribute::required_string().with_force_new())
    }

    fn host_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("host", Attribute::required_string())
            .with_attribute("name", Attribute::optional_computed_string())
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute("groups", Attribute::required_string_set())
            .with_block(
                "interface",
                NestedBlock::list(Block::new().with_attribute("ip", Attribute::optional_string())),
            )
    }

    #[test]
    fn test_plan_create() {
        let result = plan(
            &application_schema(),
            None,
            &json!({"name": "CPU", "hostid": "10084"}),
        );

        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["id"], Value::Null);
        assert!(result.planned_state.as_object().unwrap().contains_key("id"));
        let paths: Vec<_> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["hostid", "name"]);
        assert!(result.changes.iter().all(|c| c.before.is_none()));
    }

    #[test]
    fn test_plan_create_applies_defaults() {
        let result = plan(
            &host_schema(),
            Some(&Value::Null),
            &json!({"host": "web-01", "groups": ["2"], "interface": [{"ip": "10.0.0.1"}]}),
        );

        assert_eq!(result.planned_state["enabled"], true);
        let paths: Vec<_> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["enabled", "groups", "host", "interface"]);
    }

    #[test]
    fn test_plan_update_in_place() {
        let prior = json!({"id": "551", "name": "CPU", "hostid": "10084"});
        let proposed = json!({"id": null, "name": "Memory", "hostid": "10084"});

        let result = plan(&application_schema(), Some(&prior), &proposed);

        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["id"], "551");
        assert_eq!(
            result.changes,
            vec![AttributeChange::modified("name", json!("CPU"), json!("Memory"))]
        );
    }

    #[test]
    fn test_plan_update_force_new() {
        let prior = json!({"id": "551", "name": "CPU", "hostid": "10084"});
        let proposed = json!({"name": "CPU", "hostid": "10085"});

        let result = plan(&application_schema(), Some(&prior), &proposed);

        assert!(result.requires_replace);
        assert_eq!(result.planned_state["id"], Value::Null);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].path, "hostid");
    }

    #[test]
    fn test_plan_update_no_changes() {
        let prior = json!({
            "id": "10500", "host": "web-01", "name": "web-01", "enabled": true,
            "groups": ["2", "4"], "interface": [{"ip": "10.0.0.1"}]
        });
        let proposed = json!({
            "host": "web-01", "groups": ["4", "2"], "interface": [{"ip": "10.0.0.1"}]
        });

        let result = plan(&host_schema(), Some(&prior), &proposed);

        assert!(!result.has_changes(), "{:?}", result.changes);
        assert_eq!(result.planned_state["name"], "web-01");
        assert_eq!(result.planned_state["id"], "10500");
    }

    #[test]
    fn test_plan_update_list_block_order_matters() {
        let prior = json!({
            "id": "10500", "host": "web-01", "enabled": true, "groups": ["2"],
            "interface": [{"ip": "10.0.0.1"}, {"ip": "10.0.0.2"}]
        });
        let proposed = json!({
            "host": "web-01", "groups": ["2"],
            "interface": [{"ip": "10.0.0.2"}, {"ip": "10.0.0.1"}]
        });

        let result = plan(&host_schema(), Some(&prior), &proposed);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].path, "interface");
    }

    #[test]
    fn test_plan_update_keeps_nested_computed_ids() {
        let schema = Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_block(
                "interface",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("interfaceid", Attribute::computed_string())
                        .with_attribute("ip", Attribute::optional_string()),
                ),
            );
        let prior = json!({"id": "10500", "interface": [{"interfaceid": "7", "ip": "10.0.0.1"}]});
        let proposed = json!({"interface": [{"ip": "10.0.0.9"}, {"ip": "10.0.0.2"}]});

        let result = plan(&schema, Some(&prior), &proposed);

        assert_eq!(result.planned_state["interface"][0]["interfaceid"], "7");
        assert!(result.planned_state["interface"][1].get("interfaceid").is_none());
        assert_eq!(result.changes.len(), 1);
    }

    #[test]
    fn test_plan_update_reordered_interfaces_keep_their_ids() {
        let schema = Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_block(
                "interface",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("interfaceid", Attribute::computed_string())
                        .with_attribute("type", Attribute::optional_string())
                        .with_attribute("ip", Attribute::optional_string())
                        .with_attribute("port", Attribute::optional_string()),
                )
                .with_match_keys(["type", "ip"]),
            );
        let prior = json!({"id": "10500", "interface": [
            {"interfaceid": "30", "type": "agent", "ip": "10.0.0.1", "port": ""},
            {"interfaceid": "31", "type": "snmp", "ip": "10.0.0.1", "port": ""},
            {"interfaceid": "32", "type": "agent", "ip": "10.0.0.3", "port": ""}
        ]});
        let proposed = json!({"interface": [
            {"type": "snmp", "ip": "10.0.0.1", "port": ""},
            {"type": "agent", "ip": "10.0.0.1", "port": "10051"},
            {"type": "agent", "ip": "10.0.0.4", "port": ""}
        ]});

        let result = plan(&schema, Some(&prior), &proposed);

        let interfaces = &result.planned_state["interface"];
        assert_eq!(interfaces[0]["interfaceid"], "31");
        assert_eq!(interfaces[1]["interfaceid"], "30");
        assert_eq!(interfaces[2]["interfaceid"], "32");
    }

    #[test]
    fn test_pair_items_without_keys_is_positional() {
        let pairs = pair_items(&[], &[json!({}), json!({})], &[json!({})]);
        assert_eq!(pairs, vec![Some(0), None]);
    }

    #[test]
    fn test_plan_destroy() {
        let prior = json!({"id": "551", "name": "CPU", "hostid": "10084"});

        let result = plan(&application_schema(), Some(&prior), &Value::Null);

        assert_eq!(result.planned_state, Value::Null);
        let paths: Vec<_> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["hostid", "id", "name"]);
        assert!(result.changes.iter().all(|c| c.after.is_none()));
    }

    #[test]
    fn test_same_value() {
        assert!(same_value(&json!(["1", "2"]), &json!(["2", "1"]), true));
        assert!(!same_value(&json!(["1", "2"]), &json!(["2", "1"]), false));
        assert!(!same_value(&json!(["1"]), &json!(["1", "1"]), true));
        assert!(same_value(&Value::Null, &json!([]), false));
        assert!(!same_value(&json!("a"), &json!("b"), false));
    }
}

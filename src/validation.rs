//! Configuration checks against a [`Schema`].
//!
//! Every problem found becomes an error [`Diagnostic`] whose `attribute` is
//! the dotted path to the offending value, such as `interface.0.port`.
//!
//! ```
//! use zabbix_provider::schema::{Attribute, Schema, ValueValidator};
//! use zabbix_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute(
//!         "hostid",
//!         Attribute::required_string().with_validator(ValueValidator::Numeric),
//!     );
//!
//! assert!(validate(&schema, &json!({"name": "CPU", "hostid": "10084"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "CPU", "hostid": "web-01"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("hostid"));
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema, ValueValidator};

static ZABBIX_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[0-9]+$").ok());

impl ValueValidator {
    /// Check one string, returning the reason it was rejected.
    pub fn check(&self, value: &str) -> Result<(), String> {
        match self {
            Self::NotWhitespace if value.trim().is_empty() => {
                Err("must not be empty or contain only whitespace".to_string())
            },
            Self::HttpUrl => {
                let parsed = url::Url::parse(value).map_err(|err| format!("invalid URL: {err}"))?;
                match parsed.scheme() {
                    "http" | "https" if parsed.has_host() => Ok(()),
                    scheme => Err(format!("expected an http or https URL, got scheme '{scheme}'")),
                }
            },
            Self::Numeric if !ZABBIX_ID.as_ref().is_some_and(|re| re.is_match(value)) => {
                Err(format!("'{value}' must be numeric"))
            },
            Self::OneOf(allowed) if !allowed.iter().any(|a| a == value) => Err(format!(
                "expected one of [{}], got '{value}'",
                allowed.join(", ")
            )),
            _ => Ok(()),
        }
    }
}

/// Check `value` against `schema`. An empty result means it is valid.
///
/// Computed-only attributes are ignored. String validators run on plain
/// strings and on each element of string lists and sets, but only when the
/// value already has the right type.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut walker = Walker::default();
    walker.block(&schema.block, value, "");
    walker.diagnostics
}

#[derive(Default)]
struct Walker {
    diagnostics: Vec<Diagnostic>,
}

impl Walker {
    fn error(&mut self, path: &str, summary: String, detail: Option<String>) {
        let mut diagnostic = Diagnostic::error(summary);
        if let Some(detail) = detail {
            diagnostic = diagnostic.with_detail(detail);
        }
        if !path.is_empty() {
            diagnostic = diagnostic.with_attribute(path);
        }
        self.diagnostics.push(diagnostic);
    }

    fn block(&mut self, block: &Block, value: &Value, path: &str) {
        let obj = match value {
            Value::Null => return,
            Value::Object(obj) => obj,
            other => {
                let got = format!("Got {}", kind(other));
                return self.error(path, "Expected object".to_string(), Some(got));
            },
        };

        for (name, attr) in &block.attributes {
            self.attribute(attr, obj.get(name), &child(path, name));
        }
        for (name, nested) in &block.blocks {
            self.nested(nested, obj.get(name), &child(path, name));
        }
    }

    fn attribute(&mut self, attr: &Attribute, value: Option<&Value>, path: &str) {
        if attr.flags.is_computed_only() {
            return;
        }
        let Some(value) = value.filter(|v| !v.is_null()) else {
            if attr.flags.required {
                self.error(
                    path,
                    format!("Missing required attribute '{path}'"),
                    Some("This attribute is required and must be provided".to_string()),
                );
            }
            return;
        };

        let errors_before = self.diagnostics.len();
        self.typed(&attr.attr_type, value, path);
        if self.diagnostics.len() == errors_before {
            self.values(&attr.validators, value, path);
        }
    }

    fn typed(&mut self, attr_type: &AttributeType, value: &Value, path: &str) {
        let ok = match (attr_type, value) {
            (AttributeType::String, Value::String(_)) | (AttributeType::Bool, Value::Bool(_)) => {
                true
            },
            (AttributeType::List(element) | AttributeType::Set(element), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.typed(element, item, &child(path, &i.to_string()));
                }
                true
            },
            (AttributeType::Map(element), Value::Object(entries)) => {
                for (key, entry) in entries {
                    self.typed(element, entry, &child(path, key));
                }
                true
            },
            (AttributeType::Object(fields), Value::Object(obj)) => {
                self.object(fields, obj, path);
                true
            },
            _ => false,
        };

        if !ok {
            let expected = match attr_type {
                AttributeType::String => "string",
                AttributeType::Bool => "bool",
                AttributeType::List(_) => "list",
                AttributeType::Set(_) => "set",
                AttributeType::Map(_) => "map",
                AttributeType::Object(_) => "object",
            };
            self.error(
                path,
                format!("Invalid type for attribute '{path}'"),
                Some(format!("Expected {expected}, got {}", kind(value))),
            );
        }
    }

    fn object(
        &mut self,
        fields: &std::collections::BTreeMap<String, AttributeType>,
        obj: &Map<String, Value>,
        path: &str,
    ) {
        for (name, field_type) in fields {
            if let Some(value) = obj.get(name) {
                self.typed(field_type, value, &child(path, name));
            }
        }
    }

    fn values(&mut self, validators: &[ValueValidator], value: &Value, path: &str) {
        match value {
            Value::String(s) => {
                for reason in validators.iter().filter_map(|v| v.check(s).err()) {
                    self.error(path, format!("Invalid value for attribute '{path}'"), Some(reason));
                }
            },
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.values(validators, item, &child(path, &i.to_string()));
                }
            },
            _ => {},
        }
    }

    fn nested(&mut self, nested: &NestedBlock, value: Option<&Value>, path: &str) {
        let items = match value {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                let got = format!("Got {}", kind(other));
                return self.error(path, format!("Expected list for block '{path}'"), Some(got));
            },
        };

        let len = items.len() as u32;
        if len < nested.min_items {
            self.error(
                path,
                format!("Block '{path}' requires at least {} item(s), got {len}", nested.min_items),
                None,
            );
        }
        if nested.max_items > 0 && len > nested.max_items {
            self.error(
                path,
                format!("Block '{path}' allows at most {} item(s), got {len}", nested.max_items),
                None,
            );
        }

        for (i, item) in items.iter().enumerate() {
            self.block(&nested.block, item, &child(path, &i.to_string()));
        }
    }
}

fn child(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeFlags;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn attributes(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().filter_map(|d| d.attribute.as_deref()).collect()
    }

    #[test]
    fn test_required_name() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "Linux servers"})).is_empty());
        assert_eq!(attributes(&validate(&schema, &json!({}))), ["name"]);
        assert_eq!(validate(&schema, &json!({"name": null})).len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics[0].summary, "Invalid type for attribute 'name'");
        assert_eq!(diagnostics[0].detail.as_deref(), Some("Expected string, got number"));
    }

    #[test]
    fn test_optional_and_computed_are_not_required() {
        let schema = Schema::v0()
            .with_attribute("proxyid", Attribute::optional_string())
            .with_attribute("hostid", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"proxyid": null})).is_empty());
        assert!(validate(&schema, &json!({"hostid": 10084})).is_empty());
    }

    #[test]
    fn test_bool_rejects_string() {
        let schema = Schema::v0().with_attribute("enabled", Attribute::optional_bool());

        assert!(validate(&schema, &json!({"enabled": false})).is_empty());
        assert_eq!(validate(&schema, &json!({"enabled": "true"})).len(), 1);
    }

    #[test]
    fn test_group_ids_checked_per_element() {
        let schema = Schema::v0().with_attribute(
            "groups",
            Attribute::required_string_set().with_validator(ValueValidator::Numeric),
        );

        assert!(validate(&schema, &json!({"groups": ["2", "4"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"groups": ["2", 4]}));
        assert_eq!(attributes(&diagnostics), ["groups.1"]);
        assert!(diagnostics[0].summary.starts_with("Invalid type"));

        let diagnostics = validate(&schema, &json!({"groups": ["2", "linux"]}));
        assert_eq!(attributes(&diagnostics), ["groups.1"]);
        assert!(diagnostics[0].summary.starts_with("Invalid value"));

        let diagnostics = validate(&schema, &json!({"groups": "2"}));
        assert_eq!(diagnostics[0].detail.as_deref(), Some("Expected set, got string"));
    }

    #[test]
    fn test_header_map() {
        let schema = Schema::v0().with_attribute(
            "headers",
            Attribute::new(AttributeType::map(AttributeType::String), AttributeFlags::optional()),
        );

        assert!(validate(&schema, &json!({"headers": {"Accept": "application/json"}})).is_empty());
        assert_eq!(
            attributes(&validate(&schema, &json!({"headers": {"X-Retry": 3}}))),
            ["headers.X-Retry"]
        );
    }

    #[test]
    fn test_object_fields() {
        let fields = BTreeMap::from([
            ("ip".to_string(), AttributeType::String),
            ("main".to_string(), AttributeType::Bool),
        ]);
        let schema = Schema::v0().with_attribute(
            "interface",
            Attribute::new(AttributeType::list(AttributeType::Object(fields)), AttributeFlags::optional()),
        );

        assert!(validate(&schema, &json!({"interface": [{"ip": "10.0.0.1", "main": true}]})).is_empty());
        assert_eq!(
            attributes(&validate(&schema, &json!({"interface": [{"ip": "10.0.0.1", "main": "1"}]}))),
            ["interface.0.main"]
        );
    }

    #[test]
    fn test_validators() {
        assert!(ValueValidator::Numeric.check("10084").is_ok());
        for bad in ["", "12a", "-1"] {
            assert!(ValueValidator::Numeric.check(bad).is_err(), "{bad:?}");
        }

        assert!(ValueValidator::NotWhitespace.check("Admin").is_ok());
        assert!(ValueValidator::NotWhitespace.check(" \t").is_err());

        assert!(ValueValidator::HttpUrl.check("https://zabbix.example.com/api_jsonrpc.php").is_ok());
        assert!(ValueValidator::HttpUrl.check("http://127.0.0.1:8080/").is_ok());
        assert!(ValueValidator::HttpUrl.check("ftp://zabbix.example.com").is_err());
        assert!(ValueValidator::HttpUrl.check("zabbix.example.com").is_err());

        let interface_type = ValueValidator::one_of(["agent", "snmp", "ipmi", "jmx"]);
        assert!(interface_type.check("snmp").is_ok());
        assert!(interface_type.check("ssh").unwrap_err().contains("agent, snmp, ipmi, jmx"));
    }

    #[test]
    fn test_interface_block_counts() {
        let schema = Schema::v0().with_block(
            "interface",
            NestedBlock::list(Block::new().with_attribute(
                "type",
                Attribute::optional_string().with_validator(ValueValidator::one_of(["agent", "snmp"])),
            ))
            .with_min_items(1)
            .with_max_items(2),
        );

        assert!(validate(&schema, &json!({"interface": [{"type": "agent"}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"interface": []}));
        assert_eq!(diagnostics[0].summary, "Block 'interface' requires at least 1 item(s), got 0");
        assert_eq!(validate(&schema, &json!({})).len(), 1);

        let diagnostics = validate(
            &schema,
            &json!({"interface": [{"type": "agent"}, {"type": "snmp"}, {"type": "agent"}]}),
        );
        assert!(diagnostics[0].summary.contains("at most 2"));

        let diagnostics = validate(&schema, &json!({"interface": [{"type": "ssh"}]}));
        assert_eq!(attributes(&diagnostics), ["interface.0.type"]);

        let diagnostics = validate(&schema, &json!({"interface": {"type": "agent"}}));
        assert_eq!(diagnostics[0].summary, "Expected list for block 'interface'");
    }

    #[test]
    fn test_root_must_be_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("Linux servers"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(diagnostics[0].attribute.is_none());
    }
}

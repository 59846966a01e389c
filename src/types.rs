//! Plan, import and handshake types shared by the server and the provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One top-level attribute or block that a plan would change.
///
/// `before` is `None` when the attribute appears and `after` is `None` when
/// it goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    #[allow(missing_docs)]
    pub path: String,
    #[allow(missing_docs)]
    pub before: Option<Value>,
    #[allow(missing_docs)]
    pub after: Option<Value>,
}

impl AttributeChange {
    /// `path` goes from unset to `value`.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(value),
        }
    }

    /// `path` goes from `value` to unset.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(value),
            after: None,
        }
    }

    /// `path` goes from `before` to `after`.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }
}

/// JSON bytes, or empty for an absent value.
fn encode(value: Option<&Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(v).ok())
        .unwrap_or_default()
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            before: encode(change.before.as_ref()),
            after: encode(change.after.as_ref()),
            path: change.path,
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation; `null` when destroying.
    pub planned_state: Value,
    /// Attribute changes, sorted by path.
    pub changes: Vec<AttributeChange>,
    /// Whether the object has to be destroyed and created again.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Keep `state` as it is.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Whether applying the plan would do anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// State recovered by `ImportResourceState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Always the type the import was requested for.
    pub resource_type: String,
    #[allow(missing_docs)]
    pub state: Value,
}

impl ImportedResource {
    #[allow(missing_docs)]
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Type names the provider serves, as reported by `GetMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Sorted resource type names.
    pub resources: Vec<String>,
    /// Sorted data source type names.
    pub data_sources: Vec<String>,
    #[allow(missing_docs)]
    pub capabilities: ServerCapabilities,
}

/// Optional protocol features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider plans destroy operations.
    pub plan_destroy: bool,
}

/// Version of the plugin handshake itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the `provider.v1` gRPC protocol.
pub const APP_PROTOCOL_VERSION: u32 = 1;

/// Environment variable the plugin host sets before starting the binary.
pub const MAGIC_COOKIE_KEY: &str = "ZABBIX_PLUGIN_MAGIC_COOKIE";

/// Value [`MAGIC_COOKIE_KEY`] must hold.
pub const MAGIC_COOKIE_VALUE: &str = "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// The line written to stdout once the server is listening on `addr`.
pub fn handshake_line(addr: std::net::SocketAddr) -> String {
    format!("{CORE_PROTOCOL_VERSION}|{APP_PROTOCOL_VERSION}|tcp|{addr}|grpc")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_to_proto() {
        let proto: crate::generated::AttributeChange =
            AttributeChange::modified("hostid", json!("10084"), json!("10085")).into();
        assert_eq!(proto.path, "hostid");
        assert_eq!(proto.before, br#""10084""#.to_vec());
        assert_eq!(proto.after, br#""10085""#.to_vec());

        let proto: crate::generated::AttributeChange =
            AttributeChange::added("name", json!("CPU")).into();
        assert!(proto.before.is_empty());

        let proto: crate::generated::AttributeChange =
            AttributeChange::removed("description", json!("old")).into();
        assert!(proto.after.is_empty());
    }

    #[test]
    fn test_no_change_plan() {
        let plan = PlanResult::no_change(json!({"id": "123"}));
        assert!(!plan.has_changes());
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["id"], "123");
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("zabbix_application", json!({"id": "551"}));
        assert_eq!(imported.resource_type, "zabbix_application");
        assert_eq!(imported.state["id"], "551");
    }

    #[test]
    fn test_handshake_line() {
        let addr: std::net::SocketAddr = "127.0.0.1:41234".parse().unwrap();
        assert_eq!(handshake_line(addr), "1|1|tcp|127.0.0.1:41234|grpc");
    }
}

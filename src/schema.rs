//! Schema types describing the provider block, resources and data sources.
//!
//! Schemas drive validation, defaulting and planning, and are sent to the
//! plugin host through `GetSchema`. Every Zabbix value the provider manages
//! is a string, a flag, or a collection of those, so the type model stops
//! there.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Text, including Zabbix ids and numeric codes.
    String,
    /// `true` / `false`.
    Bool,
    /// Ordered elements.
    List(Box<AttributeType>),
    /// Elements compared without regard to order.
    Set(Box<AttributeType>),
    /// String keys to values of one type, e.g. HTTP headers.
    Map(Box<AttributeType>),
    /// Fixed fields, e.g. an interface reported by a data source.
    Object(BTreeMap<String, AttributeType>),
}

impl AttributeType {
    /// `List(element)`
    pub fn list(element: AttributeType) -> Self {
        Self::List(element.into())
    }

    /// `Set(element)`
    pub fn set(element: AttributeType) -> Self {
        Self::Set(element.into())
    }

    /// `Map(element)`
    pub fn map(element: AttributeType) -> Self {
        Self::Map(element.into())
    }

    /// Whether values of this type compare without regard to order.
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Convert a raw environment string into a value of this type.
    /// Returns `None` when the string does not parse.
    pub fn parse_env(&self, raw: &str) -> Option<Value> {
        match self {
            Self::Bool => raw.trim().parse().ok().map(Value::Bool),
            _ => Some(Value::String(raw.to_string())),
        }
    }
}

/// Who may set an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Configuration must set it.
    pub required: bool,
    /// Configuration may set it.
    pub optional: bool,
    /// The provider fills it in.
    pub computed: bool,
    /// Hidden from plan output.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Must be configured.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    /// May be configured.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    /// Read-only, set by the provider.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Self::default()
        }
    }

    /// May be configured; the provider fills it in when it is not.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::default()
        }
    }

    /// Same flags, marked sensitive.
    pub fn sensitive(self) -> Self {
        Self {
            sensitive: true,
            ..self
        }
    }

    /// Whether the attribute can only be set by the provider.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// A check applied to string attribute values during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueValidator {
    /// The value must contain something other than whitespace.
    NotWhitespace,
    /// The value must be an absolute `http` or `https` URL.
    HttpUrl,
    /// The value must consist of ASCII digits only, like a Zabbix object id.
    Numeric,
    /// The value must be one of the listed strings.
    OneOf(Vec<String>),
}

impl ValueValidator {
    /// Build a [`ValueValidator::OneOf`] from string slices.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Who may set the attribute.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Shown in documentation and by the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Changing this attribute forces the object to be replaced.
    #[serde(default)]
    pub force_new: bool,
    /// Default value used when configuration leaves the attribute unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Environment variables consulted, in order, before the default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_default: Vec<String>,
    /// Checks applied to string values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<ValueValidator>,
}

impl Attribute {
    /// An attribute with no description, default or checks.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            env_default: Vec::new(),
            validators: Vec::new(),
        }
    }

    fn string(flags: AttributeFlags) -> Self {
        Self::new(AttributeType::String, flags)
    }

    fn string_set(flags: AttributeFlags) -> Self {
        Self::new(AttributeType::set(AttributeType::String), flags)
    }

    /// Required string.
    pub fn required_string() -> Self {
        Self::string(AttributeFlags::required())
    }

    /// Optional string.
    pub fn optional_string() -> Self {
        Self::string(AttributeFlags::optional())
    }

    /// Computed string, such as an object id.
    pub fn computed_string() -> Self {
        Self::string(AttributeFlags::computed())
    }

    /// Optional string the provider fills in when unset.
    pub fn optional_computed_string() -> Self {
        Self::string(AttributeFlags::optional_computed())
    }

    /// Optional flag.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Computed flag.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Required set of strings, typically object ids.
    pub fn required_string_set() -> Self {
        Self::string_set(AttributeFlags::required())
    }

    /// Optional set of strings.
    pub fn optional_string_set() -> Self {
        Self::string_set(AttributeFlags::optional())
    }

    /// Computed set of strings.
    pub fn computed_string_set() -> Self {
        Self::string_set(AttributeFlags::computed())
    }

    #[allow(missing_docs)]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    /// Replace the object instead of updating it when this attribute changes.
    pub fn with_force_new(self) -> Self {
        Self {
            force_new: true,
            ..self
        }
    }

    #[allow(missing_docs)]
    pub fn with_default(self, default: Value) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    /// Read the value from the first set environment variable in `keys`
    /// when configuration leaves it unset.
    pub fn with_env_default<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            env_default: keys.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Add a value check.
    pub fn with_validator(mut self, validator: ValueValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Hide the value from plan output.
    pub fn sensitive(mut self) -> Self {
        self.flags = self.flags.sensitive();
        self
    }
}

/// How repeated nested blocks are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// Ordered items, e.g. host interfaces.
    #[default]
    List,
    /// Unordered items.
    Set,
}

/// Attributes and nested blocks at one level of configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// An empty block.
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(missing_docs)]
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    #[allow(missing_docs)]
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    #[allow(missing_docs)]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    /// Fill unset attributes from the process environment and static
    /// defaults. See [`Block::apply_defaults_with`].
    pub fn apply_defaults(&self, value: &mut Value) {
        self.apply_defaults_with(value, &|key| std::env::var(key).ok());
    }

    /// Fill attributes that are absent or null in `value`.
    ///
    /// The first variable in `env_default` that `lookup` resolves wins;
    /// otherwise the static default is used. Nested block items are
    /// filled recursively. `value` must be an object; anything else is
    /// left untouched.
    pub fn apply_defaults_with(&self, value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
        let Some(obj) = value.as_object_mut() else {
            return;
        };

        for (name, attr) in &self.attributes {
            if !obj.get(name).map_or(true, Value::is_null) {
                continue;
            }
            let from_env = attr
                .env_default
                .iter()
                .filter_map(|key| lookup(key))
                .find_map(|raw| attr.attr_type.parse_env(&raw));
            if let Some(v) = from_env.or_else(|| attr.default.clone()) {
                obj.insert(name.clone(), v);
            }
        }

        for (name, nested) in &self.blocks {
            if let Some(Value::Array(items)) = obj.get_mut(name) {
                for item in items {
                    nested.block.apply_defaults_with(item, lookup);
                }
            }
        }
    }
}

/// A repeated block such as `interface` or `macro`, with item count limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// Shape of each item.
    #[serde(flatten)]
    pub block: Block,
    #[allow(missing_docs)]
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Fewest items configuration may give.
    #[serde(default)]
    pub min_items: u32,
    /// Most items configuration may give; 0 means no limit.
    #[serde(default)]
    pub max_items: u32,
    /// Attributes that identify an item across plans, so computed values
    /// follow an item when the list is reordered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_keys: Vec<String>,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items: 0,
            match_keys: Vec::new(),
        }
    }

    /// Ordered, unlimited items.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List)
    }

    /// Unordered, unlimited items.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set)
    }

    #[allow(missing_docs)]
    pub fn with_min_items(self, min_items: u32) -> Self {
        Self { min_items, ..self }
    }

    #[allow(missing_docs)]
    pub fn with_max_items(self, max_items: u32) -> Self {
        Self { max_items, ..self }
    }

    /// Pair planned items with prior items by these attributes.
    pub fn with_match_keys<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            match_keys: keys.into_iter().map(Into::into).collect(),
            ..self
        }
    }
}

/// Schema of one resource type, data source type, or the provider block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped when the state layout changes.
    #[serde(default)]
    pub version: u64,
    /// Top-level attributes and blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    #[allow(missing_docs)]
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Version 0, the version of every schema in this provider.
    pub fn v0() -> Self {
        Self::new(0)
    }

    #[allow(missing_docs)]
    pub fn with_attribute(self, name: impl Into<String>, attr: Attribute) -> Self {
        Self {
            block: self.block.with_attribute(name, attr),
            ..self
        }
    }

    #[allow(missing_docs)]
    pub fn with_block(self, name: impl Into<String>, block: NestedBlock) -> Self {
        Self {
            block: self.block.with_block(name, block),
            ..self
        }
    }

    /// Set the description of the top-level block.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            block: self.block.with_description(description),
            ..self
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Every schema the provider exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// The provider block.
    #[serde(default)]
    pub provider: Schema,
    /// Keyed by resource type name.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
    /// Keyed by data source type name.
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(missing_docs)]
    pub fn with_provider_config(self, provider: Schema) -> Self {
        Self { provider, ..self }
    }

    #[allow(missing_docs)]
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    #[allow(missing_docs)]
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A problem or notice reported to the plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[allow(missing_docs)]
    pub severity: DiagnosticSeverity,
    /// One-line description, e.g. `Missing required attribute 'name'`.
    pub summary: String,
    /// Longer explanation, such as the remote API's error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the offending attribute, e.g. `interface.0.type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn new(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    #[allow(missing_docs)]
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, summary)
    }

    #[allow(missing_docs)]
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, summary)
    }

    #[allow(missing_docs)]
    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..self
        }
    }

    #[allow(missing_docs)]
    pub fn with_attribute(self, attribute: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            ..self
        }
    }

    #[allow(missing_docs)]
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

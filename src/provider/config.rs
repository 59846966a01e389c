//! Provider block configuration.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::schema::{Attribute, Diagnostic, Schema, ValueValidator};
use crate::validation::validate;
use crate::zabbix::ZabbixConfig;

/// Resolved provider block settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Zabbix user name.
    pub username: String,
    /// Zabbix password.
    pub password: String,
    /// JSON-RPC endpoint URL.
    pub url: String,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub tls_insecure: bool,
    /// Send API requests one at a time.
    #[serde(default)]
    pub serialize: bool,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("url", &self.url)
            .field("tls_insecure", &self.tls_insecure)
            .field("serialize", &self.serialize)
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Zabbix API connection settings")
            .with_attribute(
                "username",
                Attribute::required_string()
                    .with_description("User name used to log in to the API")
                    .with_env_default(["ZABBIX_USER", "ZABBIX_USERNAME"])
                    .with_validator(ValueValidator::NotWhitespace),
            )
            .with_attribute(
                "password",
                Attribute::required_string()
                    .sensitive()
                    .with_description("Password used to log in to the API")
                    .with_env_default(["ZABBIX_PASS", "ZABBIX_PASSWORD"])
                    .with_validator(ValueValidator::NotWhitespace),
            )
            .with_attribute(
                "url",
                Attribute::required_string()
                    .with_description("API endpoint, e.g. https://zabbix.example.com/api_jsonrpc.php")
                    .with_env_default(["ZABBIX_URL", "ZABBIX_SERVER_URL"])
                    .with_validator(ValueValidator::HttpUrl),
            )
            .with_attribute(
                "tls_insecure",
                Attribute::optional_bool()
                    .with_description("Disable TLS certificate verification")
                    .with_default(json!(false)),
            )
            .with_attribute(
                "serialize",
                Attribute::optional_bool()
                    .with_description("Serialize API requests")
                    .with_default(json!(false)),
            )
    }

    /// Apply environment fallbacks and defaults to a raw provider block and
    /// validate it. Returns the diagnostics when validation fails.
    pub fn resolve(config: Value) -> Result<Self, Vec<Diagnostic>> {
        let schema = Self::schema();
        let mut config = match config {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        schema.block.apply_defaults(&mut config);

        let diagnostics = validate(&schema, &config);
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }
        serde_json::from_value(config).map_err(|err| {
            vec![Diagnostic::error("Invalid provider configuration").with_detail(err.to_string())]
        })
    }

    /// Settings for the API client.
    pub fn client_config(&self) -> ZabbixConfig {
        ZabbixConfig::new(self.url.clone())
            .with_tls_no_verify(self.tls_insecure)
            .with_serialize(self.serialize)
    }
}

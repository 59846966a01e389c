//! Zabbix provider plugin
//!
//! A gRPC plugin that lets an infrastructure-as-code engine manage Zabbix
//! monitoring objects through the Zabbix JSON-RPC API.
//!
//! # Overview
//!
//! - **[`zabbix`]**: JSON-RPC client with login, typed objects and
//!   get/create/update/delete calls per object kind
//! - **[`provider`]**: resource and data source adapters mapping declarative
//!   attributes onto Zabbix objects, registered on [`ZabbixProvider`]
//! - **[`schema`]**, **[`validation`]**, **[`plan`]**: attribute schemas,
//!   config validation and change planning
//! - **[`server`]**: the `provider.v1` gRPC service and plugin handshake
//! - **[`testing`]**: a harness for driving a provider without gRPC
//!
//! # Resources
//!
//! `zabbix_application`, `zabbix_hostgroup`, `zabbix_template`, `zabbix_host`,
//! `zabbix_trigger` and the item variants `zabbix_item_trapper`,
//! `zabbix_item_http`, `zabbix_item_simple`, `zabbix_item_internal`,
//! `zabbix_item_snmp`, `zabbix_item_agent`, `zabbix_item_aggregate`,
//! `zabbix_item_dependent`.
//!
//! Data sources: `zabbix_host`, `zabbix_proxy`, `zabbix_hostgroup`,
//! `zabbix_template`, `zabbix_application`.
//!
//! # Handshake
//!
//! The host starts the plugin with the magic cookie variable set. Once the
//! listener is bound the plugin prints a single line to stdout:
//!
//! ```text
//! 1|1|tcp|127.0.0.1:50051|grpc
//! ```
//!
//! Format: `<core_version>|<app_version>|tcp|<address>|grpc`
//!
//! ```ignore
//! use zabbix_provider::{serve, ZabbixProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     zabbix_provider::try_init_logging();
//!     serve(ZabbixProvider::new()).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;
pub mod zabbix;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::ZabbixProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    APP_PROTOCOL_VERSION, CORE_PROTOCOL_VERSION, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE,
};
pub use validation::validate;

pub use async_trait::async_trait;

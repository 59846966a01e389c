//! Plugin server: the [`ProviderService`] trait and the gRPC runtime that
//! exposes it to a plugin host.
//!
//! # Startup
//!
//! [`serve`] checks the magic cookie the host puts in the environment,
//! binds a loopback port, starts the `provider.v1.Provider` gRPC service
//! and prints the handshake line to stdout. Everything else the process
//! writes goes to stderr.
//!
//! # Shutdown
//!
//! On SIGTERM or SIGINT (CTRL+C on Windows) the server stops accepting
//! connections, gives in-flight calls up to
//! [`ServeOptions::shutdown_timeout`] to finish, then calls
//! [`ProviderService::stop`].

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated;
use crate::schema::{Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{
    handshake_line, ImportedResource, PlanResult, ProviderMetadata, MAGIC_COOKIE_KEY,
    MAGIC_COOKIE_VALUE,
};

/// Operations a provider implements. The gRPC layer decodes requests into
/// JSON values, calls these methods and turns errors into diagnostics.
///
/// ```ignore
/// use zabbix_provider::{serve, ZabbixProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     serve(ZabbixProvider::new()).await
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Schemas of the provider block, resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Check the provider block without acting on it.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Apply the provider block. Diagnostics with errors leave the provider
    /// unconfigured.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Release anything held by the provider.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource block without acting on it.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Migrate state written by an older schema version. Returns the state
    /// unchanged by default.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Compute the planned state and changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a resource from its planned state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh a resource. `null` means the object no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update a resource in place.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Bring an existing remote object under management.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::Sdk(format!(
            "import is not supported for {resource_type}"
        )))
    }

    /// Check a data source block without acting on it.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Run a lookup. `null` means nothing matched.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let _ = config;
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

/// Decode a JSON payload. Empty or malformed payloads decode as `null`.
fn decode(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|err| {
        warn!(error = %err, "ignoring malformed JSON payload");
        Value::Null
    })
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<generated::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| generated::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => generated::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => generated::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

/// A failed call as a single error diagnostic carrying the error text.
fn error_diagnostics(err: &ProviderError) -> Vec<generated::Diagnostic> {
    diagnostics_to_proto(vec![Diagnostic::error(err.to_string())])
}

fn log_validation(operation: &str, diagnostics: &[Diagnostic]) {
    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    if errors > 0 {
        warn!(errors, warnings = diagnostics.len() - errors, "{operation} found problems");
    } else {
        debug!(warnings = diagnostics.len(), "{operation} passed");
    }
}

fn schema_to_proto(schema: &Schema) -> generated::Schema {
    generated::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> generated::Block {
    use generated::nested_block::NestingMode;

    generated::Block {
        attributes: block
            .attributes
            .iter()
            .map(|(name, attr)| generated::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                default_value: attr.default.as_ref().map(encode).unwrap_or_default(),
            })
            .collect(),
        block_types: block
            .blocks
            .iter()
            .map(|(name, nested)| generated::NestedBlock {
                type_name: name.clone(),
                block: Some(block_to_proto(&nested.block)),
                nesting_mode: match nested.nesting_mode {
                    BlockNestingMode::List => NestingMode::List as i32,
                    BlockNestingMode::Set => NestingMode::Set as i32,
                },
                min_items: nested.min_items as i32,
                max_items: nested.max_items as i32,
            })
            .collect(),
        description: block.description.clone().unwrap_or_default(),
    }
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

type GrpcResult<T> = Result<tonic::Response<T>, tonic::Status>;

#[tonic::async_trait]
impl<P: ProviderService> generated::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<generated::GetMetadataRequest>,
    ) -> GrpcResult<generated::GetMetadataResponse> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "metadata served"
        );
        Ok(tonic::Response::new(generated::GetMetadataResponse {
            server_capabilities: Some(generated::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<generated::GetSchemaRequest>,
    ) -> GrpcResult<generated::GetSchemaResponse> {
        let schema = self.provider.schema();
        debug!(
            resources = schema.resources.len(),
            data_sources = schema.data_sources.len(),
            "schema served"
        );
        Ok(tonic::Response::new(generated::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(name, s)| (name.clone(), schema_to_proto(s)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(name, s)| (name.clone(), schema_to_proto(s)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<generated::ValidateProviderConfigRequest>,
    ) -> GrpcResult<generated::ValidateProviderConfigResponse> {
        let config = decode(&request.into_inner().config);
        let diagnostics = match self.provider.validate_provider_config(config).await {
            Ok(diagnostics) => {
                log_validation("provider config validation", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(err) => {
                error!(error = %err, "provider config validation failed");
                error_diagnostics(&err)
            },
        };
        Ok(tonic::Response::new(
            generated::ValidateProviderConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<generated::ConfigureRequest>,
    ) -> GrpcResult<generated::ConfigureResponse> {
        let config = decode(&request.into_inner().config);
        let diagnostics = match self.provider.configure(config).await {
            Ok(diagnostics) => {
                if diagnostics.iter().any(Diagnostic::is_error) {
                    warn!(diagnostics = diagnostics.len(), "provider left unconfigured");
                } else {
                    info!("provider configured");
                }
                diagnostics_to_proto(diagnostics)
            },
            Err(err) => {
                error!(error = %err, "configure failed");
                error_diagnostics(&err)
            },
        };
        Ok(tonic::Response::new(generated::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<generated::StopRequest>,
    ) -> GrpcResult<generated::StopResponse> {
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("provider stopped");
                String::new()
            },
            Err(err) => {
                error!(error = %err, "stop failed");
                err.to_string()
            },
        };
        Ok(tonic::Response::new(generated::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(resource_type = %request.get_ref().resource_type))]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<generated::ValidateResourceConfigRequest>,
    ) -> GrpcResult<generated::ValidateResourceConfigResponse> {
        let req = request.into_inner();
        let diagnostics = match self
            .provider
            .validate_resource_config(&req.resource_type, decode(&req.config))
            .await
        {
            Ok(diagnostics) => {
                log_validation("resource config validation", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(err) => {
                error!(error = %err, "resource config validation failed");
                error_diagnostics(&err)
            },
        };
        Ok(tonic::Response::new(
            generated::ValidateResourceConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(resource_type = %request.get_ref().resource_type, version = request.get_ref().version))]
    async fn upgrade_resource_state(
        &self,
        request: tonic::Request<generated::UpgradeResourceStateRequest>,
    ) -> GrpcResult<generated::UpgradeResourceStateResponse> {
        let req = request.into_inner();
        let response = match self
            .provider
            .upgrade_resource_state(&req.resource_type, req.version, decode(&req.raw_state))
            .await
        {
            Ok(upgraded) => generated::UpgradeResourceStateResponse {
                upgraded_state: encode(&upgraded),
                diagnostics: vec![],
            },
            Err(err) => {
                error!(error = %err, "state upgrade failed");
                generated::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_diagnostics(&err),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type = %request.get_ref().resource_type))]
    async fn plan(
        &self,
        request: tonic::Request<generated::PlanRequest>,
    ) -> GrpcResult<generated::PlanResponse> {
        let req = request.into_inner();
        let prior_state = Some(decode(&req.prior_state)).filter(|v| !v.is_null());

        let response = match self
            .provider
            .plan(
                &req.resource_type,
                prior_state,
                decode(&req.proposed_state),
                decode(&req.config),
            )
            .await
        {
            Ok(result) => {
                debug!(
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "plan computed"
                );
                generated::PlanResponse {
                    planned_state: encode(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }
            },
            Err(err) => {
                error!(error = %err, "plan failed");
                generated::PlanResponse {
                    diagnostics: error_diagnostics(&err),
                    ..Default::default()
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type = %request.get_ref().resource_type))]
    async fn create(
        &self,
        request: tonic::Request<generated::CreateRequest>,
    ) -> GrpcResult<generated::CreateResponse> {
        let req = request.into_inner();
        let response = match self
            .provider
            .create(&req.resource_type, decode(&req.planned_state))
            .await
        {
            Ok(state) => {
                info!("resource created");
                generated::CreateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(err) => {
                error!(error = %err, "create failed");
                generated::CreateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&err),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type = %request.get_ref().resource_type))]
    async fn read(
        &self,
        request: tonic::Request<generated::ReadRequest>,
    ) -> GrpcResult<generated::ReadResponse> {
        let req = request.into_inner();
        let response = match self
            .provider
            .read(&req.resource_type, decode(&req.current_state))
            .await
        {
            Ok(state) => {
                debug!(exists = !state.is_null(), "resource read");
                generated::ReadResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(err) => {
                error!(error = %err, "read failed");
                generated::ReadResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&err),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type = %request.get_ref().resource_type))]
    async fn update(
        &self,
        request: tonic::Request<generated::UpdateRequest>,
    ) -> GrpcResult<generated::UpdateResponse> {
        let req = request.into_inner();
        let response = match self
            .provider
            .update(
                &req.resource_type,
                decode(&req.prior_state),
                decode(&req.planned_state),
            )
            .await
        {
            Ok(state) => {
                info!("resource updated");
                generated::UpdateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(err) => {
                error!(error = %err, "update failed");
                generated::UpdateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&err),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type = %request.get_ref().resource_type))]
    async fn delete(
        &self,
        request: tonic::Request<generated::DeleteRequest>,
    ) -> GrpcResult<generated::DeleteResponse> {
        let req = request.into_inner();
        let diagnostics = match self
            .provider
            .delete(&req.resource_type, decode(&req.current_state))
            .await
        {
            Ok(()) => {
                info!("resource deleted");
                vec![]
            },
            Err(err) => {
                error!(error = %err, "delete failed");
                error_diagnostics(&err)
            },
        };
        Ok(tonic::Response::new(generated::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(resource_type = %request.get_ref().resource_type, id = %request.get_ref().id))]
    async fn import_resource_state(
        &self,
        request: tonic::Request<generated::ImportResourceStateRequest>,
    ) -> GrpcResult<generated::ImportResourceStateResponse> {
        let req = request.into_inner();
        let response = match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => {
                info!(imported = imported.len(), "resource imported");
                generated::ImportResourceStateResponse {
                    imported: imported
                        .into_iter()
                        .map(|r| generated::ImportedResource {
                            state: encode(&r.state),
                            resource_type: r.resource_type,
                        })
                        .collect(),
                    diagnostics: vec![],
                }
            },
            Err(err) => {
                error!(error = %err, "import failed");
                generated::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_diagnostics(&err),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config", fields(data_source_type = %request.get_ref().data_source_type))]
    async fn validate_data_source_config(
        &self,
        request: tonic::Request<generated::ValidateDataSourceConfigRequest>,
    ) -> GrpcResult<generated::ValidateDataSourceConfigResponse> {
        let req = request.into_inner();
        let diagnostics = match self
            .provider
            .validate_data_source_config(&req.data_source_type, decode(&req.config))
            .await
        {
            Ok(diagnostics) => {
                log_validation("data source config validation", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(err) => {
                error!(error = %err, "data source config validation failed");
                error_diagnostics(&err)
            },
        };
        Ok(tonic::Response::new(
            generated::ValidateDataSourceConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip_all, name = "grpc.read_data_source", fields(data_source_type = %request.get_ref().data_source_type))]
    async fn read_data_source(
        &self,
        request: tonic::Request<generated::ReadDataSourceRequest>,
    ) -> GrpcResult<generated::ReadDataSourceResponse> {
        let req = request.into_inner();
        let response = match self
            .provider
            .read_data_source(&req.data_source_type, decode(&req.config))
            .await
        {
            Ok(state) => {
                debug!(found = !state.is_null(), "data source read");
                generated::ReadDataSourceResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(err) => {
                error!(error = %err, "data source read failed");
                generated::ReadDataSourceResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&err),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }
}

/// Options for [`serve_with_options`].
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight calls may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
    /// Refuse to start unless the host's magic cookie is present.
    /// Default: true.
    pub magic_cookie: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            magic_cookie: true,
        }
    }
}

impl ServeOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start without a plugin host, e.g. to attach a debugger.
    pub fn without_magic_cookie(mut self) -> Self {
        self.magic_cookie = false;
        self
    }
}

/// Verify the process was started by a plugin host.
fn check_magic_cookie() -> Result<(), ProviderError> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(value) if value == MAGIC_COOKIE_VALUE => Ok(()),
        _ => {
            eprintln!(
                "This binary is a plugin. These are not meant to be executed directly.\n\
                 Please execute the program that consumes these plugins, which will\n\
                 load any plugins automatically."
            );
            Err(ProviderError::Configuration(format!(
                "{MAGIC_COOKIE_KEY} is missing or does not match"
            )))
        },
    }
}

/// Resolve when the process is asked to terminate.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(err), _) | (_, Err(err)) => {
                    error!(error = %err, "cannot install signal handlers");
                    return std::future::pending().await;
                },
            };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(windows)]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "cannot install CTRL+C handler");
            return std::future::pending().await;
        }
        info!("received CTRL+C, shutting down");
    }

    #[cfg(not(any(unix, windows)))]
    std::future::pending::<()>().await;
}

/// Serve a provider to a plugin host on a free loopback port.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Like [`serve`], with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, SocketAddr::from(([127, 0, 0, 1], 0)), options).await
}

/// Serve a provider on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Serve a provider on a specific address with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if options.magic_cookie {
        check_magic_cookie()?;
    }

    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", handshake_line(addr))?;
        stdout.flush()?;
    }
    info!(address = %addr, "provider server listening");

    let provider = Arc::new(provider);
    let service = generated::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(
                tokio_stream::wrappers::TcpListenerStream::new(listener),
                async move {
                    let _ = shutdown_rx.await;
                },
            ),
    );

    let outcome = tokio::select! {
        finished = &mut server => finished,
        _ = wait_for_shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(finished) => finished,
                Err(_) => {
                    warn!(timeout = ?options.shutdown_timeout, "in-flight calls did not finish, aborting");
                    server.abort();
                    Ok(Ok(()))
                },
            }
        },
    };

    let result = match outcome {
        Ok(Ok(())) => {
            info!("server stopped");
            Ok(())
        },
        Ok(Err(err)) => {
            error!(error = %err, "server failed");
            Err(ProviderError::from(err).into())
        },
        Err(err) => {
            error!(error = %err, "server task failed");
            Err(err.into())
        },
    };

    if let Err(err) = provider.stop().await {
        warn!(error = %err, "provider stop failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::provider_server::Provider;
    use crate::provider::ZabbixProvider;
    use crate::schema::{Attribute, NestedBlock};
    use serde_json::json;
    use serial_test::serial;

    fn service() -> ProviderGrpcService<ZabbixProvider> {
        ProviderGrpcService {
            provider: Arc::new(ZabbixProvider::new()),
        }
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(b""), Value::Null);
        assert_eq!(decode(b"{not json"), Value::Null);
        assert_eq!(decode(br#"{"name":"CPU"}"#), json!({"name": "CPU"}));
    }

    #[test]
    fn test_block_to_proto() {
        let block = Block::new()
            .with_attribute(
                "password",
                Attribute::optional_string().sensitive().with_default(json!("")),
            )
            .with_block(
                "interface",
                NestedBlock::list(Block::new().with_attribute("ip", Attribute::optional_string()))
                    .with_min_items(1),
            )
            .with_block("macro", NestedBlock::set(Block::new()));

        let proto = block_to_proto(&block);

        assert_eq!(proto.attributes.len(), 1);
        let password = &proto.attributes[0];
        assert!(password.sensitive && password.optional && !password.required);
        assert_eq!(password.default_value, b"\"\"".to_vec());
        assert_eq!(password.r#type, b"\"string\"".to_vec());

        assert_eq!(proto.block_types.len(), 2);
        assert_eq!(proto.block_types[0].type_name, "interface");
        assert_eq!(
            proto.block_types[0].nesting_mode,
            generated::nested_block::NestingMode::List as i32
        );
        assert_eq!(proto.block_types[0].min_items, 1);
        assert_eq!(
            proto.block_types[1].nesting_mode,
            generated::nested_block::NestingMode::Set as i32
        );
    }

    #[test]
    fn test_error_diagnostics() {
        let diagnostics = error_diagnostics(&ProviderError::MultipleFound("applications"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "multiple applications found");
        assert_eq!(
            diagnostics[0].severity,
            generated::diagnostic::Severity::Error as i32
        );
    }

    #[tokio::test]
    async fn test_get_schema_lists_every_type() {
        let response = service()
            .get_schema(tonic::Request::new(generated::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.resources.len(), 13);
        assert_eq!(response.data_sources.len(), 5);
        let provider = response.provider.unwrap().block.unwrap();
        let password = provider
            .attributes
            .iter()
            .find(|a| a.name == "password")
            .unwrap();
        assert!(password.sensitive);
    }

    #[tokio::test]
    async fn test_errors_become_diagnostics() {
        let response = service()
            .read(tonic::Request::new(generated::ReadRequest {
                resource_type: "zabbix_host".to_string(),
                current_state: br#"{"id":"10084"}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.state.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "provider is not configured");
    }

    #[tokio::test]
    async fn test_plan_create() {
        let response = service()
            .plan(tonic::Request::new(generated::PlanRequest {
                resource_type: "zabbix_hostgroup".to_string(),
                prior_state: vec![],
                proposed_state: br#"{"name":"Web"}"#.to_vec(),
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.diagnostics.is_empty());
        assert!(!response.requires_replace);
        assert_eq!(response.changes.len(), 1);
        assert_eq!(response.changes[0].path, "name");
        assert_eq!(decode(&response.planned_state), json!({"id": null, "name": "Web"}));
    }

    #[test]
    fn test_serve_options() {
        let options = ServeOptions::new();
        assert_eq!(options.shutdown_timeout, Duration::from_secs(30));
        assert!(options.magic_cookie);

        let options = options
            .with_shutdown_timeout(Duration::from_secs(5))
            .without_magic_cookie();
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
        assert!(!options.magic_cookie);
    }

    #[test]
    #[serial]
    fn test_magic_cookie() {
        std::env::remove_var(MAGIC_COOKIE_KEY);
        assert!(check_magic_cookie().is_err());

        std::env::set_var(MAGIC_COOKIE_KEY, "wrong");
        assert!(check_magic_cookie().is_err());

        std::env::set_var(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE);
        assert!(check_magic_cookie().is_ok());
        std::env::remove_var(MAGIC_COOKIE_KEY);
    }

    #[tokio::test]
    #[serial]
    async fn test_serve_refuses_without_cookie() {
        std::env::remove_var(MAGIC_COOKIE_KEY);
        let err = serve(ZabbixProvider::new()).await.unwrap_err();
        assert!(err.to_string().contains(MAGIC_COOKIE_KEY));
    }
}

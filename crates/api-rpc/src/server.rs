//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over TCP. Binds to localhost unless configured otherwise.

use crate::handler::RpcHandler;
use crate::types::{
    DeadListRequest, DeadPurgeRequest, DeadRetryRequest, GetJobRequest, SubmitRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tasklane_core::error::{AppError, Result};
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Bind and start serving. Returns the bound address and the handle used
    /// to stop the server.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind RPC server on {}: {}", addr, e)))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(format!("Failed to read RPC server address: {}", e)))?;

        let module = build_module(self.handler)?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}

/// Register every method against `handler`
pub fn build_module(handler: Arc<RpcHandler>) -> Result<RpcModule<()>> {
    let mut module = RpcModule::new(());

    let h = handler.clone();
    module
        .register_async_method("jobs.submit.v1", move |params, _, _| {
            let handler = h.clone();
            async move {
                let req: SubmitRequest = params.parse()?;
                handler.submit(req).await
            }
        })
        .map_err(register_error)?;

    let h = handler.clone();
    module
        .register_async_method("jobs.get.v1", move |params, _, _| {
            let handler = h.clone();
            async move {
                let req: GetJobRequest = params.parse()?;
                handler.get_job(req).await
            }
        })
        .map_err(register_error)?;

    // Admin APIs
    let h = handler.clone();
    module
        .register_async_method("admin.stats.v1", move |_, _, _| {
            let handler = h.clone();
            async move { handler.stats().await }
        })
        .map_err(register_error)?;

    let h = handler.clone();
    module
        .register_async_method("admin.dead.list.v1", move |params, _, _| {
            let handler = h.clone();
            async move {
                let req: Option<DeadListRequest> = params.parse()?;
                handler.dead_list(req.unwrap_or_default()).await
            }
        })
        .map_err(register_error)?;

    let h = handler.clone();
    module
        .register_async_method("admin.dead.retry.v1", move |params, _, _| {
            let handler = h.clone();
            async move {
                let req: DeadRetryRequest = params.parse()?;
                handler.dead_retry(req).await
            }
        })
        .map_err(register_error)?;

    let h = handler;
    module
        .register_async_method("admin.dead.purge.v1", move |params, _, _| {
            let handler = h.clone();
            async move {
                let req: Option<DeadPurgeRequest> = params.parse()?;
                handler.dead_purge(req.unwrap_or_default()).await
            }
        })
        .map_err(register_error)?;

    Ok(module)
}

fn register_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to register RPC method: {}", e))
}

//! Command line and startup wiring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use plan_hub_core::directory::MemoryDirectory;
use plan_hub_core::{NodeService, ServiceConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "plan-hub")]
#[command(about = "Document lifecycle server for planning models")]
pub struct Cli {
    /// Listen address
    #[arg(long, env = "PLAN_HUB_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: String,

    /// JSON service configuration
    #[arg(long, env = "PLAN_HUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON seed of users and groups; any user id is accepted without one
    #[arg(long, env = "PLAN_HUB_PRINCIPALS")]
    pub principals: Option<PathBuf>,
}

impl Cli {
    pub fn service_config(&self) -> Result<ServiceConfig> {
        match &self.config {
            Some(path) => ServiceConfig::load(path),
            None => Ok(ServiceConfig::default()),
        }
    }

    pub fn directory(&self) -> Result<MemoryDirectory> {
        match &self.principals {
            Some(path) => MemoryDirectory::from_file(path),
            None => Ok(MemoryDirectory::open()),
        }
    }

    /// Build the service and make sure the root exists.
    pub async fn build_service(&self) -> Result<NodeService> {
        let config = self.service_config()?;
        let directory = self.directory()?;
        let service = NodeService::in_memory(Arc::new(directory), config);
        let root = service.init().await?;
        info!(root = %root.id, owner = %root.owner_id, "node tree ready");
        Ok(service)
    }
}

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use tse_core::MarketControlPlane;
use tse_core::fetcher::ReqwestTransport;

use crate::config::DaemonConfig;

pub fn build_control(config: &DaemonConfig) -> Arc<MarketControlPlane> {
    let transport = Arc::new(ReqwestTransport::new());
    Arc::new(MarketControlPlane::from_transport(
        transport,
        config.pipeline.clone(),
    ))
}

/// Loads the first catalog and starts the periodic refresher.
///
/// A failed first load is logged, not fatal: the server starts with an empty
/// catalog, remote search still works, and the refresher keeps retrying.
pub async fn warm_catalog(control: &MarketControlPlane) -> Option<JoinHandle<()>> {
    match control.catalog().refresh().await {
        Ok(instruments) => info!(instruments, "instrument catalog loaded"),
        Err(err) => warn!(error = %err, "initial catalog load failed"),
    }

    control.spawn_catalog_refresher()
}

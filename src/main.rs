//! `syncfuse` binary entrypoint.
//!
//! Bootstraps the configuration directory, the two TLS identities, the live
//! configuration handle, and the control-plane HTTP service, then runs the
//! supervisor until interrupted.

use std::sync::Arc;

use clap::Parser as _;
use eyre::{Result, WrapErr as _};
use syncfuse::api::assets::AssetServer;
use syncfuse::api::{ApiService, AppState, router};
use syncfuse::cli::Cli;
use syncfuse::config::{ConfigHandle, loader};
use syncfuse::deviceid::DeviceId;
use syncfuse::locations::Locations;
use syncfuse::model::SharedModel;
use syncfuse::supervisor::Supervisor;
use syncfuse::tls;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .unwrap();

    let locations = Locations::resolve(invocation.home);
    locations.ensure_home()?;
    info!(home = %locations.home.display(), "using configuration directory");

    // The peer identity exists from first start; its certificate digest is
    // this instance's device ID.
    let peer_identity =
        tls::load_or_generate(&locations.cert_file, &locations.key_file).await?;
    let my_id = DeviceId::from_cert_der(peer_identity.leaf().as_ref());
    info!(device_id = %my_id, "local device ID");

    let mut initial = loader::load_or_default(&locations.config_file)
        .await
        .wrap_err("failed to load configuration")?;
    initial.my_id = my_id.to_string();
    let gui = initial.gui.clone();
    let config = Arc::new(ConfigHandle::new(locations.config_file.clone(), initial));

    let model = Arc::new(SharedModel::new());

    let mut supervisor = Supervisor::new();
    if gui.enabled {
        let https_identity =
            tls::load_or_generate(&locations.https_cert_file, &locations.https_key_file).await?;
        let tls_config = tls::server_config(https_identity)?;

        let state = AppState {
            config: Arc::clone(&config),
            model,
            assets: Arc::new(AssetServer::new(invocation.gui_assets)),
        };
        let api = ApiService::bind(&gui.address, tls_config, router(state)).await?;
        supervisor.register(Arc::new(api));
    } else {
        warn!("web UI disabled by configuration");
    }

    supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for interrupt");
            }
            info!("interrupt received");
        })
        .await;

    Ok(())
}

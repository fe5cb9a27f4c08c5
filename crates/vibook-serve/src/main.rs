mod app;
mod assets;
mod error;
mod handlers;
mod page;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;

use argh::FromArgs;
use vibook_vqa::{
    config::{DeviceKind, HostConfig, ModelSource, Precision},
    host::ModelHost,
};

use crate::app::AppState;
use crate::page::PageRenderer;

#[derive(FromArgs)]
/// Serve visual question answering over book covers
struct Args {
    /// the model repository id on the Hugging Face Hub, or a local directory
    #[argh(option, default = "HostConfig::DEFAULT_MODEL_ID.to_string()")]
    model: String,

    /// the hub revision of the model
    #[argh(option, default = "String::from(\"main\")")]
    revision: String,

    /// the weights precision: f32, f16 or bf16
    #[argh(option, default = "Precision::F32")]
    dtype: Precision,

    /// the device to run on: cpu or cuda
    #[argh(option, default = "DeviceKind::Cpu")]
    device: DeviceKind,

    /// the address to bind
    #[argh(option, default = "IpAddr::V4(Ipv4Addr::UNSPECIFIED)")]
    host: IpAddr,

    /// the port to listen on
    #[argh(option, default = "8000")]
    port: u16,

    /// the directory served under /static
    #[argh(option, default = "PathBuf::from(\"static\")")]
    static_dir: PathBuf,

    /// the directory served under /assets
    #[argh(option, default = "PathBuf::from(\"assets\")")]
    assets_dir: PathBuf,

    /// the directory searched for an index.html overriding the built-in page
    #[argh(option, default = "PathBuf::from(\"templates\")")]
    templates_dir: PathBuf,

    /// the maximum upload size in megabytes
    #[argh(option, default = "20")]
    max_upload_mb: usize,

    /// do not download the example images
    #[argh(switch)]
    skip_prefetch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    log::info!("🚀 Running startup tasks...");
    std::fs::create_dir_all(&args.static_dir)?;
    std::fs::create_dir_all(&args.assets_dir)?;

    if !args.skip_prefetch {
        let client = assets::http_client()?;
        let assets_dir = args.assets_dir.clone();
        tokio::spawn(async move {
            let report = assets::prefetch_assets(&client, &assets_dir, assets::EXAMPLE_ASSETS).await;
            log::info!(
                "Example images: {} downloaded, {} already present, {} failed",
                report.downloaded,
                report.skipped,
                report.failed
            );
        });
    }

    let config = HostConfig {
        source: ModelSource::resolve(&args.model, &args.revision),
        device: args.device,
        precision: args.dtype,
    };
    let host = tokio::task::spawn_blocking(move || ModelHost::load(&config)).await?;
    if !host.is_ready() {
        log::warn!("⚠️ Serving without a model, /vqa will answer 503");
    }

    let state = AppState {
        host: Arc::new(host),
        pages: Arc::new(PageRenderer::new(Some(&args.templates_dir))?),
    };
    let app = app::router(
        state,
        &args.static_dir,
        &args.assets_dir,
        app::upload_limit_bytes(args.max_upload_mb),
    );

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    log::info!("🔥 Listening on: http://{addr}");
    log::info!("🌐 On your network: http://{}:{}", local_ip(), args.port);
    log::info!("🔧 Press Ctrl+C to stop the server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("👋 Server is shutting down");

    Ok(())
}

/// The address of the interface used for outbound traffic, or loopback when there is none.
fn local_ip() -> IpAddr {
    let outbound = || -> std::io::Result<IpAddr> {
        // connecting a udp socket sends nothing
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    };
    outbound().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use http::Request;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use wire_http_tunnel::adapters::MemoryTransport;
use wire_http_tunnel::{Body, TunnelClient, TunnelConfig, TunnelServer};

#[derive(Parser, Debug)]
#[clap(version = env!("TUNNEL_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    /// URL to fetch through the tunnel
    #[clap(long, short = 'u')]
    url: String,

    /// Write the response body here instead of <tmpdir>/download
    #[clap(long, short = 'o')]
    output: Option<PathBuf>,

    /// Configuration file, instead of the platform default location
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Stream name the tunnel is mounted on
    #[clap(long)]
    stream_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    let config = match &opts.config {
        Some(path) => TunnelConfig::load_path(path)?,
        None => TunnelConfig::load()?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .init();

    let url = Url::parse(&opts.url)?;
    let stream_name = opts.stream_name.unwrap_or_else(|| config.stream_name.clone());

    // Both halves run in-process: the server side stands in for the remote peer.
    let transport = MemoryTransport::new();
    let server = TunnelServer::builder()
        .http_client(Arc::new(config.http_client()?))
        .build()?;
    transport.register_stream(&stream_name, Arc::new(server)).await;
    let session_id = transport.open_session().await;
    info!(session = %session_id, "tunnel ready on stream {}", stream_name);

    let client = TunnelClient::new(Arc::new(transport.clone()), stream_name);
    let request = Request::get(url.as_str()).body(Body::empty())?;
    let response = client.execute(session_id.into(), request).await?;
    info!(status = %response.status(), "GET {}", url);

    let output = opts.output.unwrap_or_else(|| std::env::temp_dir().join("download"));
    let mut file = tokio::fs::File::create(&output).await?;
    let mut body = response.into_body();
    let written = tokio::io::copy(&mut body, &mut file).await?;
    file.flush().await?;
    body.close()?;
    info!("wrote {} bytes to {}", written, output.display());

    transport.close_session(session_id).await;
    Ok(())
}

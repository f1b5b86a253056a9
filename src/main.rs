use dotenvy::dotenv;
use openbio_infer::api::{self, ProxySettings};
use openbio_infer::config::ProxyConfig;
use openbio_infer::upstream::HttpUpstream;
use openbio_infer::{telemetry, template};
use std::net::SocketAddr;


#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cfg = <ProxyConfig as clap::Parser>::parse();

    // logs
    telemetry::init_logging();
    if let Some(addr) = &cfg.metrics_addr {
        telemetry::install_prometheus(addr.parse()?)?;
    }

    template::warn_if_malformed(&cfg.template_path);

    let upstream = HttpUpstream::new(cfg.base_url.clone(), cfg.api_key.clone());
    tracing::info!(upstream = %upstream.endpoint(), model = %cfg.model_id, "proxying vLLM");

    let app = api::routes(upstream, ProxySettings::from(&cfg));
    let addr: SocketAddr = cfg.bind_addr.parse()?;

    tracing::info!(%addr, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use tokio::{net::TcpListener, signal, sync::watch};

use super::KeySourceArgs;
use crate::server;

#[derive(Parser, Debug, Clone)]
pub struct ServeCommand {
    /// HTTP server port
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Allowed CORS origins, comma separated; `*` allows any
    #[arg(long = "cors-origin", default_value = "*", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[command(flatten)]
    pub keys: KeySourceArgs,
}

impl Default for ServeCommand {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            cors_origins: vec!["*".to_string()],
            keys: KeySourceArgs::default(),
        }
    }
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tenants = Arc::new(self.keys.load()?);
        tracing::info!(
            tenants = tenants.len(),
            content_keys = ?self.keys.content_key_source(),
            "key material loaded"
        );

        let addr = SocketAddr::new(self.bind, self.port);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("listening on http://{}", listener.local_addr()?);

        let cors = server::cors_layer(&self.cors_origins);
        let mut server_handle =
            tokio::spawn(server::run_server(listener, tenants, cors, shutdown_rx));

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("shutting down");
                let _ = shutdown_tx.send(true);
                server_handle
                    .await?
                    .map_err(|e| anyhow!("server error: {e}"))?;
            }
            result = &mut server_handle => {
                result?.map_err(|e| anyhow!("server error: {e}"))?;
            }
        }

        Ok(())
    }
}

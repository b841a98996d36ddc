//! Database commands

use std::sync::Arc;

use anyhow::{Context, Result};
use berth_tunnel::{
    listen_for_signals, CompanionCommand, SlugResolver, StaticSlug, StaticToken, TunnelConfig,
    TunnelSupervisor, WsDialer, DEFAULT_BIND_HOST, DEFAULT_BIND_PORT,
};
use clap::{Args, Subcommand};
use tracing::info;

#[derive(Subcommand)]
pub enum DbCommand {
    /// Open a local tunnel to an app's database
    ///
    /// Binds a local port and relays every connection through the platform
    /// to the app's database, so any database client can connect as if the
    /// database were local. Examples:
    ///
    ///   berth db tunnel --app my-app
    ///   berth db tunnel --app my-app --port 5433
    ///   berth db tunnel --app my-app -- psql --host={host} --port={port}
    #[command(verbatim_doc_comment)]
    Tunnel(TunnelArgs),
}

#[derive(Args)]
pub struct TunnelArgs {
    /// Application slug
    #[arg(long)]
    app: String,

    /// Platform API host
    #[arg(long, default_value = "api.berth.dev")]
    api_host: String,

    /// Local host to bind
    #[arg(long, default_value = DEFAULT_BIND_HOST)]
    host: String,

    /// Local port to bind
    #[arg(long, default_value_t = DEFAULT_BIND_PORT)]
    port: u16,

    /// API token
    #[arg(long, env = "BERTH_TOKEN", hide_env_values = true)]
    token: String,

    /// Client to run against the tunnel; `{host}`, `{port}` and `{addr}`
    /// in its arguments are replaced with the local endpoint, and the
    /// tunnel closes when it exits
    #[arg(last = true)]
    exec: Vec<String>,
}

pub async fn handle(command: DbCommand) -> Result<()> {
    match command {
        DbCommand::Tunnel(args) => tunnel(args).await,
    }
}

async fn tunnel(args: TunnelArgs) -> Result<()> {
    let app = StaticSlug(args.app)
        .resolve()
        .context("cannot determine target app")?;
    let config = TunnelConfig::new(args.api_host, app)
        .with_bind_host(args.host)
        .with_bind_port(args.port);

    let url = config.tunnel_url();
    info!(app = %config.app, url = %url, "starting database tunnel");
    let dialer = WsDialer::new(url, Arc::new(StaticToken(args.token)));

    let mut supervisor = TunnelSupervisor::new(config, Arc::new(dialer));
    if let Some((program, rest)) = args.exec.split_first() {
        let mut command = CompanionCommand::new(program);
        for arg in rest {
            command = command.arg(arg);
        }
        supervisor = supervisor.with_companion(command);
    }

    let bound = supervisor.bind().await.context("failed to start tunnel")?;
    tokio::spawn(listen_for_signals(bound.shutdown_signal()));

    println!("Database tunnel ready on {}", bound.local_addr());
    println!("Press Ctrl-C to stop");

    bound.run().await;
    info!("tunnel closed");
    Ok(())
}

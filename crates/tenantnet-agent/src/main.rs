//! TenantNet Agent - Main Entry Point
//!
//! # Usage
//!
//! ```bash
//! tenantnet plugins
//! tenantnet setup --pod web-0 --sandbox c0ffee --port-id 4f5d2c1a-... \
//!     --mac fa:16:3e:4b:7c:01 --ip 10.244.1.5/16
//! tenantnet teardown --pod web-0 --sandbox c0ffee --port-id 4f5d2c1a-...
//! tenantnet bindings --namespace team-a
//! tenantnet plan team-a team-b kube-system
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use tenantnet_common::{TenantNetConfig, DEFAULT_CONFIG_PATH};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "tenantnet")]
#[command(version)]
#[command(about = "TenantNet tenant reconciliation and interface wiring", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "TENANTNET_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wire a sandbox into the switch fabric.
    ///
    /// Concurrent invocations for the same port id must be serialized by the caller.
    Setup {
        #[arg(long)]
        pod: String,
        #[arg(long)]
        sandbox: String,
        #[arg(long)]
        port_id: String,
        #[arg(long)]
        mac: String,
        /// Address with prefix length, e.g. 10.244.1.5/16
        #[arg(long)]
        ip: IpNetwork,
        /// Defaults to the configured gateway
        #[arg(long)]
        gateway: Option<IpAddr>,
        #[arg(long, default_value = "eth0")]
        if_name: String,
    },
    /// Remove everything wired for a port.
    ///
    /// Concurrent invocations for the same port id must be serialized by the caller.
    Teardown {
        #[arg(long)]
        pod: String,
        #[arg(long)]
        sandbox: String,
        #[arg(long)]
        port_id: String,
    },
    /// List registered network plugins
    Plugins,
    /// Print the access bindings generated for a namespace
    Bindings {
        #[arg(long, short)]
        namespace: String,
    },
    /// Reconcile namespaces against an empty in-memory store and print the result
    Plan {
        #[arg(required = true)]
        namespaces: Vec<String>,
    },
}

fn load_config(path: &str) -> anyhow::Result<TenantNetConfig> {
    let mut config = TenantNetConfig::load_or_default(path)
        .with_context(|| format!("loading config from {}", path))?;
    config.apply_env().context("applying environment overrides")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    tracing::debug!("TenantNet agent v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Setup {
            pod,
            sandbox,
            port_id,
            mac,
            ip,
            gateway,
            if_name,
        } => {
            let gateway = match gateway {
                Some(gw) => gw,
                None => config.gateway()?,
            };
            let req = tenantnet_plugins::AttachRequest {
                pod_name: pod,
                sandbox_id: sandbox,
                port: tenantnet_plugins::Port {
                    id: port_id,
                    mac_address: mac,
                },
                ip_cidr: ip,
                gateway,
                if_name,
            };
            let interfaces = commands::setup(&config, &req).await?;
            println!("{}", serde_json::to_string_pretty(&interfaces)?);
        }
        Commands::Teardown {
            pod,
            sandbox,
            port_id,
        } => {
            let port = tenantnet_plugins::Port {
                id: port_id,
                mac_address: String::new(),
            };
            commands::teardown(&config, &pod, &sandbox, &port).await?;
        }
        Commands::Plugins => {
            for name in commands::plugins()? {
                let marker = if name == config.plugin { " (configured)" } else { "" };
                println!("{}{}", name, marker);
            }
        }
        Commands::Bindings { namespace } => {
            let bindings = tenantnet_controller::bindings_for_namespace(&namespace);
            println!("{}", serde_json::to_string_pretty(&bindings)?);
        }
        Commands::Plan { namespaces } => {
            let plan = commands::plan(&config, &namespaces).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}

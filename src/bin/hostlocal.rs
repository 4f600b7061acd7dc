//! hostlocal Binary
//!
//! Allocates, releases and lists addresses for one network from the command line.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use hostlocal::config::IpamConfigBuilder;
use hostlocal::plugin::{cmd_add, cmd_del};
use hostlocal::store::{DiskStore, Store};
use hostlocal::{IpamConfig, Result, Route, StoreConfig, Subnet, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// hostlocal IPAM
#[derive(Parser, Debug)]
#[command(name = "hostlocal")]
#[command(about = "Sequential host-local IP address management")]
#[command(version)]
struct Args {
    /// Data directory (one subdirectory per network)
    #[arg(short, long, default_value = "/var/lib/cni/networks")]
    data_dir: PathBuf,

    /// fsync the journal once per request instead of once per change
    #[arg(long)]
    sync_on_unlock: bool,

    /// Journal entries kept before compacting into a snapshot
    #[arg(long, default_value = "256")]
    compact_threshold: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Allocate an address for a container
    Allocate {
        #[command(flatten)]
        network: NetworkArgs,

        /// Container (owner) ID
        #[arg(long)]
        container_id: String,

        /// First allocatable address (inclusive)
        #[arg(long)]
        range_start: Option<IpAddr>,

        /// Last allocatable address (inclusive)
        #[arg(long)]
        range_end: Option<IpAddr>,

        /// Gateway (defaults to the first address after the network address)
        #[arg(long)]
        gateway: Option<IpAddr>,

        /// Allocate exactly this address
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Route to pass through, as `dst` or `dst,gw` (repeatable)
        #[arg(long = "route")]
        routes: Vec<Route>,
    },

    /// Release every address a container holds
    Release {
        #[command(flatten)]
        network: NetworkArgs,

        /// Container (owner) ID
        #[arg(long)]
        container_id: String,
    },

    /// List current reservations
    List {
        /// Network name
        #[arg(short, long)]
        name: String,
    },
}

#[derive(ClapArgs, Debug)]
struct NetworkArgs {
    /// Network name
    #[arg(short, long)]
    name: String,

    /// Subnet in CIDR notation
    #[arg(short, long)]
    subnet: Subnet,
}

impl NetworkArgs {
    fn builder(self) -> IpamConfigBuilder {
        IpamConfig::builder().name(self.name).subnet(self.subnet)
    }
}

fn main() -> ExitCode {
    // Initialize tracing/logging (stderr, so stdout carries only results)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hostlocal=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let sync_strategy = if args.sync_on_unlock {
        SyncStrategy::OnUnlock
    } else {
        SyncStrategy::EveryWrite
    };
    let store_config = StoreConfig::builder()
        .data_dir(&args.data_dir)
        .sync_strategy(sync_strategy)
        .compact_threshold(args.compact_threshold)
        .build();

    tracing::debug!("hostlocal v{}", hostlocal::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir.display());

    match run(store_config, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(store_config: StoreConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Allocate {
            network,
            container_id,
            range_start,
            range_end,
            gateway,
            ip,
            routes,
        } => {
            let mut builder = network.builder();
            if let Some(addr) = range_start {
                builder = builder.range_start(addr);
            }
            if let Some(addr) = range_end {
                builder = builder.range_end(addr);
            }
            if let Some(addr) = gateway {
                builder = builder.gateway(addr);
            }
            if let Some(addr) = ip {
                builder = builder.requested_ip(addr);
            }
            for route in routes {
                builder = builder.route(route);
            }

            let ip_config = cmd_add(store_config, builder.build()?, &container_id)?;
            println!("{}", ip_config);
        }
        Commands::Release {
            network,
            container_id,
        } => {
            cmd_del(store_config, network.builder().build()?, &container_id)?;
        }
        Commands::List { name } => {
            let mut store = DiskStore::open(store_config, &name)?;
            store.lock()?;
            let reservations = store.reservations();
            store.close()?;
            for (addr, owner) in reservations? {
                println!("{}\t{}", addr, owner);
            }
        }
    }
    Ok(())
}

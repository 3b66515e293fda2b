//! switchd orchestration daemon entry point.
//!
//! Wires the orchestrators to their feeds, the hardware layer, and the
//! shared registries, then runs the dispatch loop. Without a hardware SDK
//! attached this runs against the in-memory [`SoftSwitch`], which is useful
//! for development and demos; the production build swaps the HAL handle.

use clap::Parser;
use log::{info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use switchd_hal::{PortOid, SoftSwitch, VirtualRouterOid};
use switchd_orch_common::{LogRecorder, MemoryFeed, RecordSink};
use switchd_orchd::context::SwitchContext;
use switchd_orchd::crm::{self, CrmMonitorOrch};
use switchd_orchd::daemon::{OrchDaemon, OrchDaemonConfig};
use switchd_orchd::flex_counter::{MemoryCounterStore, RifCounterRegistrar};
use switchd_orchd::intfs::{IntfsOrch, IntfsOrchConfig};
use switchd_orchd::neigh::{NeighOrch, NeighOrchConfig};
use switchd_orchd::ports::{PortBinding, PortInfo, PortsView};
use switchd_types::MacAddress;

/// switchd orchestration agent
#[derive(Parser, Debug)]
#[command(name = "orchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Switch source MAC address
    #[arg(short = 'm', long, default_value = "02:42:00:00:00:01")]
    mac_address: String,

    /// Pause between dispatch cycles in milliseconds
    #[arg(long, default_value = "100")]
    heartbeat_interval: u64,

    /// Housekeeping timer period in milliseconds
    #[arg(long, default_value = "1000")]
    timer_interval: u64,

    /// Number of front-panel ports to seed in simulation mode
    #[arg(long, default_value = "32")]
    port_count: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Forward every ingested table record to the log
    #[arg(short = 'r', long)]
    record: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let src_mac: MacAddress = match args.mac_address.parse() {
        Ok(mac) => mac,
        Err(e) => {
            eprintln!("invalid --mac-address: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting switchd orchestration daemon");
    info!("Heartbeat {}ms, timer {}ms", args.heartbeat_interval, args.timer_interval);

    // Hardware and shared services
    let hal = Arc::new(SoftSwitch::new());
    let crm = crm::new_shared();
    let counter_store = Arc::new(MemoryCounterStore::new());
    let registrar = Arc::new(RifCounterRegistrar::new(counter_store));
    let context = Arc::new(SwitchContext::new());
    let default_vrf = VirtualRouterOid::from_raw_unchecked(0x3000000000000001);

    // Port layer stand-in: seed front-panel ports, all up
    let ports = PortsView::new();
    for index in 0..args.port_count {
        let alias = format!("Ethernet{}", index * 4);
        ports.insert(PortInfo {
            alias: alias.clone(),
            binding: PortBinding::Phy(PortOid::from_raw_unchecked(0x1000 + u64::from(index))),
            mtu: 9100,
            admin_up: true,
            oper_up: true,
        });
    }
    ports.set_all_ports_ready(true);
    info!("Seeded {} simulated ports", args.port_count);

    // Table feeds; in production these are the subscription channels of
    // the shared configuration store
    let intf_feed = MemoryFeed::new("INTF_TABLE");
    let neigh_feed = MemoryFeed::new("NEIGH_TABLE");

    let mut daemon = OrchDaemon::new(OrchDaemonConfig {
        heartbeat_interval_ms: args.heartbeat_interval,
        timer_interval_ms: args.timer_interval,
    });

    let mut intfs_orch = IntfsOrch::new(
        IntfsOrchConfig::new(default_vrf, src_mac),
        Box::new(intf_feed.clone()),
        ports.clone(),
        hal.clone(),
        crm.clone(),
        registrar,
        context.clone(),
    );
    let rif_registry = intfs_orch.registry();

    let mut neigh_orch = NeighOrch::new(
        NeighOrchConfig::default(),
        Box::new(neigh_feed.clone()),
        ports.clone(),
        rif_registry,
        hal.clone(),
        crm.clone(),
        daemon.fanout(),
        context.clone(),
    );

    if args.record {
        let recorder: Arc<dyn RecordSink> = Arc::new(LogRecorder::new());
        intfs_orch.set_recorder(recorder.clone());
        neigh_orch.set_recorder(recorder);
        info!("Recording mode enabled");
    }

    daemon.register_orch(Box::new(intfs_orch));
    daemon.register_orch(Box::new(neigh_orch));
    daemon.register_orch(Box::new(CrmMonitorOrch::new(crm)));

    // Seed some intent so the simulated switch has something to reconcile
    intf_feed.publish_set("Ethernet0", vec![]);
    intf_feed.publish_set("Ethernet0:10.0.0.1/24", vec![]);
    neigh_feed.publish_set(
        "Ethernet0:10.0.0.2",
        vec![("neigh".to_string(), "aa:bb:cc:dd:ee:01".to_string())],
    );

    // Graceful shutdown on ctrl-c
    let shutdown_handle = daemon.shutdown_handle();
    let shutdown = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down");
                shutdown_handle.store(false, std::sync::atomic::Ordering::SeqCst);
            }
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    daemon.run().await;
    for line in daemon.dump() {
        info!("{}", line);
    }
    shutdown.abort();

    info!("switchd orchestration daemon stopped");
    ExitCode::SUCCESS
}

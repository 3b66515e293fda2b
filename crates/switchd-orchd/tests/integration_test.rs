//! End-to-end reconciliation scenarios driven through the dispatch loop.

use std::sync::Arc;
use switchd_hal::{PortOid, SoftSwitch, VirtualRouterOid, VlanOid};
use switchd_orch_common::{MemoryFeed, Orch, PortOperUpdate, SubjectUpdate};
use switchd_orchd::context::SwitchContext;
use switchd_orchd::crm::{self, CrmMonitorOrch, CrmResource, SharedCrm};
use switchd_orchd::daemon::{OrchDaemon, OrchDaemonConfig};
use switchd_orchd::flex_counter::{MemoryCounterStore, RifCounterRegistrar};
use switchd_orchd::intfs::{IntfsOrch, IntfsOrchConfig, RifRegistry};
use switchd_orchd::neigh::{NeighOrch, NeighOrchConfig, NextHopKey};
use switchd_orchd::ports::{PortBinding, PortInfo, PortsView};
use switchd_types::VlanId;

const DEFAULT_VRF: u64 = 0x3000000000000001;

struct Stack {
    intfs: IntfsOrch,
    neigh: NeighOrch,
    intf_feed: MemoryFeed,
    neigh_feed: MemoryFeed,
    hal: Arc<SoftSwitch>,
    crm: SharedCrm,
    ctx: Arc<SwitchContext>,
    store: Arc<MemoryCounterStore>,
    ports: PortsView,
    rifs: RifRegistry,
}

fn default_vrf() -> VirtualRouterOid {
    VirtualRouterOid::from_raw(DEFAULT_VRF).unwrap()
}

/// Builds the full orchestration stack over a soft switch, with the orchs
/// kept directly drivable.
fn stack() -> Stack {
    let hal = Arc::new(SoftSwitch::new());
    let crm = crm::new_shared();
    let store = Arc::new(MemoryCounterStore::new());
    let registrar = Arc::new(RifCounterRegistrar::new(store.clone()));
    let ctx = Arc::new(SwitchContext::new());
    let fanout = Arc::new(std::sync::Mutex::new(switchd_orch_common::EventFanout::new()));

    let ports = PortsView::new();
    for (alias, raw) in [("Ethernet4", 0x104u64), ("Ethernet8", 0x108u64)] {
        ports.insert(PortInfo {
            alias: alias.to_string(),
            binding: PortBinding::Phy(PortOid::from_raw(raw).unwrap()),
            mtu: 9100,
            admin_up: true,
            oper_up: true,
        });
    }
    ports.insert(PortInfo {
        alias: "Vlan100".to_string(),
        binding: PortBinding::Vlan {
            oid: VlanOid::from_raw(0x200).unwrap(),
            vlan_id: VlanId::new(100).unwrap(),
        },
        mtu: 9100,
        admin_up: true,
        oper_up: true,
    });
    ports.set_all_ports_ready(true);

    let intf_feed = MemoryFeed::new("INTF_TABLE");
    let neigh_feed = MemoryFeed::new("NEIGH_TABLE");

    let intfs = IntfsOrch::new(
        IntfsOrchConfig::new(default_vrf(), "02:42:00:00:00:01".parse().unwrap()),
        Box::new(intf_feed.clone()),
        ports.clone(),
        hal.clone(),
        crm.clone(),
        registrar,
        ctx.clone(),
    );
    let rifs = intfs.registry();

    let neigh = NeighOrch::new(
        NeighOrchConfig::default(),
        Box::new(neigh_feed.clone()),
        ports.clone(),
        rifs.clone(),
        hal.clone(),
        crm.clone(),
        fanout,
        ctx.clone(),
    );

    Stack {
        intfs,
        neigh,
        intf_feed,
        neigh_feed,
        hal,
        crm,
        ctx,
        store,
        ports,
        rifs,
    }
}

/// One dispatch cycle over the directly-held orchs, in priority order.
async fn cycle(stack: &mut Stack) {
    stack.intfs.ingest();
    if stack.intfs.has_pending_tasks() {
        stack.intfs.do_task().await.unwrap();
    }
    stack.neigh.ingest();
    if stack.neigh.has_pending_tasks() {
        stack.neigh.do_task().await.unwrap();
    }
}

#[tokio::test]
async fn test_full_reconciliation_through_daemon() {
    let stack = stack();

    // Interface, prefix, and neighbor intent arrive together
    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack
        .intf_feed
        .publish_set("Ethernet4:10.0.0.1/24", vec![]);
    stack.neigh_feed.publish_set(
        "Ethernet4:10.0.0.9",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );

    let hal = stack.hal.clone();
    let crm = stack.crm.clone();
    let store = stack.store.clone();
    let rifs = stack.rifs.clone();

    let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());
    daemon.register_orch(Box::new(stack.intfs));
    daemon.register_orch(Box::new(stack.neigh));
    daemon.register_orch(Box::new(CrmMonitorOrch::new(crm.clone())));

    // IntfsOrch (priority 5) drains before NeighOrch (priority 15), so one
    // cycle resolves everything
    daemon.run_cycle().await.unwrap();

    assert_eq!(hal.rif_count(), 1);
    assert!(hal.has_route(default_vrf(), &"10.0.0.1/32".parse().unwrap()));
    assert_eq!(hal.neighbor_count(), 1);
    assert_eq!(hal.next_hop_count(), 1);
    assert_eq!(rifs.ref_count("Ethernet4"), Some(2));

    {
        let crm = crm.lock().unwrap();
        assert_eq!(crm.used(CrmResource::Ipv4Route), 1);
        assert_eq!(crm.used(CrmResource::Ipv4Neighbor), 1);
        assert_eq!(crm.used(CrmResource::Ipv4NextHop), 1);
    }

    // Counter registration happens on the housekeeping tick
    assert_eq!(store.registered_count(), 0);
    daemon.tick_timers();
    assert_eq!(store.registered_count(), 1);

    let dump = daemon.dump();
    assert!(dump.iter().any(|line| line.contains("IntfsOrch - 0 pending")));
    assert!(dump.iter().any(|line| line.contains("NeighOrch - 0 pending")));
}

#[tokio::test]
async fn test_scenario_overlapping_prefix_held_across_aliases() {
    let mut stack = stack();

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack
        .intf_feed
        .publish_set("Ethernet4:10.0.0.1/24", vec![]);
    stack
        .intf_feed
        .publish_set("Ethernet4:10.0.1.1/24", vec![]);
    cycle(&mut stack).await;

    // Both disjoint prefixes landed on one interface, two self routes
    assert_eq!(stack.hal.rif_count(), 1);
    assert_eq!(stack.hal.route_count(), 2);

    stack.intf_feed.publish_set("Ethernet8", vec![]);
    stack
        .intf_feed
        .publish_set("Ethernet8:10.0.0.2/24", vec![]);
    cycle(&mut stack).await;

    // The second interface exists, but its overlapping prefix is held
    assert_eq!(stack.hal.rif_count(), 2);
    assert_eq!(stack.hal.route_count(), 2);
    assert!(stack.intfs.has_pending_tasks());
    let dump = stack.intfs.dump_pending_tasks();
    assert_eq!(dump.len(), 1);
    assert!(dump[0].contains("Ethernet8:10.0.0.2/24"));
}

#[tokio::test]
async fn test_scenario_neighbor_waits_for_interface() {
    let mut stack = stack();

    // Neighbor intent arrives before its interface exists
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );
    cycle(&mut stack).await;
    assert!(stack.neigh.has_pending_tasks());
    assert_eq!(stack.hal.neighbor_count(), 0);

    // The interface lands; the next cycle's retry resolves the neighbor
    stack.intf_feed.publish_set("Ethernet4", vec![]);
    cycle(&mut stack).await;
    assert!(!stack.neigh.has_pending_tasks());
    assert_eq!(stack.hal.neighbor_count(), 1);
    assert_eq!(stack.hal.next_hop_count(), 1);
}

#[tokio::test]
async fn test_scenario_referenced_neighbor_delete() {
    let mut stack = stack();

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );
    cycle(&mut stack).await;
    assert_eq!(stack.hal.neighbor_count(), 1);

    // The routing layer takes a reference, then the neighbor is withdrawn
    let key = NextHopKey::new("192.0.2.1".parse().unwrap(), "Ethernet4");
    stack.neigh.increase_next_hop_ref_count(&key).unwrap();
    stack.neigh_feed.publish_del("Ethernet4:192.0.2.1");
    cycle(&mut stack).await;

    // Refused while referenced
    assert!(stack.neigh.has_pending_tasks());
    assert_eq!(stack.hal.neighbor_count(), 1);
    assert_eq!(stack.hal.next_hop_count(), 1);

    // Release; the next cycle removes next-hop then neighbor and settles
    // the counters exactly once each
    stack.neigh.decrease_next_hop_ref_count(&key).unwrap();
    cycle(&mut stack).await;
    assert!(!stack.neigh.has_pending_tasks());
    assert_eq!(stack.hal.neighbor_count(), 0);
    assert_eq!(stack.hal.next_hop_count(), 0);
    let crm = stack.crm.lock().unwrap();
    assert_eq!(crm.used(CrmResource::Ipv4Neighbor), 0);
    assert_eq!(crm.used(CrmResource::Ipv4NextHop), 0);
}

#[tokio::test]
async fn test_scenario_link_down_through_daemon() {
    let stack = stack();

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );

    let ctx = stack.ctx.clone();
    let ports = stack.ports.clone();
    let hal = stack.hal.clone();

    let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());
    // NeighOrch subscribed itself to a private fan-out in `stack()`; for
    // the daemon-driven test it must share the daemon's
    let fanout = daemon.fanout();
    let neigh = NeighOrch::new(
        NeighOrchConfig::default(),
        Box::new(stack.neigh_feed.clone()),
        stack.ports.clone(),
        stack.rifs.clone(),
        stack.hal.clone(),
        stack.crm.clone(),
        fanout.clone(),
        ctx.clone(),
    );
    daemon.register_orch(Box::new(stack.intfs));
    daemon.register_orch(Box::new(neigh));
    daemon.run_cycle().await.unwrap();
    assert_eq!(hal.neighbor_count(), 1);

    // Link goes down; the port layer raises the event
    ports.set_oper_state("Ethernet4", false);
    fanout
        .lock()
        .unwrap()
        .notify(SubjectUpdate::PortOper(PortOperUpdate {
            alias: "Ethernet4".into(),
            oper_up: false,
        }));
    daemon.run_cycle().await.unwrap();

    // Exactly one invalidate and one kernel flush; the neighbor remains
    assert_eq!(ctx.invalidations(), vec!["192.0.2.1@Ethernet4"]);
    assert_eq!(ctx.kernel_flushes().len(), 1);
    assert_eq!(hal.neighbor_count(), 1);

    // A duplicate link-down event changes nothing
    fanout
        .lock()
        .unwrap()
        .notify(SubjectUpdate::PortOper(PortOperUpdate {
            alias: "Ethernet4".into(),
            oper_up: false,
        }));
    daemon.run_cycle().await.unwrap();
    assert_eq!(ctx.invalidations().len(), 1);
    assert_eq!(ctx.kernel_flushes().len(), 1);

    // Recovery re-admits the next-hop once
    ports.set_oper_state("Ethernet4", true);
    fanout
        .lock()
        .unwrap()
        .notify(SubjectUpdate::PortOper(PortOperUpdate {
            alias: "Ethernet4".into(),
            oper_up: true,
        }));
    daemon.run_cycle().await.unwrap();
    assert_eq!(ctx.validations(), vec!["192.0.2.1@Ethernet4"]);
}

#[tokio::test]
async fn test_scenario_fatal_interface_failure() {
    let mut stack = stack();
    stack.hal.inject_failure(
        switchd_hal::HalOp::CreateRouterInterface,
        switchd_hal::HalError::InsufficientResources("rif".into()),
    );

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack.intfs.ingest();
    let err = stack.intfs.do_task().await.unwrap_err();
    assert!(err.is_fatal());

    // Never tracked, nothing compensated
    assert!(stack.rifs.is_empty());
    assert_eq!(stack.hal.rif_count(), 0);
    assert_eq!(stack.hal.route_count(), 0);
    assert_eq!(stack.hal.neighbor_count(), 0);
}

#[tokio::test]
async fn test_idempotent_reapplication_of_applied_upsert() {
    let mut stack = stack();

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );
    cycle(&mut stack).await;

    let rif = stack.rifs.router_intf_id("Ethernet4").unwrap();
    let ip = "192.0.2.1".parse().unwrap();
    let mac_before = stack.hal.neighbor_mac(rif, &ip);

    // The same upsert arrives again after being fully applied and drained
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );
    cycle(&mut stack).await;

    assert!(!stack.neigh.has_pending_tasks());
    assert_eq!(stack.hal.neighbor_mac(rif, &ip), mac_before);
    assert_eq!(stack.hal.neighbor_count(), 1);
    assert_eq!(stack.hal.next_hop_count(), 1);
    assert_eq!(stack.crm.lock().unwrap().used(CrmResource::Ipv4Neighbor), 1);
}

#[tokio::test]
async fn test_delete_then_readd_processed_in_order() {
    let mut stack = stack();

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );
    cycle(&mut stack).await;

    // A delete and a re-add with a new MAC land in one batch; the backlog
    // keeps both and the handler sees the delete first
    stack.neigh_feed.publish_del("Ethernet4:192.0.2.1");
    stack.neigh_feed.publish_set(
        "Ethernet4:192.0.2.1",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:02".into())],
    );
    cycle(&mut stack).await;

    let rif = stack.rifs.router_intf_id("Ethernet4").unwrap();
    let ip = "192.0.2.1".parse().unwrap();
    assert_eq!(
        stack.hal.neighbor_mac(rif, &ip),
        Some("aa:bb:cc:dd:ee:02".parse().unwrap())
    );
    assert_eq!(stack.hal.neighbor_count(), 1);
    // One create+remove+create leaves the counter at one
    assert_eq!(stack.crm.lock().unwrap().used(CrmResource::Ipv4Neighbor), 1);
    // The interface reference survived the churn intact
    assert_eq!(stack.rifs.ref_count("Ethernet4"), Some(2));
}

#[tokio::test]
async fn test_interface_teardown_ordering() {
    let mut stack = stack();

    stack.intf_feed.publish_set("Ethernet4", vec![]);
    stack
        .intf_feed
        .publish_set("Ethernet4:10.0.0.1/24", vec![]);
    stack.neigh_feed.publish_set(
        "Ethernet4:10.0.0.9",
        vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())],
    );
    cycle(&mut stack).await;

    // Tearing the interface down while the neighbor exists is refused
    stack.intf_feed.publish_del("Ethernet4:10.0.0.1/24");
    stack.intf_feed.publish_del("Ethernet4");
    cycle(&mut stack).await;
    assert!(stack.intfs.has_pending_tasks());
    assert_eq!(stack.hal.rif_count(), 1);

    // Withdrawing the neighbor releases the references; teardown completes
    stack.neigh_feed.publish_del("Ethernet4:10.0.0.9");
    cycle(&mut stack).await;
    cycle(&mut stack).await;
    assert!(!stack.intfs.has_pending_tasks());
    assert_eq!(stack.hal.rif_count(), 0);
    assert_eq!(stack.hal.route_count(), 0);
    assert_eq!(stack.hal.neighbor_count(), 0);
    assert!(stack.rifs.is_empty());
}

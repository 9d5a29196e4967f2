use std::sync::Arc;
use std::time::Duration;

use conga_conformance::FabricOpts;
use conga_routing::{spawn_timer_driver, CongaTag, Feedback, NoopObserver, Packet, PacketHandler, SharedSwitch, Switch};

fn shared_leaf() -> SharedSwitch {
    let cfg = FabricOpts::default().leaf_config(1);
    SharedSwitch::new(Switch::from_config(&cfg, Arc::new(NoopObserver)).unwrap())
}

fn from_leaf_two(flow: u32) -> Packet {
    let mut pkt = Packet::new(FabricOpts::host(2, 1), FabricOpts::host(1, 1), flow, 1500);
    pkt.add_tag(CongaTag {
        lb_tag: 2,
        ce: 3,
        feedback: Some(Feedback { port: 1, metric: 6 }),
    });
    pkt
}

#[tokio::test(start_paused = true)]
async fn driver_ages_leaf_tables_then_suspends() {
    let _ = tracing_subscriber::fmt::try_init();
    let switch = shared_leaf();
    let handle = spawn_timer_driver(switch.clone());

    switch.handle_packet(&mut from_leaf_two(1)).unwrap();
    let mut out = Packet::new(FabricOpts::host(1, 1), FabricOpts::host(2, 1), 2, 1500);
    switch.handle_packet(&mut out).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    switch.with(|s| {
        let leaf = s.as_leaf().unwrap();
        assert_eq!(leaf.congestion_to_leaf().level(2, 1), 6);
        assert!(leaf.congestion_from_leaf().get(2, 2).is_some());
        assert_eq!(leaf.flowlets().len(), 1);
        assert!(s.next_deadline().is_some());
    });

    // Well past the 10ms staleness window.
    tokio::time::sleep(Duration::from_millis(30)).await;
    switch.with(|s| {
        let leaf = s.as_leaf().unwrap();
        assert_eq!(leaf.congestion_to_leaf().level(2, 1), 0);
        assert!(leaf.congestion_from_leaf().is_empty());
        assert!(leaf.flowlets().is_empty());
        assert!(s.dre().is_idle());
        assert_eq!(s.next_deadline(), None);
    });
    assert_eq!(switch.stats().forwarded, 2);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_leaves_tables_readable() {
    let switch = shared_leaf();
    let handle = spawn_timer_driver(switch.clone());
    switch.handle_packet(&mut from_leaf_two(1)).unwrap();

    handle.shutdown().await;
    switch.with(|s| {
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.as_leaf().unwrap().congestion_to_leaf().level(2, 1), 6);
    });

    // No driver is left to age anything.
    tokio::time::sleep(Duration::from_millis(50)).await;
    switch.with(|s| assert_eq!(s.as_leaf().unwrap().congestion_to_leaf().level(2, 1), 6));
}

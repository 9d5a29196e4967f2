use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use conga_core::{HostEntry, RouteConfig, SwitchConfig};
use conga_routing::{Packet, PacketHandler, Switch};
use conga_telemetry::RoutingMetrics;

fn leaf_config() -> SwitchConfig {
    let mut cfg = SwitchConfig::leaf(1);
    cfg.seed = Some(3);
    cfg.routes = vec![RouteConfig {
        network: Ipv4Addr::new(10, 0, 2, 0),
        mask: Ipv4Addr::new(255, 255, 255, 0),
        port: 1,
    }];
    cfg.hosts = vec![HostEntry { address: Ipv4Addr::new(10, 0, 2, 1), leaf: 2 }];
    cfg
}

#[test]
fn switch_events_reach_prometheus() {
    let metrics = Arc::new(RoutingMetrics::new().unwrap());
    let mut switch = Switch::from_config(&leaf_config(), metrics.clone()).unwrap();
    let src = Ipv4Addr::new(10, 0, 1, 1);
    let now = Instant::now();

    for flow in 0..3 {
        let mut pkt = Packet::new(src, Ipv4Addr::new(10, 0, 2, 1), flow, 1000);
        switch.handle_packet(&mut pkt, now).unwrap();
    }
    let mut unroutable = Packet::new(src, Ipv4Addr::new(192, 168, 0, 1), 9, 1000);
    assert!(switch.handle_packet(&mut unroutable, now).is_err());

    assert_eq!(metrics.flowlets_total(), 3);
    assert_eq!(metrics.dropped_total("no_route"), 1);

    let text = metrics.render().unwrap();
    assert!(text.contains("conga_flowlets_total 3"));
    assert!(text.contains("conga_packets_dropped_total{reason=\"no_route\"} 1"));
}

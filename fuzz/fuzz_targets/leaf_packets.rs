#![no_main]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conga_core::{HostEntry, RouteConfig, SwitchConfig};
use conga_routing::{parse_tag, NoopObserver, Packet, PacketHandler, Switch};
use libfuzzer_sys::fuzz_target;

const RECORD: usize = 24;

fn leaf() -> Switch {
    let mut cfg = SwitchConfig::leaf(1);
    cfg.seed = Some(0);
    let mask = Ipv4Addr::new(255, 255, 255, 0);
    for port in 1..=4 {
        cfg.routes.push(RouteConfig { network: Ipv4Addr::new(10, 0, 2, 0), mask, port });
    }
    cfg.routes.push(RouteConfig { network: Ipv4Addr::new(10, 0, 1, 0), mask, port: 5 });
    for (octet, leaf) in [(1u8, 1u32), (2, 2)] {
        for host in 0..4u8 {
            cfg.hosts.push(HostEntry { address: Ipv4Addr::new(10, 0, octet, host), leaf });
        }
    }
    match Switch::from_config(&cfg, Arc::new(NoopObserver)) {
        Ok(switch) => switch,
        Err(err) => panic!("fuzz leaf config rejected: {err}"),
    }
}

// Each 24-byte record is one packet: src/dst host bytes, flow id, size, time step and an
// optional wire-encoded tag. Routing may reject packets but must never panic, and timers
// must keep working through any sequence.
fuzz_target!(|data: &[u8]| {
    let mut switch = leaf();
    let mut now = Instant::now();
    for record in data.chunks_exact(RECORD) {
        let src = Ipv4Addr::new(10, 0, record[0] % 3, record[1] % 5);
        let dst = Ipv4Addr::new(10, 0, record[2] % 3, record[3] % 5);
        let flow = u32::from(record[4] % 8);
        let size = u32::from(u16::from_be_bytes([record[5], record[6]]));
        now += Duration::from_micros(u64::from(record[7]) * 10);

        let mut packet = Packet::new(src, dst, flow, size);
        if let Ok((_, tag)) = parse_tag(&record[8..]) {
            if record[0] & 0x80 != 0 {
                packet.add_tag(tag);
            }
        }
        let _ = switch.handle_packet(&mut packet, now);
        switch.run_timers(now);
        if let Some(deadline) = switch.next_deadline() {
            assert!(deadline > now);
        }
    }
});

use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use conga_core::{CongaError, PiggybackCursor, SwitchConfig, SwitchRole};
use conga_routing::{NoopObserver, Packet, PacketHandler, Switch};

const LEAF: &str = r#"
flowlet_timeout_us = 80
aging_time_us = 20000
piggyback = "shared"
seed = 42

[role]
kind = "leaf"
leaf_id = 1

[dre]
tdre_us = 100
alpha = 0.5
quantize_bits = 4
link_capacity = "10Gbps"
port_capacity = [{ port = 2, capacity = "40Gbps" }]

[[routes]]
network = "10.0.2.0"
mask = "255.255.255.0"
port = 1

[[routes]]
network = "10.0.2.0"
mask = "255.255.255.0"
port = 2

[[routes]]
network = "10.0.1.1"
mask = "255.255.255.255"
port = 3

[[hosts]]
address = "10.0.1.1"
leaf = 1

[[hosts]]
address = "10.0.2.1"
leaf = 2

[[initial_congestion]]
leaf = 2
port = 1
level = 9
"#;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn leaf_built_from_file_uses_its_settings() {
    let file = write_config(LEAF);
    let cfg = SwitchConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.role, SwitchRole::Leaf { leaf_id: 1 });
    assert_eq!(cfg.piggyback, PiggybackCursor::Shared);

    let mut switch = Switch::from_config(&cfg, Arc::new(NoopObserver)).unwrap();
    assert_eq!(switch.dre().max_level(), 16);

    // Seeded congestion on port 1 sends every new flowlet to port 2.
    for flow in 0..8 {
        let mut pkt = Packet::new(Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(10, 0, 2, 1), flow, 1500);
        assert_eq!(switch.handle_packet(&mut pkt, Instant::now()), Ok(2));
    }
    let leaf = switch.as_leaf().unwrap();
    assert_eq!(leaf.congestion_to_leaf().level(2, 1), 9);
    assert_eq!(leaf.flowlets().timeout().as_micros(), 80);
}

#[test]
fn spine_needs_no_host_map() {
    let file = write_config(
        "[role]\nkind = \"spine\"\n\n[[routes]]\nnetwork = \"10.0.2.0\"\nmask = \"255.255.255.0\"\nport = 2\n",
    );
    let cfg = SwitchConfig::from_file(file.path()).unwrap();
    let switch = Switch::from_config(&cfg, Arc::new(NoopObserver)).unwrap();
    assert_eq!(switch.role(), SwitchRole::Spine);
}

#[test]
fn invalid_file_is_rejected_before_building() {
    let file = write_config("[dre]\nquantize_bits = 0\n");
    let err = SwitchConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, CongaError::InvalidConfig(_)), "{err}");

    let file = write_config("flowlet_timeout_us = \"soon\"\n");
    assert!(matches!(SwitchConfig::from_file(file.path()), Err(CongaError::ConfigParse(_))));
}

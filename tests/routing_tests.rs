use std::net::{IpAddr, Ipv4Addr};

use link_failover::fakes::{MemoryRouteTable, RouteOp};
use link_failover::routing::{
    resolve_gateway, switch_routes, RouteEntry, ACTIVE_PRIORITY, DEMOTED_PRIORITY,
};
use link_failover::FailoverError;

const ETH: &str = "eth0";
const WLAN: &str = "wlan0";

fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

/// Two links with DHCP-style default routes.
fn dual_homed() -> MemoryRouteTable {
    MemoryRouteTable::new()
        .with_link(ETH, 2)
        .with_link(WLAN, 3)
        .with_default_route(ETH, ip(192, 168, 1, 1), 100)
        .with_default_route(WLAN, ip(10, 0, 0, 1), 600)
}

#[test]
fn resolves_gateway_of_each_link() {
    let table = dual_homed();
    assert_eq!(resolve_gateway(&table, ETH).unwrap(), ip(192, 168, 1, 1));
    assert_eq!(resolve_gateway(&table, WLAN).unwrap(), ip(10, 0, 0, 1));
}

#[test]
fn resolver_skips_specific_routes_on_same_link() {
    let table = MemoryRouteTable::new()
        .with_link(ETH, 2)
        .with_entry(RouteEntry {
            destination: Some("10.8.0.0/16".to_string()),
            oif: Some(2),
            gateway: Some(ip(10, 8, 0, 1)),
            priority: None,
        })
        .with_default_route(ETH, ip(192, 168, 1, 1), 100);

    assert_eq!(resolve_gateway(&table, ETH).unwrap(), ip(192, 168, 1, 1));
}

#[test]
fn resolver_skips_entries_without_gateway() {
    let table = MemoryRouteTable::new()
        .with_link(ETH, 2)
        .with_entry(RouteEntry {
            destination: None,
            oif: Some(2),
            gateway: None,
            priority: Some(10),
        })
        .with_default_route(ETH, ip(192, 168, 1, 1), 100);

    assert_eq!(resolve_gateway(&table, ETH).unwrap(), ip(192, 168, 1, 1));
}

#[test]
fn unknown_interface_is_reported() {
    let err = resolve_gateway(&dual_homed(), "eth9").unwrap_err();
    assert!(matches!(err, FailoverError::InterfaceNotFound(name) if name == "eth9"));
}

#[test]
fn link_without_default_route_has_no_gateway() {
    let table = MemoryRouteTable::new().with_link(ETH, 2).with_link(WLAN, 3)
        .with_default_route(ETH, ip(192, 168, 1, 1), 100);
    let err = resolve_gateway(&table, WLAN).unwrap_err();
    assert!(matches!(err, FailoverError::GatewayNotFound(name) if name == WLAN));
}

#[test]
fn switch_gives_new_interface_the_low_metric() {
    let table = dual_homed();
    switch_routes(&table, ETH, WLAN).unwrap();

    assert_eq!(table.priorities(WLAN), vec![ACTIVE_PRIORITY]);
    assert_eq!(table.priorities(ETH), vec![DEMOTED_PRIORITY]);
    assert_eq!(resolve_gateway(&table, ETH).unwrap(), ip(192, 168, 1, 1));
    assert_eq!(resolve_gateway(&table, WLAN).unwrap(), ip(10, 0, 0, 1));
}

#[test]
fn switch_deletes_before_inserting() {
    let table = dual_homed();
    switch_routes(&table, ETH, WLAN).unwrap();

    let ops = table.ops();
    assert_eq!(ops.len(), 4);
    assert!(matches!(&ops[0], RouteOp::Delete(r) if r.interface == ETH));
    assert!(matches!(&ops[1], RouteOp::Delete(r) if r.interface == WLAN));
    assert!(matches!(
        &ops[2],
        RouteOp::Add(r) if r.interface == ETH && r.priority == Some(DEMOTED_PRIORITY)
    ));
    assert!(matches!(
        &ops[3],
        RouteOp::Add(r) if r.interface == WLAN && r.priority == Some(ACTIVE_PRIORITY)
    ));
}

#[test]
fn switch_drains_duplicate_routes() {
    let table = dual_homed()
        .with_default_route(ETH, ip(192, 168, 1, 1), 300)
        .with_default_route(ETH, ip(192, 168, 1, 1), 400)
        .with_default_route(WLAN, ip(10, 0, 0, 1), 700);

    switch_routes(&table, WLAN, ETH).unwrap();

    assert_eq!(table.priorities(ETH), vec![ACTIVE_PRIORITY]);
    assert_eq!(table.priorities(WLAN), vec![DEMOTED_PRIORITY]);
    assert_eq!(table.routes().len(), 2);
}

#[test]
fn switch_replaces_conflicting_metric() {
    // Already in the target metrics, so inserting without deleting would collide
    let table = MemoryRouteTable::new()
        .with_link(ETH, 2)
        .with_link(WLAN, 3)
        .with_default_route(ETH, ip(192, 168, 1, 1), ACTIVE_PRIORITY)
        .with_default_route(WLAN, ip(10, 0, 0, 1), DEMOTED_PRIORITY);

    switch_routes(&table, ETH, WLAN).unwrap();
    assert_eq!(table.priorities(WLAN), vec![ACTIVE_PRIORITY]);
    assert_eq!(table.priorities(ETH), vec![DEMOTED_PRIORITY]);
}

#[test]
fn switch_is_idempotent() {
    let once = dual_homed();
    switch_routes(&once, ETH, WLAN).unwrap();

    let twice = dual_homed();
    switch_routes(&twice, ETH, WLAN).unwrap();
    switch_routes(&twice, ETH, WLAN).unwrap();

    let mut a = once.routes();
    let mut b = twice.routes();
    a.sort_by_key(|r| r.priority);
    b.sort_by_key(|r| r.priority);
    assert_eq!(a, b);
}

#[test]
fn missing_gateway_aborts_without_mutation() {
    let table = MemoryRouteTable::new()
        .with_link(ETH, 2)
        .with_link(WLAN, 3)
        .with_default_route(ETH, ip(192, 168, 1, 1), 100);
    let before = table.routes();

    let err = switch_routes(&table, ETH, WLAN).unwrap_err();
    assert!(matches!(err, FailoverError::GatewayNotFound(name) if name == WLAN));
    assert!(table.ops().is_empty());
    assert_eq!(table.routes(), before);
}

#[test]
fn missing_old_interface_aborts_without_mutation() {
    let table = dual_homed();
    let err = switch_routes(&table, "eth9", WLAN).unwrap_err();
    assert!(matches!(err, FailoverError::InterfaceNotFound(name) if name == "eth9"));
    assert!(table.ops().is_empty());
}

#[test]
fn failed_demoted_insert_still_installs_active_route() {
    let table = dual_homed();
    table.fail_add_on(ETH);

    switch_routes(&table, ETH, WLAN).unwrap();
    assert_eq!(table.priorities(WLAN), vec![ACTIVE_PRIORITY]);
    assert!(table.priorities(ETH).is_empty());
}

#[test]
fn failed_active_insert_fails_the_switch() {
    let table = dual_homed();
    table.fail_add_on(WLAN);

    let err = switch_routes(&table, ETH, WLAN).unwrap_err();
    assert!(matches!(err, FailoverError::RouteMutation(_)));
    assert_eq!(table.priorities(ETH), vec![DEMOTED_PRIORITY]);
    assert!(table.priorities(WLAN).is_empty());
}

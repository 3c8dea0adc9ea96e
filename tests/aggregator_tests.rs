// Aggregator tests: field combination, io_source tagging, host rollup.

mod common;

use common::{device_info, rate_sample};
use gwtop::aggregator::summarize;
use gwtop::models::{DeviceRates, IoSource};
use gwtop::rates::SourceVariant;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn rw_rates(reads: f64, writes: f64, await_ms: f64) -> DeviceRates {
    DeviceRates {
        reads,
        writes,
        iops: reads + writes,
        read_bytes: reads * 4096.0,
        write_bytes: writes * 4096.0,
        await_ms,
        r_await_ms: await_ms,
        w_await_ms: await_ms,
    }
}

fn directory_of(devs: &[&str]) -> HashMap<String, gwtop::directory::DeviceInfo> {
    devs.iter()
        .map(|d| (d.to_string(), device_info(1 << 30, "rbd0")))
        .collect()
}

#[test]
fn shared_device_sums_ops_and_takes_max_wait() {
    let directory = directory_of(&["rbd.disk_1"]);
    let aligned = vec![
        Arc::new(rate_sample(
            "gw-a",
            100,
            &[("rbd.disk_1", rw_rates(50.0, 25.0, 4.0))],
        )),
        Arc::new(rate_sample(
            "gw-b",
            100,
            &[("rbd.disk_1", rw_rates(10.0, 5.0, 9.0))],
        )),
    ];

    let (_, devices) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::BlockMapper,
        "mon-host",
        2,
        &mut HashSet::new(),
    );

    let d = &devices["rbd.disk_1"];
    assert_eq!(d.rates.reads, 60.0);
    assert_eq!(d.rates.writes, 30.0);
    assert_eq!(d.rates.iops, 90.0);
    assert_eq!(d.rates.await_ms, 9.0);
}

#[test]
fn merge_is_commutative_in_host_order() {
    let directory = directory_of(&["rbd.disk_1", "rbd.disk_2"]);
    let a = Arc::new(rate_sample(
        "gw-a",
        100,
        &[
            ("rbd.disk_1", rw_rates(50.0, 25.0, 4.0)),
            ("rbd.disk_2", rw_rates(1.0, 1.0, 1.0)),
        ],
    ));
    let b = Arc::new(rate_sample(
        "gw-b",
        100,
        &[("rbd.disk_1", rw_rates(10.0, 5.0, 9.0))],
    ));

    let mut warned = HashSet::new();
    let (_, ab) = summarize(
        &directory,
        &HashMap::new(),
        &[a.clone(), b.clone()],
        SourceVariant::BlockMapper,
        "mon-host",
        2,
        &mut warned,
    );
    let (_, ba) = summarize(
        &directory,
        &HashMap::new(),
        &[b, a],
        SourceVariant::BlockMapper,
        "mon-host",
        2,
        &mut warned,
    );

    for dev in ["rbd.disk_1", "rbd.disk_2"] {
        assert_eq!(ab[dev].rates, ba[dev].rates, "host order changed {}", dev);
        assert_eq!(ab[dev].io_source, ba[dev].io_source);
    }
}

#[test]
fn absent_device_keeps_static_attributes_with_zero_rates() {
    let mut directory = HashMap::new();
    directory.insert("rbd.quiet".to_string(), device_info(42 << 20, "rbd7"));
    let aligned = vec![Arc::new(rate_sample("gw-a", 100, &[]))];

    let (_, devices) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::BlockMapper,
        "gw-a",
        1,
        &mut HashSet::new(),
    );

    let d = &devices["rbd.quiet"];
    assert_eq!(d.rates, DeviceRates::default());
    assert_eq!(d.capacity, 42 << 20);
    assert_eq!(d.rbd_name, "rbd7");
    assert_eq!(d.io_source, IoSource::None);
}

#[test]
fn unknown_reported_device_is_excluded_and_warned_once() {
    let directory = directory_of(&["rbd.known"]);
    let aligned = vec![Arc::new(rate_sample(
        "gw-a",
        100,
        &[("rbd.ghost", rw_rates(1.0, 1.0, 0.0))],
    ))];

    let mut warned = HashSet::new();
    let (_, devices) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::BlockMapper,
        "gw-a",
        1,
        &mut warned,
    );
    assert!(!devices.contains_key("rbd.ghost"));
    assert!(warned.contains("rbd.ghost"));

    // second cycle: already warned, still excluded
    let (_, devices) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::BlockMapper,
        "gw-a",
        1,
        &mut warned,
    );
    assert!(!devices.contains_key("rbd.ghost"));
    assert_eq!(warned.len(), 1);
}

#[test]
fn io_source_tags_local_over_remote() {
    let directory = directory_of(&["rbd.disk_1"]);
    let aligned = vec![
        Arc::new(rate_sample(
            "gw-a",
            100,
            &[("rbd.disk_1", rw_rates(50.0, 25.0, 0.0))],
        )),
        Arc::new(rate_sample(
            "gw-b",
            100,
            &[("rbd.disk_1", rw_rates(0.0, 0.0, 0.0))],
        )),
    ];

    let (_, from_a) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::BlockMapper,
        "gw-a",
        2,
        &mut HashSet::new(),
    );
    assert_eq!(from_a["rbd.disk_1"].io_source, IoSource::Local);

    let (_, from_elsewhere) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::BlockMapper,
        "gw-b",
        2,
        &mut HashSet::new(),
    );
    assert_eq!(from_elsewhere["rbd.disk_1"].io_source, IoSource::Remote);
}

#[test]
fn user_backed_variant_ignores_wait_fields() {
    let directory = directory_of(&["rbd.disk_1"]);
    let aligned = vec![Arc::new(rate_sample(
        "gw-a",
        100,
        &[("rbd.disk_1", rw_rates(10.0, 10.0, 7.0))],
    ))];

    let (_, devices) = summarize(
        &directory,
        &HashMap::new(),
        &aligned,
        SourceVariant::UserBacked,
        "gw-a",
        1,
        &mut HashSet::new(),
    );
    let d = &devices["rbd.disk_1"];
    assert_eq!(d.rates.iops, 20.0);
    assert_eq!(d.rates.await_ms, 0.0);
    assert_eq!(d.rates.reads, 0.0);
}

#[test]
fn host_rollup_collects_cpu_net_capacity_and_iops() {
    let directory = directory_of(&["rbd.disk_1", "rbd.disk_2"]);
    let mut a = rate_sample("gw-a", 100, &[("rbd.disk_1", rw_rates(30.0, 10.0, 0.0))]);
    a.cpu_busy_pct = 20.0;
    a.net_in = 1_000.0;
    a.net_out = 2_000.0;
    let mut b = rate_sample("gw-b", 100, &[("rbd.disk_2", rw_rates(5.0, 5.0, 0.0))]);
    b.cpu_busy_pct = 55.0;
    b.net_in = 500.0;
    b.net_out = 100.0;

    let (hosts, _) = summarize(
        &directory,
        &HashMap::new(),
        &[Arc::new(a), Arc::new(b)],
        SourceVariant::BlockMapper,
        "gw-a",
        3,
        &mut HashSet::new(),
    );

    assert_eq!(hosts.hosts_up, 2);
    assert_eq!(hosts.hosts_configured, 3);
    assert_eq!(hosts.min_cpu, 20.0);
    assert_eq!(hosts.max_cpu, 55.0);
    assert_eq!(hosts.total_net_in, 1_500.0);
    assert_eq!(hosts.total_net_out, 2_100.0);
    assert_eq!(hosts.total_capacity, 2 << 30);
    assert_eq!(hosts.total_iops, 50);
    assert_eq!(hosts.timestamp, 100);
}

#[test]
fn empty_cycle_yields_no_data_rollup() {
    let directory = directory_of(&["rbd.disk_1"]);
    let (hosts, devices) = summarize(
        &directory,
        &HashMap::new(),
        &[],
        SourceVariant::BlockMapper,
        "gw-a",
        2,
        &mut HashSet::new(),
    );
    assert_eq!(hosts.hosts_up, 0);
    assert_eq!(hosts.timestamp, 0);
    assert_eq!(hosts.min_cpu, 0.0);
    assert_eq!(devices["rbd.disk_1"].rates, DeviceRates::default());
}

#[test]
fn client_map_attaches_to_rows() {
    let directory = directory_of(&["rbd.disk_1"]);
    let mut clients = HashMap::new();
    clients.insert("rbd.disk_1".to_string(), "web01".to_string());
    let (_, devices) = summarize(
        &directory,
        &clients,
        &[],
        SourceVariant::BlockMapper,
        "gw-a",
        1,
        &mut HashSet::new(),
    );
    assert_eq!(devices["rbd.disk_1"].client, "web01");
}

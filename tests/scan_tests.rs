//! Bus scanner behaviour against the recording fake transport.

mod common;

use common::*;
use ft260_hid::{Error, I2cFlag};

fn probed_addresses(fake: &Fake) -> Vec<u8> {
    fake.calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Read { address, .. } | Call::Write { address, .. } => Some(address),
            _ => None,
        })
        .collect()
}

#[test]
fn test_scan_returns_only_acknowledging_address() {
    init_logging();
    let fake = Fake::new();
    fake.add_device(0x3C, SimDevice::registers());
    let bridge = fake.bridge();

    assert_eq!(bridge.i2c_scan_default().unwrap(), vec![0x3C]);
}

#[test]
fn test_scan_never_probes_outside_range() {
    let fake = Fake::new();
    fake.add_device(0x08, SimDevice::registers());
    fake.add_device(0x15, SimDevice::registers());
    fake.add_device(0x40, SimDevice::registers());
    let bridge = fake.bridge();

    let found = bridge.i2c_scan(0x10, 0x20).unwrap();
    assert_eq!(found, vec![0x15]);
    let probed = probed_addresses(&fake);
    assert!(!probed.is_empty());
    assert!(probed.iter().all(|a| (0x10..=0x20).contains(a)));
}

#[test]
fn test_scan_results_are_ascending() {
    let fake = Fake::new();
    for addr in [0x70, 0x20, 0x48] {
        fake.add_device(addr, SimDevice::registers());
    }
    let bridge = fake.bridge();
    assert_eq!(bridge.i2c_scan_default().unwrap(), vec![0x20, 0x48, 0x70]);
}

#[test]
fn test_absent_address_gets_all_three_probes_in_order() {
    let fake = Fake::new();
    let bridge = fake.bridge();

    assert!(!bridge.probe_address(0x30).unwrap());
    let transfers: Vec<Call> = fake
        .transfer_calls()
        .into_iter()
        .filter(Call::is_i2c_transfer)
        .collect();
    assert_eq!(
        transfers,
        vec![
            Call::Write {
                address: 0x30,
                flag: I2cFlag::StartAndStop,
                data: vec![0x00],
            },
            Call::Read {
                address: 0x30,
                flag: I2cFlag::StartAndStop,
                len: 1,
            },
            Call::Write {
                address: 0x30,
                flag: I2cFlag::StartAndStop,
                data: vec![],
            },
        ]
    );
}

#[test]
fn test_present_device_needs_one_probe() {
    let fake = Fake::new();
    fake.add_device(0x30, SimDevice::registers());
    let bridge = fake.bridge();

    assert!(bridge.probe_address(0x30).unwrap());
    assert_eq!(fake.count(Call::is_i2c_transfer), 1);
}

#[test]
fn test_read_only_device_found_by_second_probe() {
    let fake = Fake::new();
    fake.add_device(0x50, SimDevice::read_only());
    let bridge = fake.bridge();

    assert!(bridge.probe_address(0x50).unwrap());
    assert_eq!(fake.count(Call::is_i2c_transfer), 2);
}

#[test]
fn test_address_only_device_found_by_quick_write() {
    let fake = Fake::new();
    fake.add_device(0x0C, SimDevice::address_only());
    let bridge = fake.bridge();

    assert_eq!(bridge.i2c_scan(0x08, 0x0F).unwrap(), vec![0x0C]);
}

#[test]
fn test_transport_failures_count_as_absent() {
    let fake = Fake::new();
    fake.add_device(0x3C, SimDevice::registers());
    let bridge = fake.bridge();
    fake.state().fail_transfers = true;

    assert_eq!(bridge.i2c_scan(0x38, 0x3F).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_invalid_range_rejected_before_bus_access() {
    let fake = Fake::new();
    let bridge = fake.bridge();

    assert!(matches!(
        bridge.i2c_scan(0x50, 0x40),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(matches!(
        bridge.i2c_scan(0x00, 0x80),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert!(fake.calls().is_empty());
}

#[test]
fn test_progress_callback_sees_every_address() {
    let fake = Fake::new();
    fake.add_device(0x22, SimDevice::registers());
    let bridge = fake.bridge();

    let mut seen = Vec::new();
    let found = bridge
        .i2c_scan_with_progress(0x20, 0x27, |addr, found, idx, total| {
            seen.push((addr, found, idx, total));
        })
        .unwrap();
    assert_eq!(found, vec![0x22]);
    assert_eq!(seen.len(), 8);
    assert_eq!(seen[0], (0x20, false, 0, 8));
    assert_eq!(seen[2], (0x22, true, 2, 8));
    assert_eq!(seen[7], (0x27, false, 7, 8));
}

#[test]
fn test_scan_on_closed_bridge_fails() {
    let fake = Fake::new();
    let bridge = fake.bridge();
    bridge.close();
    assert!(matches!(
        bridge.i2c_scan_default(),
        Err(Error::NotConnected)
    ));
}

#[test]
fn test_non_bus_error_mid_scan_counts_as_absent() {
    let fake = Fake::new();
    fake.add_device(0x20, SimDevice::registers());
    fake.add_device(0x24, SimDevice::registers());
    let bridge = fake.bridge();

    let mut seen = Vec::new();
    let found = bridge
        .i2c_scan_with_progress(0x20, 0x27, |addr, found, _, _| {
            seen.push((addr, found));
            if addr == 0x22 {
                bridge.close();
            }
        })
        .unwrap();
    assert_eq!(found, vec![0x20]);
    assert_eq!(seen.len(), 8);
    assert_eq!(seen[4], (0x24, false));
    assert!(probed_addresses(&fake).iter().all(|a| *a <= 0x22));
}

#[test]
fn test_presence_check_on_closed_bridge_is_absent() {
    let fake = Fake::new();
    fake.add_device(0x3C, SimDevice::registers());
    let bridge = fake.bridge();
    bridge.close();
    assert!(!bridge.probe_address(0x3C).unwrap());
    assert!(probed_addresses(&fake).is_empty());
}

#[test]
fn test_scan_grid_marks_found_devices() {
    let grid = ft260_hid::format_scan_grid(&[0x3C], 0x03, 0x77);
    let row = grid.lines().find(|l| l.starts_with("30:")).unwrap();
    assert_eq!(
        row.trim_end(),
        "30: -- -- -- -- -- -- -- -- -- -- -- -- 3c -- -- --"
    );
}

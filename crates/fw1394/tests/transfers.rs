mod support;

use fw1394::sim::SimIo;
use fw1394::{Error, ResultCode};

use support::{open_device, patterned, sim_with_device, GUID};

#[test]
fn read_returns_exactly_the_requested_length() {
    let (_sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    for len in [1usize, 7, 2048, 2049, 5000, 16384] {
        let data = device.read(0x100, len).unwrap();
        assert_eq!(data.len(), len);
        assert_eq!(data, patterned(0x100, len));
    }
}

#[test]
fn oversized_read_is_chunked_into_one_vectorized_call() {
    let (sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    // R = 2048, L = 5000: two full chunks plus a 904-byte remainder.
    let data = device.read(0, 5000).unwrap();
    assert_eq!(data, patterned(0, 5000));

    let log = sim.io_log();
    assert_eq!(log.len(), 1, "the whole transfer must be one native call");
    let (dir, chunks) = &log[0];
    assert_eq!(*dir, SimIo::Read);
    assert_eq!(chunks, &vec![(0, 2048), (2048, 2048), (4096, 904)]);
}

#[test]
fn batch_results_preserve_request_order() {
    let (sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    let batch = device.read_batch(&[(100, 4), (200, 8)]).unwrap();
    assert_eq!(batch.len(), 2);
    let regions: Vec<_> = batch.collect();

    assert_eq!(regions[0].addr(), 100);
    assert_eq!(regions[0].bytes(), &patterned(100, 4)[..]);
    assert_eq!(regions[1].addr(), 200);
    assert_eq!(regions[1].bytes(), &patterned(200, 8)[..]);

    let log = sim.io_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].1, vec![(100, 4), (200, 8)]);
}

#[test]
fn oversized_batch_elements_are_split_in_place() {
    let (sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    let batch = device.read_batch(&[(0, 4106), (0x8000, 16)]).unwrap();
    let regions: Vec<_> = batch.collect();
    assert_eq!(regions[0].bytes(), &patterned(0, 4106)[..]);
    assert_eq!(regions[1].bytes(), &patterned(0x8000, 16)[..]);

    let log = sim.io_log();
    assert_eq!(log.len(), 1);
    assert_eq!(
        log[0].1,
        vec![(0, 2048), (2048, 2048), (4096, 10), (0x8000, 16)]
    );
}

#[test]
fn zero_length_transfers_issue_no_native_call() {
    let (sim, mut bus) = sim_with_device();
    let mut device = open_device(&mut bus);

    assert!(device.read(0x400, 0).unwrap().is_empty());
    device.write(0x400, &[]).unwrap();

    let batch = device.read_batch(&[]).unwrap();
    assert_eq!(batch.len(), 0);

    // A zero-length element still yields its (empty) region, in order.
    let batch = device.read_batch(&[(10, 2), (20, 0), (30, 1)]).unwrap();
    let regions: Vec<_> = batch.collect();
    assert_eq!(regions.len(), 3);
    assert_eq!(regions[1].addr(), 20);
    assert!(regions[1].is_empty());
    assert_eq!(regions[2].bytes(), &patterned(30, 1)[..]);

    // Only the non-empty batch reached the native layer.
    let log = sim.io_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].1, vec![(10, 2), (30, 1)]);
}

#[test]
fn write_roundtrips_through_device_memory() {
    let (sim, mut bus) = sim_with_device();
    let mut device = open_device(&mut bus);

    let data = patterned(9999, 5000);
    device.write(100, &data).unwrap();
    assert_eq!(sim.snapshot(GUID, 100, 5000), data);

    let log = sim.io_log();
    assert_eq!(log.len(), 1);
    let (dir, chunks) = &log[0];
    assert_eq!(*dir, SimIo::Write);
    assert_eq!(chunks, &vec![(100, 2048), (2148, 2048), (4196, 904)]);
}

#[test]
fn write_batch_covers_disjoint_regions() {
    let (sim, mut bus) = sim_with_device();
    let mut device = open_device(&mut bus);

    device
        .write_batch(&[(0x10, b"alpha"), (0x2000, b"bravo")])
        .unwrap();
    assert_eq!(sim.snapshot(GUID, 0x10, 5), b"alpha");
    assert_eq!(sim.snapshot(GUID, 0x2000, 5), b"bravo");

    let log = sim.io_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].1, vec![(0x10, 5), (0x2000, 5)]);
}

#[test]
fn address_overflow_is_rejected_before_any_native_call() {
    let (sim, mut bus) = sim_with_device();
    let mut device = open_device(&mut bus);

    assert!(matches!(
        device.read(u64::MAX - 2, 8).unwrap_err(),
        Error::AddressOverflow { len: 8, .. }
    ));
    assert!(matches!(
        device.write(u64::MAX, b"xy").unwrap_err(),
        Error::AddressOverflow { .. }
    ));
    assert!(sim.io_log().is_empty());
}

#[test]
fn out_of_range_read_surfaces_as_device_io() {
    let (_sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    // Just past the simulated 1 MiB image.
    let err = device.read((1 << 20) - 10, 20).unwrap_err();
    assert!(matches!(err, Error::DeviceIo { op: "read_device_v", .. }));
}

#[test]
fn timeout_and_size_violation_are_distinct_errors() {
    let (sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    sim.inject_fault(ResultCode::Timeout);
    assert!(matches!(
        device.read(0, 64).unwrap_err(),
        Error::Timeout { op: "read_device_v" }
    ));

    sim.inject_fault(ResultCode::SizeViolation);
    assert!(matches!(
        device.read(0, 64).unwrap_err(),
        Error::RequestTooLarge { op: "read_device_v" }
    ));
}

#[test]
fn a_failed_batch_reports_a_single_error() {
    let (sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    sim.inject_fault(ResultCode::Io);
    let err = device
        .read_batch(&[(0, 2048), (4096, 2048), (8192, 2048)])
        .unwrap_err();
    assert!(matches!(err, Error::DeviceIo { .. }));
}

#[test]
#[should_panic(expected = "not open")]
fn io_on_an_unopened_device_is_a_contract_violation() {
    let (_sim, mut bus) = sim_with_device();
    let devices = bus.devices().unwrap();
    let _ = devices[0].read(0, 16);
}

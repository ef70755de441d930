mod support;

use std::rc::Rc;

use fw1394::sim::{SimDeviceConfig, SimDriver};
use fw1394::{Bus, Error, ResultCode, CSR_WORDS};

use support::{open_device, sim_with_device};

#[test]
fn empty_bus_enumerates_to_nothing_and_stays_usable() {
    let sim = Rc::new(SimDriver::new());
    let mut bus = Bus::with_driver(sim.clone()).unwrap();

    assert!(bus.devices().unwrap().is_empty());
    assert!(bus.devices().unwrap().is_empty());

    // A later hotplug is picked up by the same bus.
    sim.attach(SimDeviceConfig::default());
    assert_eq!(bus.devices().unwrap().len(), 1);
}

#[test]
fn metadata_is_captured_at_discovery() {
    let sim = Rc::new(SimDriver::new());
    let mut csr = [0u32; CSR_WORDS];
    csr[0] = 0x0404_0000;
    csr[255] = 0xdead_beef;
    sim.attach(SimDeviceConfig {
        node_id: 0xffc1,
        guid: 0x0123_4567_89ab,
        vendor_name: "ACME".to_owned(),
        vendor_id: 0x1234,
        product_name: "Workstation".to_owned(),
        product_id: 0x9876,
        max_request_size: 4096,
        csr,
        ..SimDeviceConfig::default()
    });
    let mut bus = Bus::with_driver(sim).unwrap();

    let devices = bus.devices().unwrap();
    let device = &devices[0];
    assert_eq!(device.node_id(), 0xffc1);
    assert_eq!(device.guid(), 0x0123_4567_89ab);
    assert_eq!(device.vendor_name(), "ACME");
    assert_eq!(device.vendor_id(), 0x1234);
    assert_eq!(device.product_name(), "Workstation");
    assert_eq!(device.product_id(), 0x9876);
    assert_eq!(device.max_request_size(), 4096);
    assert_eq!(device.csr()[0], 0x0404_0000);
    assert_eq!(device.csr()[255], 0xdead_beef);
    assert!(!device.is_stale());
    assert!(!device.is_open());
}

#[test]
fn enable_sbp2_is_idempotent() {
    let (sim, mut bus) = sim_with_device();
    bus.enable_sbp2().unwrap();
    bus.enable_sbp2().unwrap();
    bus.enable_sbp2().unwrap();
    assert_eq!(sim.sbp2_calls(), 1);
}

#[test]
fn re_enumeration_marks_prior_devices_stale() {
    let (_sim, mut bus) = sim_with_device();
    let mut old = open_device(&mut bus);
    assert!(old.is_open());

    let fresh = bus.devices().unwrap();
    assert_eq!(fresh.len(), 1);

    // The old handle is terminally unusable, without any native call.
    assert!(old.is_stale());
    assert!(!old.is_open());
    assert!(matches!(old.open().unwrap_err(), Error::StaleHandle));
    assert!(matches!(old.read(0, 16).unwrap_err(), Error::StaleHandle));
    assert!(matches!(
        old.write(0, &[1, 2, 3]).unwrap_err(),
        Error::StaleHandle
    ));
    assert!(matches!(
        old.read_batch(&[(0, 4)]).unwrap_err(),
        Error::StaleHandle
    ));
    // close() must not fault on a stale device.
    old.close();
}

#[test]
fn staleness_survives_multiple_enumerations() {
    let (_sim, mut bus) = sim_with_device();
    let first = open_device(&mut bus);
    let second = bus.devices().unwrap();
    let _third = bus.devices().unwrap();

    assert!(first.is_stale());
    for device in &second {
        assert!(device.is_stale());
    }
}

#[test]
fn dropping_a_stale_open_device_never_touches_the_native_handle() {
    let (_sim, mut bus) = sim_with_device();
    let old = open_device(&mut bus);
    let _fresh = bus.devices().unwrap();

    // The simulator panics on any call against a freed handle, so this drop
    // passing proves the close-on-drop path is guarded by the stale check.
    drop(old);
}

#[test]
fn permission_denied_enumeration_still_stales_prior_devices() {
    let (sim, mut bus) = sim_with_device();
    let old = open_device(&mut bus);

    sim.deny_next_enumeration();
    assert!(matches!(
        bus.devices().unwrap_err(),
        Error::PermissionDenied
    ));
    // Invalidation happens before the native query, so the denial does not
    // leave the old handle usable.
    assert!(old.is_stale());

    // The bus itself remains usable once permissions allow.
    assert_eq!(bus.devices().unwrap().len(), 1);
}

#[test]
fn bus_reset_during_open_is_recoverable() {
    let (sim, mut bus) = sim_with_device();
    let mut devices = bus.devices().unwrap();

    sim.inject_fault(ResultCode::BusReset);
    let err = devices[0].open().unwrap_err();
    assert!(matches!(err, Error::BusReset { op: "open_device" }));
    assert!(err.is_recoverable());

    // Recovery path: re-enumerate, then retry.
    let mut device = open_device(&mut bus);
    assert_eq!(device.read(0, 8).unwrap().len(), 8);
    device.close();
}

#[test]
fn open_failure_carries_op_and_native_diagnostic() {
    let (sim, mut bus) = sim_with_device();
    let mut devices = bus.devices().unwrap();

    sim.inject_fault(ResultCode::Io);
    match devices[0].open().unwrap_err() {
        Error::DeviceIo { op, detail } => {
            assert_eq!(op, "open_device");
            assert_eq!(detail, "I/O error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn close_is_a_noop_on_an_already_closed_device() {
    let (_sim, mut bus) = sim_with_device();
    let mut device = open_device(&mut bus);
    device.close();
    assert!(!device.is_open());
    device.close();
    assert!(!device.is_open());

    // And the device can be reopened afterwards.
    device.open().unwrap();
    assert!(device.is_open());
}

#[test]
fn devices_keep_the_bus_resource_alive() {
    let (_sim, mut bus) = sim_with_device();
    let device = open_device(&mut bus);

    // The device's back-reference holds the native bus open even after the
    // Bus value itself is gone; the handle was never invalidated, so I/O
    // still works.
    drop(bus);
    assert_eq!(device.read(0, 32).unwrap().len(), 32);
}

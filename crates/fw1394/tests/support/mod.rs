#![allow(dead_code)]

use std::rc::Rc;

use fw1394::sim::{SimDeviceConfig, SimDriver};
use fw1394::{Bus, Device};

/// GUID of the default simulated device.
pub const GUID: u64 = 0x0050_c500_1234;

/// Bytes seeded into the low part of the simulated memory image.
pub const SEEDED: usize = 64 * 1024;

/// Position-dependent fill so tests can check any range against the address
/// it was read from.
pub fn patterned(addr: u64, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((addr + i as u64) as u8).wrapping_mul(31).wrapping_add(7))
        .collect()
}

/// A simulator with one attached default device, its first [`SEEDED`] bytes
/// patterned, and a bus on top of it.
pub fn sim_with_device() -> (Rc<SimDriver>, Bus) {
    let sim = Rc::new(SimDriver::new());
    sim.attach(SimDeviceConfig::default());
    sim.load_memory(GUID, 0, &patterned(0, SEEDED));
    let bus = Bus::with_driver(sim.clone()).unwrap();
    (sim, bus)
}

/// Enumerates exactly one device and opens it.
pub fn open_device(bus: &mut Bus) -> Device {
    let mut devices = bus.devices().unwrap();
    assert_eq!(devices.len(), 1);
    let mut device = devices.remove(0);
    device.open().unwrap();
    device
}

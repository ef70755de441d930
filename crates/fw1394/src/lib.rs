//! Host-side access to the memory address space of FireWire (IEEE-1394)
//! devices, as used for physical-memory forensic acquisition.
//!
//! The crate sits on top of a native transport that speaks the wire protocol
//! (abstracted as [`NativeDriver`]) and provides the request-shaping,
//! lifecycle, and error-mapping layer:
//!
//! - [`Bus`]: owns the native bus resource, enumerates attached [`Device`]s,
//!   and invalidates previously issued handles across topology changes.
//! - [`Device`]: one discovered node with cached identity metadata; exposes
//!   contiguous and scatter/gather reads and writes, transparently split
//!   into bounded chunks and submitted as single vectorized native calls.
//! - [`Error`]: typed failures distinguishing the recoverable bus-reset
//!   condition from stale handles, permission denial, and native I/O errors.
//!
//! Two drivers are provided: [`sim::SimDriver`], an in-memory simulation for
//! tests and hardware-free development, and (behind the `system-driver`
//! feature) `SystemDriver`, bindings to the system `forensic1394` shared
//! library reached via [`Bus::alloc`].
//!
//! All types are single-threaded (`!Send`), matching the blocking,
//! synchronous native layer; there is no internal locking.
//!
//! ```
//! use std::rc::Rc;
//!
//! use fw1394::sim::{SimDeviceConfig, SimDriver};
//! use fw1394::Bus;
//!
//! let sim = Rc::new(SimDriver::new());
//! let config = SimDeviceConfig::default();
//! let guid = config.guid;
//! sim.attach(config);
//! sim.load_memory(guid, 0x1000, b"evidence");
//!
//! let mut bus = Bus::with_driver(sim)?;
//! bus.enable_sbp2()?;
//!
//! let mut devices = bus.devices()?;
//! let target = &mut devices[0];
//! target.open()?;
//! assert_eq!(target.read(0x1000, 8)?, b"evidence");
//! # Ok::<(), fw1394::Error>(())
//! ```

mod bus;
mod device;
mod error;
#[cfg(feature = "system-driver")]
mod ffi;
pub mod sim;
mod sys;
mod xfer;

pub use bus::Bus;
pub use device::{Device, ReadBatch, ReadRegion};
pub use error::{Error, Result, ResultCode};
#[cfg(feature = "system-driver")]
pub use ffi::SystemDriver;
pub use sys::{BusHandle, DevHandle, NativeDriver, NativeRequest, CSR_WORDS};

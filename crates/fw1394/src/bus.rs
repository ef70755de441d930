use std::rc::{Rc, Weak};

use tracing::debug;

use crate::device::{Device, DeviceState};
use crate::error::{failure, translate, Error, Result, ResultCode};
use crate::sys::{BusHandle, NativeDriver};

/// Exclusive owner of the native bus resource.
///
/// Shared (via `Rc`) between the [`Bus`] and every [`Device`] it has
/// produced: a device's back-reference keeps the native bus alive until the
/// last holder is gone, so the resource can never be destroyed out from
/// under an in-use device.
pub(crate) struct BusCore {
    driver: Rc<dyn NativeDriver>,
    handle: BusHandle,
}

impl BusCore {
    pub(crate) fn driver(&self) -> &dyn NativeDriver {
        &*self.driver
    }
}

impl Drop for BusCore {
    fn drop(&mut self) {
        debug!("destroying native bus");
        self.driver.bus_destroy(self.handle);
    }
}

/// Host-side owner of a FireWire bus: allocates the native resource,
/// enumerates attached [`Device`]s, and invalidates handles across topology
/// changes.
///
/// Every call to [`devices`](Bus::devices) marks the devices returned by the
/// previous call stale before requerying the native layer, because that query
/// may free or renumber the underlying native handles. Callers may keep old
/// `Device` values around, but once stale they fail all I/O with
/// [`Error::StaleHandle`].
///
/// `Bus` performs no internal locking; it is single-threaded by construction
/// (`!Send`), matching the blocking, synchronous native layer beneath it.
pub struct Bus {
    core: Rc<BusCore>,
    tracked: Vec<Weak<DeviceState>>,
    sbp2_enabled: bool,
}

impl Bus {
    /// Allocates a bus backed by the system FireWire driver.
    #[cfg(feature = "system-driver")]
    pub fn alloc() -> Result<Self> {
        Self::with_driver(Rc::new(crate::ffi::SystemDriver))
    }

    /// Allocates a bus on top of an arbitrary [`NativeDriver`], e.g. the
    /// in-memory [`SimDriver`](crate::sim::SimDriver).
    pub fn with_driver(driver: Rc<dyn NativeDriver>) -> Result<Self> {
        let handle = driver.bus_alloc().ok_or_else(|| Error::DeviceIo {
            op: "bus_alloc",
            detail: "native bus allocation failed".to_owned(),
        })?;
        debug!("allocated native bus");
        Ok(Bus {
            core: Rc::new(BusCore { driver, handle }),
            tracked: Vec::new(),
            sbp2_enabled: false,
        })
    }

    /// Asks the native layer to present attached storage-class targets under
    /// an SBP-2 unit directory, making their address space accessible.
    ///
    /// Usually triggers a bus reset, so call it before the first
    /// [`devices`](Bus::devices). Idempotent: repeat calls after a success
    /// are no-ops.
    pub fn enable_sbp2(&mut self) -> Result<()> {
        if self.sbp2_enabled {
            return Ok(());
        }
        let code = self.core.driver.enable_sbp2(self.core.handle);
        translate("enable_sbp2", code, |c| self.core.driver.result_str(c))?;
        self.sbp2_enabled = true;
        Ok(())
    }

    /// Enumerates the devices currently attached to the bus.
    ///
    /// Ownership of each returned [`Device`] belongs to the caller; the bus
    /// keeps only non-owning observers so the *next* enumeration can flip
    /// their stale flag. Fails with [`Error::PermissionDenied`] when the
    /// native layer refuses the query; prior devices are already stale by
    /// then.
    pub fn devices(&mut self) -> Result<Vec<Device>> {
        // Invalidate before requerying: the native call may free or renumber
        // the handles behind any Device the caller still holds.
        for observer in self.tracked.drain(..) {
            if let Some(state) = observer.upgrade() {
                state.stale.set(true);
            }
        }

        let handles = self
            .core
            .driver
            .get_devices(self.core.handle)
            .map_err(|code| match ResultCode::from_raw(code) {
                ResultCode::NoPermission => Error::PermissionDenied,
                _ => failure("get_devices", code, |c| self.core.driver.result_str(c)),
            })?;

        let mut devices = Vec::with_capacity(handles.len());
        for handle in handles {
            let device = Device::new(Rc::clone(&self.core), handle);
            self.tracked.push(Rc::downgrade(device.state()));
            devices.push(device);
        }
        debug!(count = devices.len(), "enumerated bus devices");
        Ok(devices)
    }
}

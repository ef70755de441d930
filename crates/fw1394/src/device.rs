use std::cell::Cell;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bus::BusCore;
use crate::error::{translate, Error, Result};
use crate::sys::{DevHandle, NativeDriver, NativeRequest, CSR_WORDS};
use crate::xfer::TransferPlan;

/// Mutable device state shared with the owning bus.
///
/// The bus holds only a `Weak` to this, never extending the device's
/// lifetime: on re-enumeration it flips `stale` on whichever devices the
/// caller still holds. Staleness is monotonic; nothing ever clears it.
#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    pub(crate) stale: Cell<bool>,
    pub(crate) open: Cell<bool>,
}

/// One discovered bus node with a readable and writable memory address space.
///
/// Devices are created only by [`Bus::devices`](crate::Bus::devices), which
/// captures all identity metadata once at discovery time. A device must be
/// [`open`](Device::open)ed before I/O, and every handle from an enumeration
/// is invalidated (made *stale*) by the next enumeration on the same bus:
/// stale devices fail all further operations with [`Error::StaleHandle`]
/// without touching the native layer.
///
/// Dropping an open, non-stale device closes it, so the native handle is
/// released on every exit path.
pub struct Device {
    bus: Rc<BusCore>,
    handle: DevHandle,
    state: Rc<DeviceState>,
    node_id: u16,
    guid: u64,
    vendor_name: String,
    vendor_id: i32,
    product_name: String,
    product_id: i32,
    max_request_size: usize,
    csr: [u32; CSR_WORDS],
}

impl Device {
    /// Wraps a freshly enumerated native handle, caching its immutable
    /// metadata. The metadata never changes for the life of the handle, so it
    /// is queried exactly once here.
    pub(crate) fn new(bus: Rc<BusCore>, handle: DevHandle) -> Self {
        let driver = bus.driver();
        let mut csr = [0u32; CSR_WORDS];
        driver.device_csr(handle, &mut csr);
        let device = Device {
            node_id: driver.device_node_id(handle),
            guid: driver.device_guid(handle),
            vendor_name: driver.device_vendor_name(handle),
            vendor_id: driver.device_vendor_id(handle),
            product_name: driver.device_product_name(handle),
            product_id: driver.device_product_id(handle),
            max_request_size: driver.device_request_size(handle),
            csr,
            state: Rc::new(DeviceState::default()),
            bus,
            handle,
        };
        debug_assert!(device.max_request_size.is_power_of_two());
        device
    }

    pub(crate) fn state(&self) -> &Rc<DeviceState> {
        &self.state
    }

    fn driver(&self) -> &dyn NativeDriver {
        self.bus.driver()
    }

    fn ensure_fresh(&self) -> Result<()> {
        if self.state.stale.get() {
            Err(Error::StaleHandle)
        } else {
            Ok(())
        }
    }

    /// Fails fast on the caller contract for I/O: the device must be open and
    /// non-stale. Staleness is a typed error; not-open is a precondition
    /// violation (callers are required to check [`is_open`](Self::is_open)
    /// first) and panics.
    fn ensure_transferable(&self, op: &'static str) -> Result<()> {
        self.ensure_fresh()?;
        assert!(
            self.state.open.get(),
            "{op} on a device that is not open; call open() first"
        );
        Ok(())
    }

    /// Node address on the bus.
    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    /// 48-bit globally unique identifier, in the low bits.
    pub fn guid(&self) -> u64 {
        self.guid
    }

    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    pub fn vendor_id(&self) -> i32 {
        self.vendor_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn product_id(&self) -> i32 {
        self.product_id
    }

    /// Maximum single native transfer in bytes (a power of two). Larger
    /// requests are transparently split into chunks of at most this size.
    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    /// The device's configuration status block, captured at discovery.
    /// Opaque at this layer.
    pub fn csr(&self) -> &[u32; CSR_WORDS] {
        &self.csr
    }

    /// True once a later enumeration on the owning bus has invalidated this
    /// handle. Stale is terminal.
    pub fn is_stale(&self) -> bool {
        self.state.stale.get()
    }

    /// Whether the device is open for transfer. Unconditionally false for a
    /// stale device, without a native call.
    pub fn is_open(&self) -> bool {
        !self.state.stale.get() && self.driver().device_is_open(self.handle)
    }

    /// Opens the device for I/O.
    ///
    /// Distinguishes a bus reset (recoverable after re-enumeration) from
    /// other native failures.
    pub fn open(&mut self) -> Result<()> {
        self.ensure_fresh()?;
        let code = self.driver().device_open(self.handle);
        translate("open_device", code, |c| self.driver().result_str(c))?;
        self.state.open.set(true);
        debug!(guid = self.guid, "opened device");
        Ok(())
    }

    /// Closes the device. A no-op on a stale device (the native handle may
    /// already be gone); otherwise calls native close unconditionally, which
    /// is idempotent at the native layer.
    pub fn close(&mut self) {
        if self.state.stale.get() {
            return;
        }
        let code = self.driver().device_close(self.handle);
        if code != 0 {
            debug!(guid = self.guid, code, "native close reported failure");
        }
        self.state.open.set(false);
    }

    /// Reads `len` bytes starting at device address `addr`.
    ///
    /// The request is split into chunks of at most
    /// [`max_request_size`](Self::max_request_size) and submitted as one
    /// vectorized native call; the result is a single contiguous buffer of
    /// exactly `len` bytes. A zero-length read is a no-op returning an empty
    /// buffer without any native call.
    ///
    /// # Panics
    ///
    /// If the device is not open. Check [`is_open`](Self::is_open) first;
    /// this is a caller contract, not a recoverable error.
    pub fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        self.ensure_transferable("read")?;
        let plan = TransferPlan::contiguous(addr, len, self.max_request_size)?;
        self.submit_read(plan)
    }

    /// Reads several independent address ranges as one logical operation.
    ///
    /// Each element is capped to the max request size by the same
    /// decomposition as [`read`](Self::read); all resulting chunks are
    /// submitted in request order as a single vectorized native call. Results
    /// come back in input order. A failure aborts the whole batch: the native
    /// layer does not report partial completion.
    ///
    /// Zero-length elements yield empty regions, and an all-empty batch
    /// issues no native call.
    ///
    /// # Panics
    ///
    /// If the device is not open (see [`read`](Self::read)).
    pub fn read_batch(&self, requests: &[(u64, usize)]) -> Result<ReadBatch> {
        self.ensure_transferable("read_batch")?;
        let mut plan = TransferPlan::new();
        for &(addr, len) in requests {
            plan.push(addr, len, self.max_request_size)?;
        }
        let spans = std::mem::take(&mut plan.spans);
        let buf = self.submit_read(plan)?;
        Ok(ReadBatch {
            buf: buf.into(),
            spans: spans.into_iter(),
        })
    }

    /// Writes `data` to the device starting at address `addr`, chunked and
    /// vectorized exactly like [`read`](Self::read). A zero-length write is a
    /// no-op.
    ///
    /// # Panics
    ///
    /// If the device is not open (see [`read`](Self::read)).
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        self.write_batch(&[(addr, data)])
    }

    /// Writes several independent address ranges as one logical operation,
    /// with the same batching rules as [`read_batch`](Self::read_batch).
    ///
    /// # Panics
    ///
    /// If the device is not open (see [`read`](Self::read)).
    pub fn write_batch(&mut self, requests: &[(u64, &[u8])]) -> Result<()> {
        self.ensure_transferable("write_batch")?;
        let mut plan = TransferPlan::new();
        let mut buf = Vec::with_capacity(requests.iter().map(|(_, d)| d.len()).sum());
        for &(addr, data) in requests {
            plan.push(addr, data.len(), self.max_request_size)?;
            buf.extend_from_slice(data);
        }
        if plan.is_empty() {
            return Ok(());
        }
        let mut reqs = native_requests(&plan, buf.as_mut_ptr());
        trace!(
            guid = self.guid,
            chunks = reqs.len(),
            bytes = plan.total_len,
            "submitting vectorized write"
        );
        let code = self.driver().write_device_v(self.handle, &mut reqs);
        translate("write_device_v", code, |c| self.driver().result_str(c))
    }

    /// Issues a planned read as one vectorized native call and returns the
    /// filled shared buffer.
    fn submit_read(&self, plan: TransferPlan) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; plan.total_len];
        if plan.is_empty() {
            return Ok(buf);
        }
        let mut reqs = native_requests(&plan, buf.as_mut_ptr());
        trace!(
            guid = self.guid,
            chunks = reqs.len(),
            bytes = plan.total_len,
            "submitting vectorized read"
        );
        let code = self.driver().read_device_v(self.handle, &mut reqs);
        translate("read_device_v", code, |c| self.driver().result_str(c))?;
        Ok(buf)
    }
}

/// Materialises a plan as the native record array over `buf`, preserving
/// chunk order.
fn native_requests(plan: &TransferPlan, buf: *mut u8) -> Vec<NativeRequest> {
    plan.chunks
        .iter()
        .map(|chunk| NativeRequest {
            addr: chunk.addr,
            len: chunk.len,
            // In bounds: the planner never produces an offset past total_len.
            buf: buf.wrapping_add(chunk.buf_offset),
        })
        .collect()
}

impl Drop for Device {
    fn drop(&mut self) {
        // Never touch the native handle of a stale device; the enumeration
        // that staled it may have freed the handle already.
        if !self.state.stale.get() && self.state.open.get() {
            self.close();
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("node_id", &self.node_id)
            .field("guid", &format_args!("{:#014x}", self.guid))
            .field("vendor", &self.vendor_name)
            .field("product", &self.product_name)
            .field("max_request_size", &self.max_request_size)
            .field("open", &self.state.open.get())
            .field("stale", &self.state.stale.get())
            .finish()
    }
}

/// Results of a successful [`Device::read_batch`], in request order.
///
/// The iterator is consumed once and performs no native calls: every
/// [`ReadRegion`] shares the single transfer buffer the batch was read into,
/// so iteration is zero-copy.
#[derive(Debug)]
pub struct ReadBatch {
    buf: Rc<[u8]>,
    spans: std::vec::IntoIter<(u64, Range<usize>)>,
}

impl Iterator for ReadBatch {
    type Item = ReadRegion;

    fn next(&mut self) -> Option<ReadRegion> {
        let (addr, range) = self.spans.next()?;
        Some(ReadRegion {
            addr,
            range,
            buf: Rc::clone(&self.buf),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.spans.size_hint()
    }
}

impl ExactSizeIterator for ReadBatch {}

/// One address range read by a batch: the requested device address and the
/// bytes that came back.
#[derive(Debug, Clone)]
pub struct ReadRegion {
    addr: u64,
    range: Range<usize>,
    buf: Rc<[u8]>,
}

impl ReadRegion {
    /// Device address the region was read from.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

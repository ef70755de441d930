//! The fixed native call surface this binding is built on.
//!
//! The wire protocol itself (bus transactions, SBP-2 negotiation, CSR
//! parsing) lives in a lower-level native transport. This module describes
//! that transport as the [`NativeDriver`] trait so the request-shaping and
//! lifecycle layer above it can run against the real shared library
//! (`ffi::SystemDriver`, behind the `system-driver` feature) or the
//! in-memory simulation ([`sim::SimDriver`](crate::sim::SimDriver)).

/// Opaque handle to a native bus resource.
///
/// Valid from `bus_alloc` until `bus_destroy`. The raw value is meaningful
/// only to the driver that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusHandle(usize);

impl BusHandle {
    pub fn from_raw(raw: usize) -> Self {
        BusHandle(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Opaque handle to a native device resource.
///
/// Handles are owned by the native layer: a successful `get_devices` call (or
/// `bus_destroy`) frees or renumbers every handle returned by the previous
/// enumeration. The binding must therefore never touch a handle after its bus
/// has re-enumerated; [`Bus::devices`](crate::Bus::devices) enforces this by
/// marking the corresponding [`Device`](crate::Device)s stale first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevHandle(usize);

impl DevHandle {
    pub fn from_raw(raw: usize) -> Self {
        DevHandle(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// One element of a vectorized transfer, in the native record layout: a
/// 64-bit device address, a platform-width length, and a raw pointer into the
/// transfer buffer. An N-element batch is submitted as N of these records in
/// one native call.
#[repr(C)]
#[derive(Debug)]
pub struct NativeRequest {
    pub addr: u64,
    pub len: usize,
    pub buf: *mut u8,
}

/// Number of 32-bit words in a device's configuration status block.
pub const CSR_WORDS: usize = 256;

/// The native call surface, one method per entry point.
///
/// Methods mirror the native ABI: fallible calls return the raw signed result
/// code (zero success, negative failure) and leave translation to the caller.
/// Implementations are free to assume single-threaded, blocking use; the
/// binding performs no internal locking.
pub trait NativeDriver {
    /// Allocates the native bus resource. `None` if the native layer cannot
    /// allocate.
    fn bus_alloc(&self) -> Option<BusHandle>;

    /// Releases the native bus resource, freeing every device handle derived
    /// from it.
    fn bus_destroy(&self, bus: BusHandle);

    /// Asks the native layer to present attached storage-class targets under
    /// an SBP-2 unit directory so their address space becomes accessible.
    fn enable_sbp2(&self, bus: BusHandle) -> i32;

    /// Requeries the devices attached to the bus.
    ///
    /// `Err` carries the negative result code the native layer reports
    /// through the count field. A successful call invalidates every handle
    /// returned by the previous one.
    fn get_devices(&self, bus: BusHandle) -> Result<Vec<DevHandle>, i32>;

    fn device_open(&self, dev: DevHandle) -> i32;
    fn device_close(&self, dev: DevHandle) -> i32;
    fn device_is_open(&self, dev: DevHandle) -> bool;

    /// Submits one vectorized read. Every record's `buf` must point at `len`
    /// writable bytes for the duration of the call. The whole batch reports a
    /// single result code; partial completion is not observable.
    fn read_device_v(&self, dev: DevHandle, reqs: &mut [NativeRequest]) -> i32;

    /// Submits one vectorized write. Every record's `buf` must point at `len`
    /// readable bytes for the duration of the call.
    fn write_device_v(&self, dev: DevHandle, reqs: &mut [NativeRequest]) -> i32;

    fn device_node_id(&self, dev: DevHandle) -> u16;

    /// 48-bit globally unique identifier, in the low bits.
    fn device_guid(&self, dev: DevHandle) -> u64;

    fn device_vendor_name(&self, dev: DevHandle) -> String;
    fn device_vendor_id(&self, dev: DevHandle) -> i32;
    fn device_product_name(&self, dev: DevHandle) -> String;
    fn device_product_id(&self, dev: DevHandle) -> i32;

    /// Maximum single-request transfer size in bytes. Always a power of two,
    /// fixed for the life of the handle.
    fn device_request_size(&self, dev: DevHandle) -> usize;

    /// Copies the device's configuration status block into `rom`. Opaque to
    /// this layer.
    fn device_csr(&self, dev: DevHandle, rom: &mut [u32; CSR_WORDS]);

    /// Resolves a result code to the native human-readable diagnostic.
    fn result_str(&self, code: i32) -> String;
}

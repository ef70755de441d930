//! In-memory simulation of the native FireWire stack.
//!
//! [`SimDriver`] implements [`NativeDriver`] entirely in host memory:
//! simulated devices expose a byte-addressable memory image, enumeration
//! frees and renumbers handles exactly like the real native layer, and
//! faults (bus reset, permission denial, timeouts) can be scripted. It backs
//! the crate's integration tests and lets downstream code be developed
//! without FireWire hardware.
//!
//! The simulator is deliberately strict about handle lifetimes: any native
//! call against a handle freed by a later enumeration (or by bus destroy)
//! panics, turning a would-be use-after-free at the real native layer into a
//! loud test failure.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::ResultCode;
use crate::sys::{BusHandle, DevHandle, NativeDriver, NativeRequest, CSR_WORDS};

/// Identity and geometry of one simulated device.
#[derive(Debug, Clone)]
pub struct SimDeviceConfig {
    pub node_id: u16,
    /// 48-bit GUID, in the low bits. Also the key for the memory helpers on
    /// [`SimDriver`].
    pub guid: u64,
    pub vendor_name: String,
    pub vendor_id: i32,
    pub product_name: String,
    pub product_id: i32,
    /// Maximum single-request transfer size; must be a power of two.
    pub max_request_size: usize,
    /// Size of the simulated memory image in bytes.
    pub memory_size: usize,
    pub csr: [u32; CSR_WORDS],
}

impl Default for SimDeviceConfig {
    fn default() -> Self {
        SimDeviceConfig {
            node_id: 1,
            guid: 0x0050_c500_1234,
            vendor_name: "SimVendor".to_owned(),
            vendor_id: 0x50c5,
            product_name: "SimTarget".to_owned(),
            product_id: 0x0001,
            max_request_size: 2048,
            memory_size: 1 << 20,
            csr: [0; CSR_WORDS],
        }
    }
}

/// Direction of one logged vectorized call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimIo {
    Read,
    Write,
}

/// One simulated physical device. Its memory persists across enumerations,
/// the way a real target's does; only the handles are renumbered.
struct SimNode {
    config: SimDeviceConfig,
    memory: Vec<u8>,
}

struct HandleSlot {
    node: usize,
    open: bool,
    freed: bool,
}

#[derive(Default)]
struct SimState {
    nodes: Vec<SimNode>,
    handles: Vec<HandleSlot>,
    buses: usize,
    sbp2_calls: usize,
    deny_next_enumeration: bool,
    injected: VecDeque<ResultCode>,
    io_log: Vec<(SimIo, Vec<(u64, usize)>)>,
}

/// An in-memory [`NativeDriver`].
///
/// Construct one, [`attach`](SimDriver::attach) devices, then hand it to
/// [`Bus::with_driver`](crate::Bus::with_driver) behind an `Rc`. Keeping a
/// typed clone of the `Rc` lets tests script faults and inspect device
/// memory while the bus is live.
#[derive(Default)]
pub struct SimDriver {
    state: RefCell<SimState>,
}

impl SimDriver {
    pub fn new() -> Self {
        SimDriver::default()
    }

    /// Attaches a simulated device; it will appear on the next enumeration.
    /// Its memory image starts zeroed at the configured size.
    pub fn attach(&self, config: SimDeviceConfig) {
        assert!(config.max_request_size.is_power_of_two());
        let memory = vec![0u8; config.memory_size];
        self.state.borrow_mut().nodes.push(SimNode { config, memory });
    }

    /// Detaches the device with the given GUID; it will vanish from the next
    /// enumeration. Returns false if no such device is attached.
    pub fn detach(&self, guid: u64) -> bool {
        let mut state = self.state.borrow_mut();
        match state.nodes.iter().position(|n| n.config.guid == guid) {
            Some(idx) => {
                state.nodes.remove(idx);
                // Handle slots referencing later nodes shift down with them.
                for slot in &mut state.handles {
                    if slot.node > idx {
                        slot.node -= 1;
                    } else if slot.node == idx {
                        slot.freed = true;
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Fills device memory starting at `addr`. Panics on an unknown GUID or
    /// an out-of-range write; this is a test fixture, not an I/O path.
    pub fn load_memory(&self, guid: u64, addr: u64, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let node = state
            .nodes
            .iter_mut()
            .find(|n| n.config.guid == guid)
            .unwrap_or_else(|| panic!("no simulated device with guid {guid:#x}"));
        let start = usize::try_from(addr).expect("address beyond simulated memory");
        node.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Returns a copy of `len` bytes of device memory starting at `addr`.
    pub fn snapshot(&self, guid: u64, addr: u64, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let node = state
            .nodes
            .iter()
            .find(|n| n.config.guid == guid)
            .unwrap_or_else(|| panic!("no simulated device with guid {guid:#x}"));
        let start = usize::try_from(addr).expect("address beyond simulated memory");
        node.memory[start..start + len].to_vec()
    }

    /// Makes the next enumeration fail with the permission-denied code.
    pub fn deny_next_enumeration(&self) {
        self.state.borrow_mut().deny_next_enumeration = true;
    }

    /// Queues a result code to be returned by the next fallible native call
    /// (SBP-2 enablement, device open, or a vectorized transfer).
    pub fn inject_fault(&self, code: ResultCode) {
        self.state.borrow_mut().injected.push_back(code);
    }

    /// Every vectorized call issued so far, as (direction, chunk list) in
    /// submission order. Chunk lists preserve the order of the native record
    /// array.
    pub fn io_log(&self) -> Vec<(SimIo, Vec<(u64, usize)>)> {
        self.state.borrow().io_log.clone()
    }

    /// How many times SBP-2 enablement reached the (simulated) native layer.
    pub fn sbp2_calls(&self) -> usize {
        self.state.borrow().sbp2_calls
    }

    fn take_fault(state: &mut SimState) -> Option<i32> {
        state.injected.pop_front().map(ResultCode::as_raw)
    }

    /// Resolves a handle, panicking on use-after-free: the binding must never
    /// let a freed native handle reach the driver.
    fn slot<'a>(state: &'a mut SimState, dev: DevHandle) -> &'a mut HandleSlot {
        let slot = state
            .handles
            .get_mut(dev.as_raw())
            .expect("unknown native device handle");
        assert!(
            !slot.freed,
            "use of a native device handle freed by a later enumeration"
        );
        slot
    }

    fn transfer(&self, dev: DevHandle, reqs: &mut [NativeRequest], dir: SimIo) -> i32 {
        let mut state = self.state.borrow_mut();
        if let Some(code) = Self::take_fault(&mut state) {
            return code;
        }
        let node_idx = Self::slot(&mut state, dev).node;
        state
            .io_log
            .push((dir, reqs.iter().map(|r| (r.addr, r.len)).collect()));

        let node = &mut state.nodes[node_idx];
        for req in reqs {
            if req.len > node.config.max_request_size {
                return ResultCode::SizeViolation.as_raw();
            }
            let Some(end) = req.addr.checked_add(req.len as u64) else {
                return ResultCode::Io.as_raw();
            };
            if end > node.memory.len() as u64 {
                return ResultCode::Io.as_raw();
            }
            let start = req.addr as usize;
            // Per the native record contract, `buf` points at `len` valid
            // bytes for the duration of the call.
            let host = unsafe { std::slice::from_raw_parts_mut(req.buf, req.len) };
            match dir {
                SimIo::Read => host.copy_from_slice(&node.memory[start..start + req.len]),
                SimIo::Write => node.memory[start..start + req.len].copy_from_slice(host),
            }
        }
        ResultCode::Success.as_raw()
    }
}

impl NativeDriver for SimDriver {
    fn bus_alloc(&self) -> Option<BusHandle> {
        let mut state = self.state.borrow_mut();
        state.buses += 1;
        Some(BusHandle::from_raw(state.buses))
    }

    fn bus_destroy(&self, _bus: BusHandle) {
        let mut state = self.state.borrow_mut();
        for slot in &mut state.handles {
            slot.freed = true;
        }
    }

    fn enable_sbp2(&self, _bus: BusHandle) -> i32 {
        let mut state = self.state.borrow_mut();
        if let Some(code) = Self::take_fault(&mut state) {
            return code;
        }
        state.sbp2_calls += 1;
        ResultCode::Success.as_raw()
    }

    fn get_devices(&self, _bus: BusHandle) -> Result<Vec<DevHandle>, i32> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.deny_next_enumeration) {
            return Err(ResultCode::NoPermission.as_raw());
        }

        // The native layer frees every handle from the previous enumeration
        // before producing the new list.
        for slot in &mut state.handles {
            slot.freed = true;
        }

        let mut fresh = Vec::with_capacity(state.nodes.len());
        for node_idx in 0..state.nodes.len() {
            let raw = state.handles.len();
            state.handles.push(HandleSlot {
                node: node_idx,
                open: false,
                freed: false,
            });
            fresh.push(DevHandle::from_raw(raw));
        }
        Ok(fresh)
    }

    fn device_open(&self, dev: DevHandle) -> i32 {
        let mut state = self.state.borrow_mut();
        if let Some(code) = Self::take_fault(&mut state) {
            return code;
        }
        Self::slot(&mut state, dev).open = true;
        ResultCode::Success.as_raw()
    }

    fn device_close(&self, dev: DevHandle) -> i32 {
        let mut state = self.state.borrow_mut();
        Self::slot(&mut state, dev).open = false;
        ResultCode::Success.as_raw()
    }

    fn device_is_open(&self, dev: DevHandle) -> bool {
        let mut state = self.state.borrow_mut();
        Self::slot(&mut state, dev).open
    }

    fn read_device_v(&self, dev: DevHandle, reqs: &mut [NativeRequest]) -> i32 {
        self.transfer(dev, reqs, SimIo::Read)
    }

    fn write_device_v(&self, dev: DevHandle, reqs: &mut [NativeRequest]) -> i32 {
        self.transfer(dev, reqs, SimIo::Write)
    }

    fn device_node_id(&self, dev: DevHandle) -> u16 {
        self.with_config(dev, |c| c.node_id)
    }

    fn device_guid(&self, dev: DevHandle) -> u64 {
        self.with_config(dev, |c| c.guid)
    }

    fn device_vendor_name(&self, dev: DevHandle) -> String {
        self.with_config(dev, |c| c.vendor_name.clone())
    }

    fn device_vendor_id(&self, dev: DevHandle) -> i32 {
        self.with_config(dev, |c| c.vendor_id)
    }

    fn device_product_name(&self, dev: DevHandle) -> String {
        self.with_config(dev, |c| c.product_name.clone())
    }

    fn device_product_id(&self, dev: DevHandle) -> i32 {
        self.with_config(dev, |c| c.product_id)
    }

    fn device_request_size(&self, dev: DevHandle) -> usize {
        self.with_config(dev, |c| c.max_request_size)
    }

    fn device_csr(&self, dev: DevHandle, rom: &mut [u32; CSR_WORDS]) {
        *rom = self.with_config(dev, |c| c.csr);
    }

    fn result_str(&self, code: i32) -> String {
        let text = match ResultCode::from_raw(code) {
            ResultCode::Success => "success",
            ResultCode::BusReset => "bus reset in progress",
            ResultCode::NoPermission => "permission denied",
            ResultCode::Busy => "device busy",
            ResultCode::Io => "I/O error",
            ResultCode::SizeViolation => "request size violation",
            ResultCode::Timeout => "I/O timeout",
            ResultCode::Other => "unspecified failure",
        };
        text.to_owned()
    }
}

impl SimDriver {
    fn with_config<T>(&self, dev: DevHandle, f: impl FnOnce(&SimDeviceConfig) -> T) -> T {
        let mut state = self.state.borrow_mut();
        let node_idx = Self::slot(&mut state, dev).node;
        f(&state.nodes[node_idx].config)
    }
}

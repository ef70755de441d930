//! Bindings to the system `forensic1394` shared library.
//!
//! Compiled only with the `system-driver` cargo feature, so the default
//! build never needs the native library present. The extern block declares
//! the full native surface, including the single (non-vectorized) transfer
//! entry points; [`SystemDriver`] routes all I/O through the vectorized
//! forms, which is what the request-shaping layer submits.

use std::ffi::{c_char, c_int, c_void, CStr};

use crate::sys::{BusHandle, DevHandle, NativeDriver, NativeRequest, CSR_WORDS};

/// Per-device destruction callback accepted by `forensic1394_get_devices`.
/// This binding always passes `None`; invalidation is handled host-side.
type DeviceCallback = Option<unsafe extern "C" fn(bus: *mut c_void, dev: *mut c_void)>;

#[link(name = "forensic1394")]
extern "C" {
    fn forensic1394_alloc() -> *mut c_void;
    fn forensic1394_destroy(bus: *mut c_void);
    fn forensic1394_enable_sbp2(bus: *mut c_void) -> c_int;
    fn forensic1394_get_devices(
        bus: *mut c_void,
        ndev: *mut c_int,
        ondestroy: DeviceCallback,
    ) -> *mut *mut c_void;

    fn forensic1394_open_device(dev: *mut c_void) -> c_int;
    fn forensic1394_close_device(dev: *mut c_void) -> c_int;
    fn forensic1394_is_device_open(dev: *mut c_void) -> c_int;

    #[allow(dead_code)]
    fn forensic1394_read_device(dev: *mut c_void, addr: u64, len: usize, buf: *mut c_void)
        -> c_int;
    fn forensic1394_read_device_v(dev: *mut c_void, req: *mut NativeRequest, nreq: usize)
        -> c_int;
    #[allow(dead_code)]
    fn forensic1394_write_device(
        dev: *mut c_void,
        addr: u64,
        len: usize,
        buf: *mut c_void,
    ) -> c_int;
    fn forensic1394_write_device_v(dev: *mut c_void, req: *mut NativeRequest, nreq: usize)
        -> c_int;

    fn forensic1394_get_device_csr(dev: *mut c_void, rom: *mut u32);
    fn forensic1394_get_device_nodeid(dev: *mut c_void) -> u16;
    fn forensic1394_get_device_guid(dev: *mut c_void) -> i64;
    fn forensic1394_get_device_product_name(dev: *mut c_void) -> *const c_char;
    fn forensic1394_get_device_product_id(dev: *mut c_void) -> c_int;
    fn forensic1394_get_device_vendor_name(dev: *mut c_void) -> *const c_char;
    fn forensic1394_get_device_vendor_id(dev: *mut c_void) -> c_int;
    fn forensic1394_get_device_request_size(dev: *mut c_void) -> usize;

    fn forensic1394_get_result_str(result: c_int) -> *const c_char;
}

fn bus_ptr(bus: BusHandle) -> *mut c_void {
    bus.as_raw() as *mut c_void
}

fn dev_ptr(dev: DevHandle) -> *mut c_void {
    dev.as_raw() as *mut c_void
}

fn owned_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// [`NativeDriver`] over the system `forensic1394` shared library.
///
/// Handles are the native pointers themselves; all validity rules of the
/// native layer apply (and are upheld by [`Bus`](crate::Bus) and
/// [`Device`](crate::Device), which never use a handle past the enumeration
/// that invalidated it).
pub struct SystemDriver;

impl NativeDriver for SystemDriver {
    fn bus_alloc(&self) -> Option<BusHandle> {
        let ptr = unsafe { forensic1394_alloc() };
        if ptr.is_null() {
            None
        } else {
            Some(BusHandle::from_raw(ptr as usize))
        }
    }

    fn bus_destroy(&self, bus: BusHandle) {
        unsafe { forensic1394_destroy(bus_ptr(bus)) }
    }

    fn enable_sbp2(&self, bus: BusHandle) -> i32 {
        unsafe { forensic1394_enable_sbp2(bus_ptr(bus)) }
    }

    fn get_devices(&self, bus: BusHandle) -> Result<Vec<DevHandle>, i32> {
        let mut ndev: c_int = 0;
        let list = unsafe { forensic1394_get_devices(bus_ptr(bus), &mut ndev, None) };
        if ndev < 0 {
            return Err(ndev);
        }
        if list.is_null() {
            return Ok(Vec::new());
        }
        let mut handles = Vec::with_capacity(ndev as usize);
        for i in 0..ndev as usize {
            let dev = unsafe { *list.add(i) };
            handles.push(DevHandle::from_raw(dev as usize));
        }
        Ok(handles)
    }

    fn device_open(&self, dev: DevHandle) -> i32 {
        unsafe { forensic1394_open_device(dev_ptr(dev)) }
    }

    fn device_close(&self, dev: DevHandle) -> i32 {
        unsafe { forensic1394_close_device(dev_ptr(dev)) }
    }

    fn device_is_open(&self, dev: DevHandle) -> bool {
        unsafe { forensic1394_is_device_open(dev_ptr(dev)) != 0 }
    }

    fn read_device_v(&self, dev: DevHandle, reqs: &mut [NativeRequest]) -> i32 {
        unsafe { forensic1394_read_device_v(dev_ptr(dev), reqs.as_mut_ptr(), reqs.len()) }
    }

    fn write_device_v(&self, dev: DevHandle, reqs: &mut [NativeRequest]) -> i32 {
        unsafe { forensic1394_write_device_v(dev_ptr(dev), reqs.as_mut_ptr(), reqs.len()) }
    }

    fn device_node_id(&self, dev: DevHandle) -> u16 {
        unsafe { forensic1394_get_device_nodeid(dev_ptr(dev)) }
    }

    fn device_guid(&self, dev: DevHandle) -> u64 {
        unsafe { forensic1394_get_device_guid(dev_ptr(dev)) as u64 }
    }

    fn device_vendor_name(&self, dev: DevHandle) -> String {
        owned_str(unsafe { forensic1394_get_device_vendor_name(dev_ptr(dev)) })
    }

    fn device_vendor_id(&self, dev: DevHandle) -> i32 {
        unsafe { forensic1394_get_device_vendor_id(dev_ptr(dev)) }
    }

    fn device_product_name(&self, dev: DevHandle) -> String {
        owned_str(unsafe { forensic1394_get_device_product_name(dev_ptr(dev)) })
    }

    fn device_product_id(&self, dev: DevHandle) -> i32 {
        unsafe { forensic1394_get_device_product_id(dev_ptr(dev)) }
    }

    fn device_request_size(&self, dev: DevHandle) -> usize {
        unsafe { forensic1394_get_device_request_size(dev_ptr(dev)) }
    }

    fn device_csr(&self, dev: DevHandle, rom: &mut [u32; CSR_WORDS]) {
        unsafe { forensic1394_get_device_csr(dev_ptr(dev), rom.as_mut_ptr()) }
    }

    fn result_str(&self, code: i32) -> String {
        owned_str(unsafe { forensic1394_get_result_str(code) })
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Signed result code reported by every native call.
///
/// Zero is success; the negative values form a closed taxonomy taken from the
/// native header. Codes this binding does not recognise fold to
/// [`ResultCode::Other`] rather than being interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    Other,
    BusReset,
    NoPermission,
    Busy,
    Io,
    SizeViolation,
    Timeout,
}

impl ResultCode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ResultCode::Success,
            -2 => ResultCode::BusReset,
            -3 => ResultCode::NoPermission,
            -4 => ResultCode::Busy,
            -5 => ResultCode::Io,
            -6 => ResultCode::SizeViolation,
            -7 => ResultCode::Timeout,
            _ => ResultCode::Other,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::Other => -1,
            ResultCode::BusReset => -2,
            ResultCode::NoPermission => -3,
            ResultCode::Busy => -4,
            ResultCode::Io => -5,
            ResultCode::SizeViolation => -6,
            ResultCode::Timeout => -7,
        }
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

/// Typed failure surfaced to callers of [`Bus`](crate::Bus) and
/// [`Device`](crate::Device) operations.
///
/// Only [`Error::BusReset`] is recoverable: the bus topology changed under the
/// operation, and re-enumerating via [`Bus::devices`](crate::Bus::devices)
/// makes I/O possible again. Everything else is terminal for the request.
#[derive(Debug, Error)]
pub enum Error {
    /// The native layer refused device enumeration. Typically the process
    /// lacks the privileges required to open the raw bus nodes.
    #[error("permission denied while enumerating bus devices")]
    PermissionDenied,

    /// A bus reset was detected mid-operation. The caller must re-enumerate
    /// devices before retrying any I/O; previously held handles are stale.
    #[error("bus reset during {op}: topology changed, re-enumerate before retrying")]
    BusReset { op: &'static str },

    /// The device handle was invalidated by a later enumeration on its bus.
    #[error("stale device handle: the bus has been re-enumerated since this device was returned")]
    StaleHandle,

    /// `addr + len` does not fit in the 64-bit device address space. Detected
    /// host-side; no native call is issued.
    #[error("transfer of {len} bytes at {addr:#x} overflows the 64-bit address space")]
    AddressOverflow { addr: u64, len: usize },

    /// The native layer rejected a request for exceeding the device's
    /// maximum transfer size.
    #[error("{op}: request exceeds the device's maximum transfer size")]
    RequestTooLarge { op: &'static str },

    /// The native transfer timed out.
    #[error("{op}: native I/O timeout")]
    Timeout { op: &'static str },

    /// Generic native failure, carrying the failed operation and the
    /// diagnostic string looked up from the native layer.
    #[error("{op} failed: {detail}")]
    DeviceIo { op: &'static str, detail: String },
}

impl Error {
    /// True when retrying after [`Bus::devices`](crate::Bus::devices) can
    /// succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::BusReset { .. })
    }
}

/// Maps a non-success native result code to a typed [`Error`].
///
/// `lookup` resolves a code to the native diagnostic string and is only
/// invoked for codes without a dedicated variant.
pub(crate) fn failure(
    op: &'static str,
    code: i32,
    lookup: impl FnOnce(i32) -> String,
) -> Error {
    debug_assert_ne!(code, 0, "failure() called with a success code");
    match ResultCode::from_raw(code) {
        ResultCode::BusReset => Error::BusReset { op },
        ResultCode::SizeViolation => Error::RequestTooLarge { op },
        ResultCode::Timeout => Error::Timeout { op },
        _ => Error::DeviceIo {
            op,
            detail: lookup(code),
        },
    }
}

/// Translates a raw native result code into `Ok(())` or a typed [`Error`].
pub(crate) fn translate(
    op: &'static str,
    code: i32,
    lookup: impl FnOnce(i32) -> String,
) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(failure(op, code, lookup))
    }
}

//! Transfer planning: decomposes contiguous and scatter/gather requests into
//! native-sized chunks over one shared buffer.
//!
//! This is pure request shaping; nothing here touches the native layer. The
//! planner's output order is load-bearing: chunks are submitted to the native
//! layer in exactly the order produced, and reassembly relies on request
//! order matching buffer-offset order.

use std::ops::Range;

use crate::error::{Error, Result};

/// One bounded native request within a larger transfer: `len` bytes at device
/// address `addr`, backed by `buf_offset..buf_offset + len` of the shared
/// transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub addr: u64,
    pub len: usize,
    pub buf_offset: usize,
}

/// A planned vectorized transfer.
///
/// `chunks` is the full submission sequence for the call; `spans` records the
/// slice of the shared buffer each batch element occupies, in request order,
/// so batch reads can hand regions back without re-deriving offsets.
#[derive(Debug, Default)]
pub(crate) struct TransferPlan {
    pub chunks: Vec<Chunk>,
    pub spans: Vec<(u64, Range<usize>)>,
    pub total_len: usize,
}

impl TransferPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans a single contiguous transfer.
    pub fn contiguous(addr: u64, len: usize, max_request: usize) -> Result<Self> {
        let mut plan = Self::new();
        plan.push(addr, len, max_request)?;
        Ok(plan)
    }

    /// Appends one batch element, splitting it into chunks of at most
    /// `max_request` bytes in address-ascending order.
    ///
    /// A zero-length element contributes an empty span and no chunks.
    pub fn push(&mut self, addr: u64, len: usize, max_request: usize) -> Result<()> {
        debug_assert!(max_request.is_power_of_two());

        // Reject rather than wrap: a request running off the end of the
        // 64-bit address space is a caller bug, never a real transfer.
        addr.checked_add(len as u64)
            .ok_or(Error::AddressOverflow { addr, len })?;

        let start = self.total_len;
        let mut done = 0usize;
        while done < len {
            let n = max_request.min(len - done);
            self.chunks.push(Chunk {
                addr: addr + done as u64,
                len: n,
                buf_offset: start + done,
            });
            done += n;
        }
        self.total_len = start + len;
        self.spans.push((addr, start..self.total_len));
        Ok(())
    }

    /// True when the plan requires no native call at all.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

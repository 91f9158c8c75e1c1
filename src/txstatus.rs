//! TX status aggregation.
//!
//! Every completed frame produces one two-byte status record. Sending each
//! record to the host on its own would drown the transport in tiny
//! responses, so records are collected in a fixed ring and spliced together
//! into batched responses: eagerly when the ring runs full, and once per
//! main-loop tick from the janitor.

use bitfield_struct::bitfield;

use crate::config::TX_STATUS_NUM;
use crate::hostif::{HostTransport, ResponseTag};

/// One status record, packed as it goes over the wire.
#[bitfield(u16)]
pub struct TxStatus {
    #[bits(8)]
    pub cookie: u8,
    #[bits(2)]
    pub queue: u8,
    /// Rate ladder index the frame ended on.
    #[bits(2)]
    pub rix: u8,
    /// Tries at that rate.
    #[bits(3)]
    pub tries: u8,
    pub success: bool,
}

pub struct TxStatusCache {
    cache: [TxStatus; TX_STATUS_NUM],
    pending: usize,
    head: usize,
    tail: usize,
}

impl TxStatusCache {
    pub const fn new() -> Self {
        Self {
            cache: [TxStatus::new(); TX_STATUS_NUM],
            pending: 0,
            head: 0,
            tail: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Buffer one record. If the ring is full the whole backlog is flushed
    /// first, so the oldest record still reaches the host before its slot is
    /// overwritten.
    pub fn push<H: HostTransport>(&mut self, host: &mut H, status: TxStatus) {
        let slot = self.tail;
        self.tail = (self.tail + 1) % TX_STATUS_NUM;

        if self.pending == TX_STATUS_NUM {
            self.flush(host);
        }

        self.cache[slot] = status;
        self.pending += 1;
    }

    /// Send everything buffered. Records are spliced together rather than
    /// copied one by one, so a batch never crosses the ring wrap point; a
    /// wrapped backlog simply goes out as two responses. Response payloads
    /// are padded to a multiple of 4 bytes.
    pub fn flush<H: HostTransport>(&mut self, host: &mut H) {
        while self.pending > 0 {
            let len = self.pending.min(TX_STATUS_NUM - self.head);

            let mut payload = [0u8; TX_STATUS_NUM * 2 + 2];
            for i in 0..len {
                let bytes = self.cache[self.head + i].into_bits().to_le_bytes();
                payload[i * 2..i * 2 + 2].copy_from_slice(&bytes);
            }
            let padded = (len * 2 + 3) & !3;
            host.send_response(ResponseTag::TxComp, len as u8, &payload[..padded]);

            self.pending -= len;
            self.head = (self.head + len) % TX_STATUS_NUM;
        }
    }
}

impl Default for TxStatusCache {
    fn default() -> Self {
        Self::new()
    }
}

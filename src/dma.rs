//! Descriptor arena and DMA queue plumbing.
//!
//! All descriptors live in one fixed arena. A descriptor names its neighbours
//! by arena index ([`DescId`]), never by pointer, so the same code runs
//! against real device SRAM and against a plain array in tests. The first
//! [`TERMINATOR_COUNT`] slots are the per-queue terminator sentinels, followed
//! by the two reserved slots (firmware TX and host response) and then one
//! slot per payload block.
//!
//! A queue is a singly linked list that always ends in its terminator. The
//! queue is empty iff `head == terminator`. Appending swaps the descriptor
//! record into the current terminator slot, which keeps the hardware's view
//! of the chain intact without ever touching a descriptor the engine might
//! be reading. Descriptor identity is therefore unstable across [`Arena::put`];
//! payload identity ([`BufId`]) is not, which is why everything that needs to
//! recognize "its" frame later matches on the buffer, not the slot.

use macro_bits::serializable_enum;
use portable_atomic::{AtomicU16, Ordering};

use crate::config::{
    ARENA_SLOTS, BA_BUFFER_LEN, BLOCK_COUNT, BLOCK_SIZE, NUM_TX_QUEUES, RSP_BUFFER_LEN,
    TERMINATOR_COUNT, TX_BLOCK_COUNT,
};

serializable_enum! {
    /// Ownership of a descriptor, stored in the two low bits of the status
    /// word. This is the only field both the firmware and the DMA engine
    /// write concurrently.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum Owner: u8 {
        #[default]
        /// Software owns the descriptor, the engine is done with it.
        Sw => 0,
        /// The DMA engine owns the descriptor.
        Hw => 1,
        /// The engine stopped on this descriptor (transfer complete).
        Stopped => 2
    }
}

const OWNER_MASK: u16 = 0x3;

// Bits of the descriptor ctrl word.
pub const CTRL_TXFAIL: u16 = 1;
pub const CTRL_BAFAIL: u16 = 2;
pub const CTRL_FAIL_MASK: u16 = CTRL_TXFAIL | CTRL_BAFAIL;
pub const CTRL_LS: u16 = 0x100;
pub const CTRL_FS: u16 = 0x200;

/// Arena index of a descriptor.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescId(pub u16);

impl DescId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Queue address registers carry the descriptor index, with bit 0 free
    /// for the engine's busy tag.
    pub(crate) fn to_reg(self) -> u32 {
        (self.0 as u32) << 1
    }
}

/// Payload identity of a descriptor. Stable across queue moves.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufId {
    /// No payload (terminators).
    None,
    /// One of the pool blocks.
    Block(u16),
    /// The reserved firmware TX (BlockAck) buffer.
    Ba,
    /// The reserved host response buffer.
    Rsp,
}

struct Desc {
    status: AtomicU16,
    ctrl: u16,
    data_size: u16,
    total_len: u16,
    /// Byte offset of the visible payload into the buffer.
    data_off: u16,
    buf: BufId,
    last: DescId,
    next: DescId,
}

impl Desc {
    fn terminator(id: DescId) -> Self {
        Self {
            status: AtomicU16::new(Owner::Sw.into_bits() as u16),
            ctrl: 0,
            data_size: 0,
            total_len: 0,
            data_off: 0,
            buf: BufId::None,
            last: id,
            next: id,
        }
    }
}

/// One DMA queue: head plus its terminator sentinel.
#[derive(Debug, Clone, Copy)]
pub struct DmaQueue {
    pub head: DescId,
    pub terminator: DescId,
}

impl DmaQueue {
    pub(crate) const fn new(terminator: DescId) -> Self {
        Self {
            head: terminator,
            terminator,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.terminator
    }
}

// Fixed slot assignment. Terminators first, then the reserved descriptors.
pub(crate) const T_UP: DescId = DescId(0);
pub(crate) const T_DOWN: DescId = DescId(1);
const T_TXQ0: u16 = 2;
pub(crate) const T_RX: DescId = DescId(T_TXQ0 + NUM_TX_QUEUES as u16);
pub(crate) const T_RETRY: DescId = DescId(T_RX.0 + 1);
const T_CAB0: u16 = T_RETRY.0 + 1;
pub(crate) const FW_DESC: DescId = DescId(TERMINATOR_COUNT as u16);
pub(crate) const RSP_DESC: DescId = DescId(TERMINATOR_COUNT as u16 + 1);
const FIRST_BLOCK_DESC: u16 = TERMINATOR_COUNT as u16 + 2;

pub(crate) const fn txq_terminator(queue: usize) -> DescId {
    DescId(T_TXQ0 + queue as u16)
}

pub(crate) const fn cab_terminator(vif: usize) -> DescId {
    DescId(T_CAB0 + vif as u16)
}

/// The descriptor arena plus all payload storage.
pub struct Arena {
    descs: [Desc; ARENA_SLOTS],
    blocks: [[u8; BLOCK_SIZE]; BLOCK_COUNT],
    ba_buf: [u8; BA_BUFFER_LEN],
    rsp_buf: [u8; RSP_BUFFER_LEN],
}

impl Arena {
    pub fn new() -> Self {
        let mut arena = Self {
            descs: core::array::from_fn(|i| Desc::terminator(DescId(i as u16))),
            blocks: [[0; BLOCK_SIZE]; BLOCK_COUNT],
            ba_buf: [0; BA_BUFFER_LEN],
            rsp_buf: [0; RSP_BUFFER_LEN],
        };

        for i in 0..BLOCK_COUNT as u16 {
            let id = DescId(FIRST_BLOCK_DESC + i);
            let desc = &mut arena.descs[id.index()];
            desc.buf = BufId::Block(i);
            desc.data_size = BLOCK_SIZE as u16;
            desc.total_len = BLOCK_SIZE as u16;
        }
        arena.descs[FW_DESC.index()].buf = BufId::Ba;
        arena.descs[RSP_DESC.index()].buf = BufId::Rsp;
        arena.descs[RSP_DESC.index()].data_size = RSP_BUFFER_LEN as u16;
        arena.descs[RSP_DESC.index()].total_len = RSP_BUFFER_LEN as u16;
        arena
    }

    /// Seed the block rotation: the first part of the pool feeds the host
    /// download queue, the rest the WLAN RX queue.
    pub fn init_rotation(&mut self, down: &mut DmaQueue, rx: &mut DmaQueue) {
        for i in 0..BLOCK_COUNT as u16 {
            let id = DescId(FIRST_BLOCK_DESC + i);
            if (i as usize) < TX_BLOCK_COUNT {
                self.reclaim(down, id);
            } else {
                self.reclaim(rx, id);
            }
        }
    }

    // --- field access -----------------------------------------------------

    pub fn owner(&self, id: DescId) -> Owner {
        Owner::from_bits((self.descs[id.index()].status.load(Ordering::Acquire) & OWNER_MASK) as u8)
    }

    pub fn set_owner(&mut self, id: DescId, owner: Owner) {
        let desc = &self.descs[id.index()];
        let status = desc.status.load(Ordering::Relaxed) & !OWNER_MASK;
        desc.status
            .store(status | owner.into_bits() as u16, Ordering::Release);
    }

    /// Hand the descriptor back to the DMA engine. Single store, the engine
    /// may take off with it immediately.
    pub fn rearm(&mut self, id: DescId) {
        self.set_owner(id, Owner::Hw);
    }

    pub fn status(&self, id: DescId) -> u16 {
        self.descs[id.index()].status.load(Ordering::Acquire)
    }

    pub fn set_status(&mut self, id: DescId, status: u16) {
        self.descs[id.index()].status.store(status, Ordering::Release);
    }

    pub fn ctrl(&self, id: DescId) -> u16 {
        self.descs[id.index()].ctrl
    }

    pub fn set_ctrl(&mut self, id: DescId, ctrl: u16) {
        self.descs[id.index()].ctrl = ctrl;
    }

    pub fn data_size(&self, id: DescId) -> u16 {
        self.descs[id.index()].data_size
    }

    pub fn set_data_size(&mut self, id: DescId, size: u16) {
        self.descs[id.index()].data_size = size;
    }

    pub fn total_len(&self, id: DescId) -> u16 {
        self.descs[id.index()].total_len
    }

    pub fn set_total_len(&mut self, id: DescId, len: u16) {
        self.descs[id.index()].total_len = len;
    }

    pub fn buf(&self, id: DescId) -> BufId {
        self.descs[id.index()].buf
    }

    pub fn next(&self, id: DescId) -> DescId {
        self.descs[id.index()].next
    }

    pub(crate) fn set_next(&mut self, id: DescId, next: DescId) {
        self.descs[id.index()].next = next;
    }

    pub fn last(&self, id: DescId) -> DescId {
        self.descs[id.index()].last
    }

    pub(crate) fn set_last(&mut self, id: DescId, last: DescId) {
        self.descs[id.index()].last = last;
    }

    // --- payload access ---------------------------------------------------

    fn buf_storage(&self, buf: BufId) -> &[u8] {
        match buf {
            BufId::Block(i) => &self.blocks[i as usize],
            BufId::Ba => &self.ba_buf,
            BufId::Rsp => &self.rsp_buf,
            BufId::None => &[],
        }
    }

    fn buf_storage_mut(&mut self, buf: BufId) -> &mut [u8] {
        match buf {
            BufId::Block(i) => &mut self.blocks[i as usize],
            BufId::Ba => &mut self.ba_buf,
            BufId::Rsp => &mut self.rsp_buf,
            BufId::None => &mut [],
        }
    }

    /// Buffer access by payload identity, for state that outlives the
    /// descriptor slot (e.g. the previous aggregate member).
    pub(crate) fn buf_bytes(&self, buf: BufId) -> &[u8] {
        self.buf_storage(buf)
    }

    pub(crate) fn buf_bytes_mut(&mut self, buf: BufId) -> &mut [u8] {
        self.buf_storage_mut(buf)
    }

    /// The payload window the DMA engine sees: `data_size` bytes starting at
    /// the payload offset.
    pub fn payload(&self, id: DescId) -> &[u8] {
        let desc = &self.descs[id.index()];
        let start = desc.data_off as usize;
        &self.buf_storage(desc.buf)[start..start + desc.data_size as usize]
    }

    pub fn payload_mut(&mut self, id: DescId) -> &mut [u8] {
        let desc = &self.descs[id.index()];
        let (buf, start, size) = (desc.buf, desc.data_off as usize, desc.data_size as usize);
        &mut self.buf_storage_mut(buf)[start..start + size]
    }

    /// The whole buffer from offset zero, superdesc included even while the
    /// superframe is hidden.
    pub fn frame_buf(&self, id: DescId) -> &[u8] {
        self.buf_storage(self.descs[id.index()].buf)
    }

    pub fn frame_buf_mut(&mut self, id: DescId) -> &mut [u8] {
        let buf = self.descs[id.index()].buf;
        self.buf_storage_mut(buf)
    }

    // --- superframe hiding ------------------------------------------------

    /// Move the payload window past the superdesc, so the radio engine only
    /// transfers the hardware descriptor and the frame.
    pub fn hide_super(&mut self, id: DescId) {
        let desc = &mut self.descs[id.index()];
        debug_assert_eq!(desc.data_off, 0);
        desc.data_off = crate::superframe::SUPERDESC_LEN as u16;
        desc.data_size -= crate::superframe::SUPERDESC_LEN as u16;
        desc.total_len -= crate::superframe::SUPERDESC_LEN as u16;
    }

    pub fn unhide_super(&mut self, id: DescId) {
        let desc = &mut self.descs[id.index()];
        debug_assert_eq!(desc.data_off, crate::superframe::SUPERDESC_LEN as u16);
        desc.data_off = 0;
        desc.data_size += crate::superframe::SUPERDESC_LEN as u16;
        desc.total_len += crate::superframe::SUPERDESC_LEN as u16;
    }

    // --- queue operations -------------------------------------------------

    /// Detach the head chain from the queue. The chain (head through
    /// `last(head)`) stays linked internally.
    pub fn unlink_head(&mut self, queue: &mut DmaQueue) -> Option<DescId> {
        if queue.is_empty() {
            return None;
        }
        let head = queue.head;
        queue.head = self.next(self.last(head));
        Some(head)
    }

    /// Append a chain to the queue tail without touching ownership.
    ///
    /// The first descriptor's record is copied into the current terminator
    /// slot and the vacated slot becomes the new terminator. The engine never
    /// sees a half-linked chain this way, but the caller's `first` id is dead
    /// after this call.
    pub fn put(&mut self, queue: &mut DmaQueue, first: DescId) {
        let term = queue.terminator;
        debug_assert_ne!(term, first);

        // Move the first descriptor's record into the terminator slot.
        let src = &self.descs[first.index()];
        let status = src.status.load(Ordering::Relaxed);
        let (ctrl, data_size, total_len, data_off, buf) =
            (src.ctrl, src.data_size, src.total_len, src.data_off, src.buf);
        let (mut last, next) = (src.last, src.next);
        if last == first {
            // single-segment chain: "last" follows the record to its new slot
            last = term;
        }
        {
            let dst = &mut self.descs[term.index()];
            dst.status = AtomicU16::new(status);
            dst.ctrl = ctrl;
            dst.data_size = data_size;
            dst.total_len = total_len;
            dst.data_off = data_off;
            dst.buf = buf;
            dst.last = last;
            dst.next = next;
        }

        // The chain tail links to the new terminator, which is the vacated
        // first slot.
        self.set_next(last, first);
        {
            let t = &mut self.descs[first.index()];
            t.status = AtomicU16::new(Owner::Sw.into_bits() as u16);
            t.ctrl = 0;
            t.data_size = 0;
            t.total_len = 0;
            t.data_off = 0;
            t.buf = BufId::None;
            t.last = first;
            t.next = first;
        }
        queue.terminator = first;
    }

    /// Recycle a chain: every segment is reset to one full hardware-owned
    /// block and appended to the queue.
    pub fn reclaim(&mut self, queue: &mut DmaQueue, first: DescId) {
        let last = self.last(first);
        let mut id = first;
        loop {
            let next = self.next(id);
            let done = id == last;
            {
                let desc = &mut self.descs[id.index()];
                desc.ctrl = 0;
                desc.data_off = 0;
                desc.data_size = BLOCK_SIZE as u16;
                desc.total_len = BLOCK_SIZE as u16;
                desc.last = id;
                desc.next = id;
            }
            self.rearm(id);
            self.put(queue, id);
            if done {
                break;
            }
            id = next;
        }
    }

    /// Unlink the head chain if software owns it.
    pub fn dequeue_owned(&mut self, queue: &mut DmaQueue, owner: Owner) -> Option<DescId> {
        if !queue.is_empty() && self.owner(queue.head) == owner {
            self.unlink_head(queue)
        } else {
            None
        }
    }

    /// Unlink the head chain unless it has the given owner. Used to drain
    /// completed descriptors regardless of the Stopped/Sw distinction.
    pub fn dequeue_not_owned(&mut self, queue: &mut DmaQueue, owner: Owner) -> Option<DescId> {
        if !queue.is_empty() && self.owner(queue.head) != owner {
            self.unlink_head(queue)
        } else {
            None
        }
    }

    /// Walk the queue chain-wise from the head while the given owner holds
    /// the descriptors; returns the first descriptor that breaks the run, or
    /// the terminator.
    pub fn first_not_owned(&self, queue: &DmaQueue, owner: Owner) -> DescId {
        let mut id = queue.head;
        while id != queue.terminator && self.owner(id) == owner {
            id = self.next(self.last(id));
        }
        id
    }

    /// Number of descriptors (segments, not chains) queued.
    pub fn queue_len(&self, queue: &DmaQueue) -> usize {
        let mut len = 0;
        let mut id = queue.head;
        while id != queue.terminator {
            len += 1;
            id = self.next(id);
        }
        len
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

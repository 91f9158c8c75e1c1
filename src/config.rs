//! Compile-time geometry and tunables.
//!
//! The device has one fixed SRAM window shared by the descriptor arena, the
//! payload blocks and a handful of reserved buffers. Everything below is
//! derived from that budget, so the arena always fills the window exactly
//! instead of relying on magic block counts.

/// Size of the shared SRAM window in bytes.
pub const SRAM_SIZE: usize = 0x18000;

/// Payload block size. Every descriptor (except the terminators) owns exactly
/// one block of this size.
pub const BLOCK_SIZE: usize = 256 + 64;

/// On-device footprint of one DMA descriptor record.
pub const DESC_SIZE: usize = 20;

/// Block buffers must start on a 64 byte boundary for the DMA engine.
pub const BLOCK_ALIGNMENT: usize = 64;

/// Hardware TX queues: four access categories plus the out-of-band queue.
pub const NUM_TX_QUEUES: usize = 5;

/// Index of the out-of-band TX queue (offchannel/management traffic).
pub const TXQ_SPECIAL: usize = NUM_TX_QUEUES - 1;

/// Interfaces the firmware tracks (main + one secondary).
pub const NUM_VIFS: usize = 2;

/// Entries in the BAR reply context cache.
pub const BAR_CACHE_NUM: usize = 4;

/// Host response message limit, header included.
pub const MAX_CMD_LEN: usize = 64;

/// Header bytes of a host response message (tag, length, ext).
pub const CMD_HDR_LEN: usize = 4;

/// TX status records that fit into one host response.
pub const TX_STATUS_NUM: usize = (MAX_CMD_LEN - CMD_HDR_LEN) / 2;

/// Reserved buffer for the firmware-built BlockAck superframe.
pub const BA_BUFFER_LEN: usize = 128;

/// Reserved buffer for outgoing host responses.
pub const RSP_BUFFER_LEN: usize = BLOCK_SIZE;

/// Reserved beacon scratch space, per interface.
pub const BCN_BUFFER_LEN: usize = 256;

/// SRAM claimed by the reserved buffers, i.e. not available to the arena.
pub const SRAM_RESERVED: usize =
    BA_BUFFER_LEN + MAX_CMD_LEN + RSP_BUFFER_LEN + NUM_VIFS * BCN_BUFFER_LEN;

/// Terminator sentinels: up, down, the TX queues, rx, tx-retry, and one CAB
/// queue per interface.
pub const TERMINATOR_COUNT: usize = 2 + NUM_TX_QUEUES + 1 + 1 + NUM_VIFS;

/// Reserved descriptor slots outside the queue rotation: the firmware TX slot
/// and the host response slot.
pub const RESERVED_DESC_COUNT: usize = 2;

const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

const FRAME_MEMORY_SIZE: usize = SRAM_SIZE - SRAM_RESERVED;

const NONBLOCK_DESCRIPTORS_SIZE: usize =
    DESC_SIZE * (TERMINATOR_COUNT + RESERVED_DESC_COUNT);

/// Payload-carrying descriptors in the arena. Whatever the terminators and
/// reserved buffers leave of the SRAM window is split into descriptor+block
/// pairs.
pub const BLOCK_COUNT: usize = (FRAME_MEMORY_SIZE
    - align_up(NONBLOCK_DESCRIPTORS_SIZE, BLOCK_ALIGNMENT))
    / (BLOCK_SIZE + DESC_SIZE);

/// Total arena slots: terminators first, then the reserved slots, then the
/// block descriptors.
pub const ARENA_SLOTS: usize = TERMINATOR_COUNT + RESERVED_DESC_COUNT + BLOCK_COUNT;

/// Host download (TX) share of the block rotation, as ratio numerators.
pub const DOWN_BLOCK_RATIO: usize = 2;
pub const RX_BLOCK_RATIO: usize = 1;

/// Blocks seeded into the down-queue rotation.
pub const TX_BLOCK_COUNT: usize =
    BLOCK_COUNT * DOWN_BLOCK_RATIO / (DOWN_BLOCK_RATIO + RX_BLOCK_RATIO);

/// Blocks seeded into the RX rotation.
pub const RX_BLOCK_COUNT: usize = BLOCK_COUNT - TX_BLOCK_COUNT;

/// Longest RX frame the firmware forwards; anything bigger is damaged.
pub const RX_MAX_FRAME_LEN: usize = 1920;

/// Stall ticks after which a TX queue gets its DMA pointer bumped.
pub const QUEUE_BUMP_THRESHOLD: u32 = 3;

/// Stall ticks after which the stuck queue is dumped to the debug log.
pub const QUEUE_DUMP_THRESHOLD: u32 = 5;

/// Stall ticks after which the MAC reset counter is escalated.
pub const QUEUE_RESET_THRESHOLD: u32 = 6;

/// Lead time of the pre-TBTT interrupt before the actual beacon, in
/// kilomicroseconds.
pub const PRETBTT_KUS: u32 = 6;

/// CAB traffic queued at pre-TBTT must be out before the next beacon; the
/// flush window is the pre-TBTT lead time plus one Kus of slack.
pub const TBTT_DELTA_MS: u32 = PRETBTT_KUS + 1;

/// Construction-time switches. The firmware context takes one of these at
/// `new` time; there are no feature flags to rebuild for.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Feed the hardware watchdog from the main loop.
    pub watchdog: bool,
    /// Initial host receive filter (see `wlan_rx`); the host usually
    /// reprograms this right after boot.
    pub rx_filter: u32,
    /// PHY vector for firmware-built BlockAck replies and the default fill
    /// of captured BAR contexts (OFDM 6 MBit).
    pub ba_reply_phy: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchdog: true,
            rx_filter: 0,
            ba_reply_phy: crate::superframe::PHY_OFDM_6M,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_fits_sram_window() {
        let descriptors = ARENA_SLOTS * DESC_SIZE;
        let blocks = BLOCK_COUNT * BLOCK_SIZE;
        assert!(descriptors + blocks + SRAM_RESERVED <= SRAM_SIZE);
        // One more block would not fit.
        assert!(descriptors + DESC_SIZE + blocks + BLOCK_SIZE + SRAM_RESERVED > SRAM_SIZE);
    }

    #[test]
    fn block_split_is_exhaustive() {
        assert_eq!(TX_BLOCK_COUNT + RX_BLOCK_COUNT, BLOCK_COUNT);
        assert!(TX_BLOCK_COUNT > RX_BLOCK_COUNT);
    }

    #[test]
    fn status_records_fill_a_response() {
        assert!(TX_STATUS_NUM * 2 + CMD_HDR_LEN <= MAX_CMD_LEN);
        assert_eq!(TX_STATUS_NUM, 30);
    }
}

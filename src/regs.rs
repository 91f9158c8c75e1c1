//! Register map.
//!
//! Word addresses of the MAC, DMA, timer, power and host-interface blocks,
//! plus the interrupt and trigger bit assignments. Only the registers the
//! firmware core actually drives are listed.

use macro_bits::bit;

// MAC block
pub const MAC_REG_BASE: u32 = 0x1c3000;
pub const MAC_REG_POWER_STATE_CTRL: u32 = MAC_REG_BASE + 0x500;
pub const MAC_REG_AFTER_PNP: u32 = MAC_REG_BASE + 0x504;
pub const MAC_REG_RTS_CTS_RATE: u32 = MAC_REG_BASE + 0x634;
pub const MAC_REG_ACK_TPC: u32 = MAC_REG_BASE + 0x694;
pub const MAC_REG_RTS_CTS_TPC: u32 = MAC_REG_BASE + 0x698;
pub const MAC_REG_TSF_L: u32 = MAC_REG_BASE + 0x514;
pub const MAC_REG_TSF_H: u32 = MAC_REG_BASE + 0x518;
pub const MAC_REG_CAM_MODE: u32 = MAC_REG_BASE + 0x700;
pub const MAC_REG_CAM_ROLL_CALL_TBL_L: u32 = MAC_REG_BASE + 0x704;
pub const MAC_REG_CAM_ROLL_CALL_TBL_H: u32 = MAC_REG_BASE + 0x708;
pub const MAC_REG_AMPDU_FACTOR: u32 = MAC_REG_BASE + 0xb9c;
pub const MAC_REG_AMPDU_DENSITY: u32 = MAC_REG_BASE + 0xba0;
pub const MAC_REG_AMPDU_COUNT: u32 = MAC_REG_BASE + 0xba4;
pub const MAC_REG_RX_TOTAL: u32 = MAC_REG_BASE + 0xc38;
pub const MAC_REG_RX_OVERRUN: u32 = MAC_REG_BASE + 0xc3c;
pub const MAC_REG_BCN_ADDR: u32 = MAC_REG_BASE + 0xd90;
pub const MAC_REG_BCN_COUNT: u32 = MAC_REG_BASE + 0xd98;
pub const MAC_REG_BCN_CTRL: u32 = MAC_REG_BASE + 0xd9c;

/// MAC reset bit in `MAC_REG_POWER_STATE_CTRL`.
pub const MAC_POWER_STATE_CTRL_RESET: u32 = bit!(5);

/// Beacon-fifo handshake: firmware is done with the update window.
pub const BCN_CTRL_READY: u32 = bit!(0);

// WLAN DMA block. Every TX queue has a head register and a read-only
// current-position register right next to it.
pub const MAC_REG_DMA_TXQ0_ADDR: u32 = MAC_REG_BASE + 0xd00;
pub const MAC_REG_DMA_RXQ_ADDR: u32 = MAC_REG_BASE + 0xd28;
pub const MAC_REG_DMA_RXQ_ADDR_CURR: u32 = MAC_REG_BASE + 0xd2c;
pub const MAC_REG_DMA_TRIGGER: u32 = MAC_REG_BASE + 0xd30;
pub const MAC_REG_DMA_STATUS: u32 = MAC_REG_BASE + 0xd34;
pub const MAC_REG_DMA_TXQX_ADDR_CURR: u32 = MAC_REG_BASE + 0xd38;
pub const MAC_REG_INT_CTRL: u32 = MAC_REG_BASE + 0xd7c;

pub const fn dma_txq_addr(queue: usize) -> u32 {
    MAC_REG_DMA_TXQ0_ADDR + 8 * queue as u32
}

pub const fn dma_txq_addr_curr(queue: usize) -> u32 {
    dma_txq_addr(queue) + 4
}

/// RX queue bit in `MAC_REG_DMA_TRIGGER`; TX queues use `bit!(queue)`.
pub const DMA_TRIGGER_RXQ: u32 = bit!(8);

// MAC interrupt word bits
pub const MAC_INT_RXC: u32 = bit!(0);
pub const MAC_INT_TXC: u32 = bit!(1);
pub const MAC_INT_RETRY_FAIL: u32 = bit!(2);
pub const MAC_INT_ATIM: u32 = bit!(4);
pub const MAC_INT_CFG_BCN: u32 = bit!(6);
pub const MAC_INT_QOS: u32 = bit!(8);
pub const MAC_INT_RADAR: u32 = bit!(12);
pub const MAC_INT_PRETBTT: u32 = bit!(14);

// Timer block
pub const TIMER_REG_BASE: u32 = 0x1c1000;
pub const TIMER_REG_WATCH_DOG: u32 = TIMER_REG_BASE;
pub const TIMER_REG_TIMER0: u32 = TIMER_REG_BASE + 0x10;
pub const TIMER_CLOCK_LOW: u32 = TIMER_REG_BASE + 0x40;
pub const TIMER_CLOCK_HIGH: u32 = TIMER_REG_BASE + 0x44;
pub const TIMER_REG_CONTROL: u32 = TIMER_REG_BASE + 0x50;
pub const TIMER_REG_INTERRUPT: u32 = TIMER_REG_BASE + 0x54;

/// Watchdog feed value, roughly 2.5s at the slow clock.
pub const WATCH_DOG_TIMER: u32 = 0x100;

// Power block
pub const PWR_REG_BASE: u32 = 0x1d4000;
pub const PWR_REG_CLOCK_SEL: u32 = PWR_REG_BASE + 0x008;
pub const PWR_REG_WATCH_DOG_MAGIC: u32 = PWR_REG_BASE + 0x020;

// Host interface (PTA) DMA block
pub const PTA_REG_BASE: u32 = 0x1e2000;
pub const PTA_REG_DN_DMA_ADDRL: u32 = PTA_REG_BASE + 0x010;
pub const PTA_REG_DN_DMA_ADDRH: u32 = PTA_REG_BASE + 0x014;
pub const PTA_REG_UP_DMA_ADDRL: u32 = PTA_REG_BASE + 0x018;
pub const PTA_REG_UP_DMA_ADDRH: u32 = PTA_REG_BASE + 0x01c;
pub const PTA_REG_DN_DMA_TRIGGER: u32 = PTA_REG_BASE + 0x020;
pub const PTA_REG_UP_DMA_TRIGGER: u32 = PTA_REG_BASE + 0x024;
pub const PTA_REG_INT_FLAG: u32 = PTA_REG_BASE + 0x030;

pub const PTA_INT_FLAG_DN: u32 = bit!(0);
pub const PTA_INT_FLAG_UP: u32 = bit!(1);

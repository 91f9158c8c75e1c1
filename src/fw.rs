//! Firmware context and main loop.
//!
//! [`Firmware`] owns everything: the register seam, the host transport, the
//! descriptor arena and all WLAN bookkeeping. The main loop is strictly
//! cooperative; the interrupt lines are polled and acked once per tick, in a
//! fixed order, and every handler runs to completion.

use macro_bits::{bit, serializable_enum};

use crate::config::{Config, BAR_CACHE_NUM, NUM_TX_QUEUES, NUM_VIFS};
use crate::dma::{self, Arena, BufId, DescId, DmaQueue};
use crate::hostif::HostTransport;
use crate::mmio::{self, Mmio};
use crate::regs;
use crate::txstatus::TxStatusCache;
use crate::wire::BarCtx;

/// Ways a public operation can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FwError {
    /// The reserved firmware TX descriptor is still in flight.
    FwSlotBusy,
    /// Interface index out of range.
    InvalidVif,
    /// The supplied buffer cannot hold what the operation needs.
    BufferTooShort,
}

pub type FwResult<T> = Result<T, FwError>;

/// Called when a firmware-built frame leaves the TX path, with the frame
/// buffer and the transmit verdict.
pub type FwTxCallback = fn(&mut [u8], bool);

serializable_enum! {
    /// AHB clock sources.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum CpuClock: u8 {
        #[default]
        Ahb40MhzOsc => 0,
        Ahb20_22Mhz => 1,
        Ahb40_44Mhz => 2,
        Ahb80_88Mhz => 3
    }
}

/// Per-interface CAB flush state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CabTrigger {
    /// Nothing buffered, nothing announced.
    Empty,
    /// The outgoing DTIM beacon announced buffered traffic; flush once the
    /// beacon had time to air.
    Armed,
    /// Flushed for this DTIM period; new arrivals wait for the next one.
    Defer,
}

pub(crate) struct PtaState {
    pub(crate) down_queue: DmaQueue,
    pub(crate) up_queue: DmaQueue,
}

pub(crate) struct WlanState {
    pub(crate) tx_queue: [DmaQueue; NUM_TX_QUEUES],
    pub(crate) rx_queue: DmaQueue,
    pub(crate) tx_retry: DmaQueue,
    pub(crate) cab_queue: [DmaQueue; NUM_VIFS],
    pub(crate) cab_queue_len: [usize; NUM_VIFS],
    pub(crate) cab_flush_trigger: [CabTrigger; NUM_VIFS],
    pub(crate) cab_flush_time: u32,

    /// Hang detection: last seen DMA position per TX queue and the number of
    /// timer ticks it has not moved.
    pub(crate) last_txq_addr: [u32; NUM_TX_QUEUES],
    pub(crate) txq_stall_ticks: [u32; NUM_TX_QUEUES],
    pub(crate) rx_total: u32,
    pub(crate) rx_overruns: u32,
    pub(crate) mac_reset: u32,

    /// Interrupts to replay on the next tick, e.g. after a MAC reset.
    pub(crate) soft_int: u32,

    pub(crate) rx_filter: u32,
    pub(crate) sequence: [u16; NUM_VIFS],

    /// Previous member of the open aggregate per queue, by payload identity.
    pub(crate) ampdu_prev: [Option<BufId>; NUM_TX_QUEUES],

    pub(crate) queued_bar: usize,
    pub(crate) queued_ba: usize,
    pub(crate) ba_cache: [BarCtx; BAR_CACHE_NUM],
    pub(crate) ba_head: usize,
    pub(crate) ba_tail: usize,

    /// The reserved firmware TX descriptor, when it is at home.
    pub(crate) fw_desc: Option<DescId>,
    pub(crate) fw_desc_callback: Option<FwTxCallback>,
    /// The reserved host response descriptor, when it is at home.
    pub(crate) rsp_desc: Option<DescId>,

    pub(crate) tx_status: TxStatusCache,
}

impl WlanState {
    fn new(config: &Config) -> Self {
        Self {
            tx_queue: core::array::from_fn(|i| DmaQueue::new(dma::txq_terminator(i))),
            rx_queue: DmaQueue::new(dma::T_RX),
            tx_retry: DmaQueue::new(dma::T_RETRY),
            cab_queue: core::array::from_fn(|v| DmaQueue::new(dma::cab_terminator(v))),
            cab_queue_len: [0; NUM_VIFS],
            cab_flush_trigger: [CabTrigger::Empty; NUM_VIFS],
            cab_flush_time: 0,
            last_txq_addr: [0; NUM_TX_QUEUES],
            txq_stall_ticks: [0; NUM_TX_QUEUES],
            rx_total: 0,
            rx_overruns: 0,
            mac_reset: 0,
            soft_int: 0,
            rx_filter: config.rx_filter,
            sequence: [0; NUM_VIFS],
            ampdu_prev: [None; NUM_TX_QUEUES],
            queued_bar: 0,
            queued_ba: 0,
            ba_cache: [BarCtx::default(); BAR_CACHE_NUM],
            ba_head: 0,
            ba_tail: 0,
            fw_desc: Some(dma::FW_DESC),
            fw_desc_callback: None,
            rsp_desc: Some(dma::RSP_DESC),
            tx_status: TxStatusCache::new(),
        }
    }
}

pub struct Firmware<M: Mmio, H: HostTransport> {
    pub(crate) mmio: M,
    pub(crate) host: H,
    pub(crate) config: Config,
    pub(crate) arena: Arena,
    pub(crate) pta: PtaState,
    pub(crate) wlan: WlanState,
    pub(crate) counter: u32,
    /// Calibration loops per millisecond, measured at boot.
    pub(crate) bogoclock: u32,
    watchdog_enabled: bool,
    reboot: bool,
}

/// Interval of the housekeeping timer, in microseconds.
const TIMER0_INTERVAL_US: u32 = 50_000;

const CALIBRATE_SPIN_LIMIT: u32 = 1_000_000;

impl<M: Mmio, H: HostTransport> Firmware<M, H> {
    pub fn new(mmio: M, host: H, config: Config) -> Self {
        let mut arena = Arena::new();
        let mut pta = PtaState {
            down_queue: DmaQueue::new(dma::T_DOWN),
            up_queue: DmaQueue::new(dma::T_UP),
        };
        let mut wlan = WlanState::new(&config);
        arena.init_rotation(&mut pta.down_queue, &mut wlan.rx_queue);

        let mut fw = Self {
            mmio,
            host,
            watchdog_enabled: config.watchdog,
            config,
            arena,
            pta,
            wlan,
            counter: 0,
            bogoclock: 0,
            reboot: false,
        };
        fw.init();
        fw
    }

    fn init(&mut self) {
        // Warm starts leave the boot magic in place; count them instead of
        // re-seeding.
        let magic = self.mmio.get(regs::PWR_REG_WATCH_DOG_MAGIC);
        if magic & 0xffff_0000 == 0x1234_0000 {
            warning!("watchdog restart, boot count {}", magic & 0xffff);
            self.mmio.incl(regs::PWR_REG_WATCH_DOG_MAGIC);
        } else {
            self.mmio.andl(regs::PWR_REG_WATCH_DOG_MAGIC, 0xffff);
            self.mmio.orl(regs::PWR_REG_WATCH_DOG_MAGIC, 0x1234_0000);
        }

        self.timer_init(0, TIMER0_INTERVAL_US);

        // ack whatever a previous life left pending
        self.mmio.set(regs::MAC_REG_INT_CTRL, 0xffff);
        self.mmio.orl(regs::MAC_REG_AFTER_PNP, 1);

        if self.watchdog_enabled {
            self.mmio.set(regs::TIMER_REG_WATCH_DOG, regs::WATCH_DOG_TIMER);
        } else {
            self.mmio.set(regs::TIMER_REG_WATCH_DOG, 0xffff);
        }

        // anchor every DMA engine on its queue
        for i in 0..NUM_TX_QUEUES {
            self.mmio
                .set(regs::dma_txq_addr(i), self.wlan.tx_queue[i].head.to_reg());
        }
        self.mmio
            .set(regs::MAC_REG_DMA_RXQ_ADDR, self.wlan.rx_queue.head.to_reg());
        self.mmio.set(
            regs::PTA_REG_DN_DMA_ADDRL,
            self.pta.down_queue.head.to_reg(),
        );
        self.mmio.set(regs::PTA_REG_DN_DMA_ADDRH, 0);
        self.mmio
            .set(regs::PTA_REG_UP_DMA_ADDRL, self.pta.up_queue.head.to_reg());
        self.mmio.set(regs::PTA_REG_UP_DMA_ADDRH, 0);
        for i in 0..NUM_TX_QUEUES {
            self.wlan.last_txq_addr[i] = self.mmio.get(regs::dma_txq_addr_curr(i));
        }

        self.down_trigger();

        self.clock_set(CpuClock::Ahb40MhzOsc, true);
        self.bogoclock = self.clock_calibrate();
        info!("booted, bogoclock {}", self.bogoclock);
    }

    fn timer_init(&mut self, timer: u32, interval_us: u32) {
        self.mmio.orl(regs::TIMER_REG_CONTROL, bit!(timer));
        self.mmio
            .set(regs::TIMER_REG_TIMER0 + (timer << 2), interval_us - 1);
        self.mmio.orl(regs::TIMER_REG_INTERRUPT, bit!(timer));
    }

    pub fn clock_set(&mut self, clock: CpuClock, pll: bool) {
        let sel = if pll { 0x70 } else { 0x600 };
        self.mmio
            .set(regs::PWR_REG_CLOCK_SEL, sel | clock.into_bits() as u32);
    }

    /// Count calibration loops across one millisecond of the free-running
    /// clock. Bounded, so a dead clock yields a bogus but finite value.
    fn clock_calibrate(&mut self) -> u32 {
        let t0 = mmio::clock_counter(&self.mmio);
        let mut bogo = 0u32;
        let mut spins = 0u32;
        while mmio::clock_counter(&self.mmio).wrapping_sub(t0) & (bit!(18) - 1) < 1000 {
            bogo += 9;
            spins += 1;
            if spins > CALIBRATE_SPIN_LIMIT {
                warning!("clock calibration: clock not advancing");
                break;
            }
        }
        bogo
    }

    /// Request a restart through the watchdog on the next tick.
    pub fn reboot(&mut self) {
        self.reboot = true;
    }

    pub fn set_rx_filter(&mut self, filter: u32) {
        self.wlan.rx_filter = filter;
    }

    fn handle_fw(&mut self) {
        if self.watchdog_enabled {
            self.mmio.set(regs::TIMER_REG_WATCH_DOG, regs::WATCH_DOG_TIMER);
        }
        if self.reboot {
            warning!("reboot requested, letting the watchdog bite");
            self.mmio.set(regs::TIMER_REG_WATCH_DOG, 0);
        }
    }

    fn handle_timer(&mut self) {
        let mut intr = self.mmio.get(regs::TIMER_REG_INTERRUPT);
        // ack
        self.mmio.set(regs::TIMER_REG_INTERRUPT, intr);

        if intr & bit!(0) != 0 {
            intr &= !bit!(0);
            self.wlan_timer();
        }
        if intr != 0 {
            debug!("unhandled timer interrupts {:x}", intr);
        }
    }

    /// One round of the main loop.
    pub fn tick(&mut self) {
        self.handle_fw();
        self.handle_wlan();
        self.handle_host_interface();
        self.host.poll();
        self.handle_timer();
        self.counter = self.counter.wrapping_add(1);
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }
}

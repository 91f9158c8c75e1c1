//! Test doubles: a hash-map register file, a recording host transport and
//! scenario helpers that play the DMA engines' part.

use std::cell::Cell;
use std::collections::HashMap;

use crate::config::Config;
use crate::dma::{DescId, Owner};
use crate::fw::Firmware;
use crate::hostif::{HostTransport, ResponseTag};
use crate::mmio::{Mmio, TICKS_PER_USEC};
use crate::regs;
use crate::superframe::{RateInfo, SuperFrame, FRAME_OFF};
use crate::txstatus::TxStatus;
use crate::wire::{self, FrameControl, FTYPE_DATA, FTYPE_MGMT};
use crate::wlan_rx::{RX_HEAD_LEN, RX_STATUS_LEN};

/// Interrupt flag registers clear on write-one, like the hardware.
const W1C_REGS: [u32; 3] = [
    regs::MAC_REG_INT_CTRL,
    regs::TIMER_REG_INTERRUPT,
    regs::PTA_REG_INT_FLAG,
];

pub struct MockMmio {
    regs: HashMap<u32, u32>,
    ticks: Cell<u32>,
    clock_step: u32,
}

impl MockMmio {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            ticks: Cell::new(0),
            clock_step: 0,
        }
    }

    /// A register file whose free-running clock advances by `step` ticks on
    /// every read, so busy-waits terminate.
    pub fn with_clock(step: u32) -> Self {
        Self {
            clock_step: step,
            ..Self::new()
        }
    }
}

impl Mmio for MockMmio {
    fn get(&self, addr: u32) -> u32 {
        match addr {
            regs::TIMER_CLOCK_LOW if self.clock_step > 0 => {
                self.ticks
                    .set(self.ticks.get().wrapping_add(self.clock_step));
                self.ticks.get() & 0xffff
            }
            regs::TIMER_CLOCK_HIGH if self.clock_step > 0 => self.ticks.get() >> 16,
            _ => self.regs.get(&addr).copied().unwrap_or(0),
        }
    }

    fn set(&mut self, addr: u32, val: u32) {
        if W1C_REGS.contains(&addr) {
            let cur = self.regs.get(&addr).copied().unwrap_or(0);
            self.regs.insert(addr, cur & !val);
        } else {
            self.regs.insert(addr, val);
        }
    }
}

#[derive(Default)]
pub struct MockHost {
    pub responses: Vec<(ResponseTag, u8, Vec<u8>)>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostTransport for MockHost {
    fn send_response(&mut self, tag: ResponseTag, ext: u8, payload: &[u8]) {
        self.responses.push((tag, ext, payload.to_vec()));
    }
}

pub type MockFw = Firmware<MockMmio, MockHost>;

pub fn boot() -> MockFw {
    Firmware::new(MockMmio::with_clock(1000), MockHost::new(), Config::default())
}

/// Latch interrupt flag bits, as an asserting interrupt line would.
pub fn raise(fw: &mut MockFw, addr: u32, bits: u32) {
    let cur = fw.mmio.regs.get(&addr).copied().unwrap_or(0);
    fw.mmio.regs.insert(addr, cur | bits);
}

pub fn advance_clock(fw: &mut MockFw, usec: u32) {
    let t = fw
        .mmio
        .ticks
        .get()
        .wrapping_add(usec.wrapping_mul(TICKS_PER_USEC));
    fw.mmio.ticks.set(t);
}

// --- frame builders ---------------------------------------------------------

/// A minimal superframe: one rate with one try, no alternatives.
pub fn data_superframe(queue: usize, cookie: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; FRAME_OFF + body.len()];
    buf[FRAME_OFF..].copy_from_slice(body);
    let mut sf = SuperFrame::new(&mut buf);
    sf.set_len((FRAME_OFF + body.len()) as u16);
    sf.set_cookie(cookie);
    sf.set_misc(queue, 0, false, false, false);
    sf.set_ri(0, RateInfo::new().with_tries(1));
    sf.set_hw_len((body.len() + wire::FCS_LEN) as u16);
    buf
}

pub fn set_ri_tries(buf: &mut [u8], i: usize, tries: u8) {
    let mut sf = SuperFrame::new(buf);
    let ri = sf.ri(i).with_tries(tries);
    sf.set_ri(i, ri);
}

pub fn set_rr(buf: &mut [u8], i: usize, phy: u32) {
    SuperFrame::new(buf).set_rr(i, phy);
}

pub fn set_ampdu(buf: &mut [u8]) {
    let mut sf = SuperFrame::new(buf);
    let mac = sf.mac().with_ampdu(true);
    sf.set_mac(mac);
}

pub fn set_assign_seq(buf: &mut [u8]) {
    buf[6] |= 0x4;
}

pub fn set_cab(buf: &mut [u8], vif: usize) {
    buf[6] = (buf[6] & !0x38) | 0x80 | ((vif as u8 & 0x7) << 3);
}

/// A QoS data frame; the TID doubles as an address byte so different TIDs
/// are different flows.
pub fn qos_frame(tid: u8) -> Vec<u8> {
    let mut frame = vec![0u8; 40];
    wire::put_le16(
        &mut frame,
        0,
        FrameControl::new()
            .with_ftype(FTYPE_DATA)
            .with_stype(8)
            .into_bits(),
    );
    frame[4] = tid;
    frame[wire::HDR_LEN] = tid;
    frame
}

/// A beacon with one 4-byte TIM element.
pub fn beacon_with_tim(dtim_count: u8) -> Vec<u8> {
    let mut beacon = vec![0u8; wire::BEACON_IE_OFF + 6 + wire::FCS_LEN];
    wire::put_le16(
        &mut beacon,
        0,
        FrameControl::new()
            .with_ftype(FTYPE_MGMT)
            .with_stype(8)
            .into_bits(),
    );
    let tim = wire::BEACON_IE_OFF;
    beacon[tim] = wire::EID_TIM;
    beacon[tim + 1] = 4;
    beacon[tim + 2] = dtim_count;
    beacon[tim + 3] = 1;
    beacon
}

// --- hardware actors --------------------------------------------------------

/// Hand a superframe straight to the TX path, as a completed download would.
pub fn submit(fw: &mut MockFw, bytes: &[u8]) {
    let desc = fw
        .arena
        .dequeue_owned(&mut fw.pta.down_queue, Owner::Hw)
        .expect("down pool empty");
    fw.arena.frame_buf_mut(desc)[..bytes.len()].copy_from_slice(bytes);
    fw.arena.set_data_size(desc, bytes.len() as u16);
    fw.arena.set_total_len(desc, bytes.len() as u16);
    fw.arena.set_owner(desc, Owner::Stopped);
    fw.wlan_tx(desc);
}

/// Complete a download transfer in place at the head of the down queue and
/// assert the interrupt, the way the host interface engine does.
pub fn host_download(fw: &mut MockFw, bytes: &[u8]) -> DescId {
    let desc = fw.pta.down_queue.head;
    fw.arena.frame_buf_mut(desc)[..bytes.len()].copy_from_slice(bytes);
    fw.arena.set_data_size(desc, bytes.len() as u16);
    fw.arena.set_total_len(desc, bytes.len() as u16);
    fw.arena.set_owner(desc, Owner::Stopped);
    raise(fw, regs::PTA_REG_INT_FLAG, regs::PTA_INT_FLAG_DN);
    desc
}

/// Mark the head of a TX queue as completed, with optional failure bits.
pub fn complete_tx(fw: &mut MockFw, queue: usize, fail_bits: u16) {
    let head = fw.wlan.tx_queue[queue].head;
    let ctrl = fw.arena.ctrl(head);
    fw.arena.set_ctrl(head, ctrl | fail_bits);
    fw.arena.set_owner(head, Owner::Sw);
}

/// Receive one frame: wrap it in the PLCP head and MAC status tail and
/// complete it on the next free RX descriptor.
pub fn rx_frame(fw: &mut MockFw, frame: &[u8], error: u8) {
    let desc = fw.arena.first_not_owned(&fw.wlan.rx_queue, Owner::Stopped);
    assert_ne!(desc, fw.wlan.rx_queue.terminator, "rx pool exhausted");

    let len = RX_HEAD_LEN + frame.len() + RX_STATUS_LEN;
    {
        let buf = fw.arena.frame_buf_mut(desc);
        buf[..len].fill(0);
        buf[RX_HEAD_LEN..RX_HEAD_LEN + frame.len()].copy_from_slice(frame);
        buf[len - 2] = error;
    }
    fw.arena.set_data_size(desc, len as u16);
    fw.arena.set_total_len(desc, len as u16);
    fw.arena.set_owner(desc, Owner::Stopped);
}

/// The most recent TX status record the host received.
pub fn last_status(host: &MockHost) -> TxStatus {
    let (_, ext, payload) = host
        .responses
        .iter()
        .rev()
        .find(|(tag, _, _)| *tag == ResponseTag::TxComp)
        .expect("no tx status response");
    let n = (*ext as usize - 1) * 2;
    TxStatus::from_bits(u16::from_le_bytes([payload[n], payload[n + 1]]))
}

//! WLAN RX path.
//!
//! Received frames arrive on the RX descriptor rotation wrapped in the PLCP
//! head and the MAC status tail. The firmware classifies each frame and
//! either forwards it to the host upload queue or drops it straight back
//! into the rotation, depending on the host-programmed receive filter.
//! BlockAckReqs additionally have their reply context captured on the way.

use macro_bits::bit;

use crate::config::{BAR_CACHE_NUM, RX_MAX_FRAME_LEN};
use crate::dma::{DescId, Owner};
use crate::fw::Firmware;
use crate::hostif::HostTransport;
use crate::mmio::Mmio;
use crate::regs;
use crate::wire::{
    self, BarCtx, FrameControl, BAR_LEN, FCS_LEN, STYPE_CTL_BACK, STYPE_CTL_BACK_REQ,
    STYPE_CTL_PSPOLL,
};

/// PLCP head the hardware prepends to every received frame.
pub const RX_HEAD_LEN: usize = 12;

/// MAC status tail: source/destination key index, error, status.
pub const RX_STATUS_LEN: usize = 4;

// Error bits of the MAC status tail.
pub const RX_ERROR_WRONG_RA: u8 = bit!(0);
pub const RX_ERROR_PLCP: u8 = bit!(1);
pub const RX_ERROR_MMIC: u8 = bit!(2);
pub const RX_ERROR_FCS: u8 = bit!(3);
pub const RX_ERROR_DECRYPT: u8 = bit!(4);
pub const RX_ERROR_FATAL: u8 = bit!(5);

// Receive filter classes. The host sets a bit for every class it does NOT
// want forwarded.
pub const RX_FILTER_BAD: u32 = bit!(0);
pub const RX_FILTER_OTHER_RA: u32 = bit!(1);
pub const RX_FILTER_DECRY_FAIL: u32 = bit!(2);
pub const RX_FILTER_CTL_OTHER: u32 = bit!(3);
pub const RX_FILTER_CTL_PSPOLL: u32 = bit!(4);
pub const RX_FILTER_CTL_BACKR: u32 = bit!(5);
pub const RX_FILTER_MGMT: u32 = bit!(6);
pub const RX_FILTER_DATA: u32 = bit!(7);
pub const RX_FILTER_EVERYTHING: u32 = 0xff;

impl<M: Mmio, H: HostTransport> Firmware<M, H> {
    /// MPDU length of a (possibly multi-segment) RX chain, head and status
    /// tail not counted.
    fn rx_mpdu_len(&self, desc: DescId) -> usize {
        let last = self.arena.last(desc);
        let mut total = 0usize;
        let mut id = desc;
        loop {
            total += self.arena.data_size(id) as usize;
            if id == last {
                break;
            }
            id = self.arena.next(id);
        }
        total.saturating_sub(RX_HEAD_LEN + RX_STATUS_LEN)
    }

    fn rx_mac_error(&self, desc: DescId) -> u8 {
        let last = self.arena.last(desc);
        let payload = self.arena.payload(last);
        if payload.len() < RX_STATUS_LEN {
            return RX_ERROR_FATAL;
        }
        payload[payload.len() - 2]
    }

    /// Classify one received chain. Mutates BAR reply state as a side
    /// effect, the filter verdict alone decides forwarding.
    fn wlan_rx_filter(&mut self, desc: DescId) -> u32 {
        let mpdu_len = self.rx_mpdu_len(desc);
        let mac_err = self.rx_mac_error(desc);

        // frame control + one address is the bare minimum to classify
        if mpdu_len < 4 + 6 + FCS_LEN
            || self.arena.total_len(desc) as usize > RX_MAX_FRAME_LEN
            || mac_err & (RX_ERROR_FCS | RX_ERROR_PLCP) != 0
        {
            return RX_FILTER_BAD;
        }

        let mut filter = 0;
        if mac_err & RX_ERROR_WRONG_RA != 0 {
            filter |= RX_FILTER_OTHER_RA;
        }
        if mac_err & RX_ERROR_DECRYPT != 0 {
            filter |= RX_FILTER_DECRY_FAIL;
        }

        let fc = FrameControl::parse(&self.arena.payload(desc)[RX_HEAD_LEN..]);
        if fc.is_data() {
            filter |= RX_FILTER_DATA;
        } else if fc.is_ctl() {
            match fc.stype() {
                STYPE_CTL_PSPOLL => filter |= RX_FILTER_CTL_PSPOLL,
                STYPE_CTL_BACK_REQ => {
                    self.handle_bar(desc, mpdu_len, mac_err);
                    filter |= RX_FILTER_CTL_BACKR;
                }
                // while the host has BARs in flight it has to see the
                // BlockAcks, the firmware cannot do the accounting
                STYPE_CTL_BACK if self.wlan.queued_bar > 0 => {}
                _ => filter |= RX_FILTER_CTL_OTHER,
            }
        } else {
            filter |= RX_FILTER_MGMT;
        }
        filter
    }

    /// Capture the reply context of a BlockAckReq. Only immediate compressed
    /// BlockAck sessions are answered by the firmware.
    fn handle_bar(&mut self, desc: DescId, mpdu_len: usize, mac_err: u8) {
        if mac_err != 0 {
            return;
        }
        if mpdu_len < BAR_LEN + FCS_LEN {
            return;
        }

        let frame = &self.arena.payload(desc)[RX_HEAD_LEN..];
        let control = wire::get_le16(frame, wire::BACK_CTRL_OFF);
        if control & wire::BAR_CTRL_MULTI_TID != 0 || control & wire::BAR_CTRL_COMPRESSED_BA == 0 {
            return;
        }

        let mut ctx = BarCtx {
            control,
            start_seq_num: wire::get_le16(frame, wire::BACK_SSN_OFF),
            phy: self.config.ba_reply_phy,
            ..BarCtx::default()
        };
        ctx.ra
            .copy_from_slice(&frame[wire::BACK_RA_OFF..wire::BACK_RA_OFF + 6]);
        ctx.ta
            .copy_from_slice(&frame[wire::BACK_TA_OFF..wire::BACK_TA_OFF + 6]);

        self.wlan.ba_cache[self.wlan.ba_tail] = ctx;
        self.wlan.ba_tail = (self.wlan.ba_tail + 1) % BAR_CACHE_NUM;
        // on overflow the oldest queued reply is silently replaced
        if self.wlan.queued_ba < BAR_CACHE_NUM {
            self.wlan.queued_ba += 1;
        }
    }

    /// Drain completed RX chains: forward what the filter lets through, feed
    /// the rest straight back to the RX engine.
    pub(crate) fn handle_wlan_rx(&mut self) {
        while let Some(desc) = self
            .arena
            .dequeue_not_owned(&mut self.wlan.rx_queue, Owner::Hw)
        {
            if self.wlan_rx_filter(desc) & self.wlan.rx_filter == 0 {
                self.arena.put(&mut self.pta.up_queue, desc);
                self.up_trigger();
            } else {
                self.arena.reclaim(&mut self.wlan.rx_queue, desc);
                self.wlan_trigger(regs::DMA_TRIGGER_RXQ);
            }
        }
    }
}

//! WLAN TX path.
//!
//! Frames enter through [`Firmware::wlan_tx`], either from the host download
//! queue or from the firmware itself, and leave through
//! [`Firmware::handle_tx_completion`] once the radio is done with them. In
//! between the firmware drives the retry rate ladder, keeps aggregates
//! closed off properly and buffers multicast traffic for the DTIM beacon.

use crate::config::{BAR_CACHE_NUM, NUM_TX_QUEUES, NUM_VIFS, TBTT_DELTA_MS};
use crate::dma::{self, BufId, DescId, Owner};
use crate::fw::{CabTrigger, Firmware, FwError, FwResult, FwTxCallback};
use crate::hostif::HostTransport;
use crate::mmio::{self, Mmio};
use crate::regs;
use crate::superframe::{self, RateInfo, SuperFrame, FRAME_OFF, MAX_RETRY_RATES};
use crate::txstatus::TxStatus;
use crate::wire::{self, FrameControl, BA_LEN, FCS_LEN, FTYPE_CTL, STYPE_CTL_BACK};

/// TX queue of firmware-generated control responses.
const TXQ_VO: usize = 3;

impl<M: Mmio, H: HostTransport> Firmware<M, H> {
    /// Accept one superframe for transmission. CAB frames detour through the
    /// per-interface buffer queue until the next DTIM beacon.
    pub(crate) fn wlan_tx(&mut self, desc: DescId) {
        let (queue, cab, vif, is_bar) = {
            let buf = self.arena.frame_buf_mut(desc);
            let mut sf = SuperFrame::new(buf);
            sf.set_rix(0);
            sf.set_cnt(1);
            let is_bar = FrameControl::parse(sf.frame()).is_back_req();
            (sf.queue(), sf.cab(), sf.vif() % NUM_VIFS, is_bar)
        };
        if is_bar {
            self.wlan.queued_bar += 1;
        }

        // the radio must not see the superdesc
        self.arena.hide_super(desc);

        if cab {
            self.wlan.cab_queue_len[vif] += 1;
            self.arena.put(&mut self.wlan.cab_queue[vif], desc);
            return;
        }

        self.wlan_tx_prepare(desc);
        self.wlan_tx_enqueue(desc);
        self.wlan_trigger(1 << queue);
    }

    /// Late fixups that have to happen right before the frame goes on air:
    /// sequence numbering and aggregation parameter commits.
    fn wlan_tx_prepare(&mut self, desc: DescId) {
        let (assign_seq, vif, density, factor, commit_density, commit_factor) = {
            let buf = self.arena.frame_buf_mut(desc);
            let sf = SuperFrame::new(buf);
            (
                sf.assign_seq(),
                sf.vif() % NUM_VIFS,
                sf.ampdu_density(),
                sf.ampdu_factor(),
                sf.ampdu_commit_density(),
                sf.ampdu_commit_factor(),
            )
        };

        if assign_seq {
            self.wlan_assign_seq(desc, vif);
        }
        if commit_density {
            let val = (self.mmio.get(regs::MAC_REG_AMPDU_DENSITY) & !0x7) | density as u32;
            self.mmio.set(regs::MAC_REG_AMPDU_DENSITY, val);
        }
        if commit_factor {
            // the register takes the factor as a frame length exponent
            let val = (self.mmio.get(regs::MAC_REG_AMPDU_FACTOR) & !0xffff) | (8u32 << factor);
            self.mmio.set(regs::MAC_REG_AMPDU_FACTOR, val);
        }
    }

    fn wlan_assign_seq(&mut self, desc: DescId, vif: usize) {
        let seq = self.wlan.sequence[vif];
        let frame = &mut self.arena.frame_buf_mut(desc)[FRAME_OFF..];
        wire::set_sequence(frame, seq);
        // fragments share one sequence number
        if wire::is_first_frag(frame) {
            self.wlan.sequence[vif] = seq.wrapping_add(0x10);
        }
    }

    /// Chain the frame into its hardware queue.
    fn wlan_tx_enqueue(&mut self, desc: DescId) {
        let (queue, fill_tsf) = {
            let buf = self.arena.frame_buf_mut(desc);
            let sf = SuperFrame::new(buf);
            (sf.queue(), sf.fill_in_tsf())
        };

        if fill_tsf {
            // probe responses carry the TSF at the top of their body
            let tsf_l = self.mmio.get(regs::MAC_REG_TSF_L);
            let tsf_h = self.mmio.get(regs::MAC_REG_TSF_H);
            let frame = &mut self.arena.frame_buf_mut(desc)[FRAME_OFF..];
            wire::put_le32(frame, 24, tsf_l);
            wire::put_le32(frame, 28, tsf_h);
        }

        self.wlan_tx_ampdu(desc);
        self.arena.put(&mut self.wlan.tx_queue[queue], desc);
    }

    /// Aggregation chaining. Consecutive frames of the same flow stay in one
    /// aggregate; anything else closes the running one with `ba_end`.
    fn wlan_tx_ampdu(&mut self, desc: DescId) {
        let (qidx, ampdu) = {
            let buf = self.arena.frame_buf_mut(desc);
            let sf = SuperFrame::new(buf);
            (sf.queue(), sf.mac().ampdu())
        };

        if !ampdu {
            self.wlan_tx_ampdu_end(qidx);
            return;
        }

        let mut cur_hdr = [0u8; 32];
        {
            let frame = superframe::frame_of(self.arena.frame_buf(desc));
            let n = frame.len().min(32);
            cur_hdr[..n].copy_from_slice(&frame[..n]);
        }

        let prev = self.wlan.ampdu_prev[qidx];
        let same = match prev {
            Some(p) => {
                let prev_frame = superframe::frame_of(self.arena.buf_bytes(p));
                wire::same_aggr(&cur_hdr, prev_frame)
            }
            None => false,
        };

        match prev {
            Some(p) if !same => {
                let buf = self.arena.buf_bytes_mut(p);
                let mut sf = SuperFrame::new(buf);
                let mac = sf.mac().with_ba_end(true);
                sf.set_mac(mac);
            }
            _ => {
                let buf = self.arena.frame_buf_mut(desc);
                let mut sf = SuperFrame::new(buf);
                let mac = sf.mac().with_ba_end(false);
                sf.set_mac(mac);
            }
        }
        self.wlan.ampdu_prev[qidx] = Some(self.arena.buf(desc));
    }

    /// Close the running aggregate on the queue, if any.
    pub(crate) fn wlan_tx_ampdu_end(&mut self, qidx: usize) {
        if let Some(p) = self.wlan.ampdu_prev[qidx].take() {
            let buf = self.arena.buf_bytes_mut(p);
            let mut sf = SuperFrame::new(buf);
            let mac = sf.mac().with_ba_end(true);
            sf.set_mac(mac);
        }
    }

    /// Forget the running aggregate without closing it. Used when the queue
    /// scan starts over; the previous member may already be gone.
    pub(crate) fn wlan_tx_ampdu_reset(&mut self, qidx: usize) {
        self.wlan.ampdu_prev[qidx] = None;
    }

    /// Advance the retry state after a failed attempt. Returns false when
    /// the ladder is exhausted and the frame must be timed out.
    fn wlan_tx_consume_retry(&mut self, desc: DescId) -> bool {
        let buf = self.arena.frame_buf_mut(desc);
        let mut sf = SuperFrame::new(buf);
        let rix = sf.rix() as usize;

        if sf.cnt() >= sf.ri(rix).tries() {
            if rix == MAX_RETRY_RATES {
                return false;
            }
            let rr = sf.rr(rix);
            if rr == 0 {
                return false;
            }
            // step down the ladder
            sf.set_phy(rr);
            let rix = rix + 1;
            sf.set_rix(rix as u8);
            let ri = sf.ri(rix);
            let mac = sf
                .mac()
                .with_erp_prot(ri.erp_prot() & 0x3)
                .with_ampdu(ri.ampdu());
            sf.set_mac(mac);
            sf.set_cnt(1);
        } else {
            sf.set_cnt(sf.cnt() + 1);
        }
        true
    }

    fn wlan_tx_complete(&mut self, desc: DescId, success: bool) {
        let (cookie, queue, rix, cnt) = {
            let buf = self.arena.frame_buf_mut(desc);
            let sf = SuperFrame::new(buf);
            (sf.cookie(), sf.queue(), sf.rix(), sf.cnt())
        };
        let status = TxStatus::new()
            .with_cookie(cookie)
            .with_queue((queue & 0x3) as u8)
            .with_rix(rix & 0x3)
            .with_tries(cnt & 0x7)
            .with_success(success);
        self.wlan.tx_status.push(&mut self.host, status);

        // the cookie is dead once it was reported
        let buf = self.arena.frame_buf_mut(desc);
        SuperFrame::new(buf).set_cookie(0);
    }

    /// Process the completed frame at the head of the queue. Returns false
    /// when the scan of this queue must stop (in-place retry rearm).
    fn wlan_tx_status(&mut self, queue_idx: usize) -> bool {
        let desc = self.wlan.tx_queue[queue_idx].head;
        let qidx = {
            let buf = self.arena.frame_buf_mut(desc);
            SuperFrame::new(buf).queue()
        };
        self.wlan.txq_stall_ticks[qidx] = 0;

        let mut txfail = false;
        let mut success = true;

        let ctrl = self.arena.ctrl(desc);
        if ctrl & dma::CTRL_FAIL_MASK != 0 {
            txfail = ctrl & dma::CTRL_TXFAIL != 0;
            self.arena.set_ctrl(desc, ctrl & !dma::CTRL_FAIL_MASK);

            if self.wlan_tx_consume_retry(desc) {
                let ampdu = {
                    let buf = self.arena.frame_buf_mut(desc);
                    SuperFrame::new(buf).mac().ampdu()
                };
                if !ampdu {
                    // 802.11-2012 8.2.4.1.6, retransmissions carry the flag
                    let frame = &mut self.arena.frame_buf_mut(desc)[FRAME_OFF..];
                    wire::set_frame_control_flags(frame, wire::FCTL_RETRY);
                }

                if txfail {
                    // retry in place; the engine restarts on this very frame
                    self.arena.rearm(desc);
                    self.wlan_txunstuck(qidx);
                    return false;
                } else {
                    // BlockAck shortfall, resubmit through the retry queue
                    self.arena.unlink_head(&mut self.wlan.tx_queue[queue_idx]);
                    self.arena.put(&mut self.wlan.tx_retry, desc);
                    return true;
                }
            } else {
                success = false;
            }
        }

        self.arena.unlink_head(&mut self.wlan.tx_queue[queue_idx]);
        if txfail {
            self.wlan_txunstuck(qidx);
        }
        self.arena.unhide_super(desc);

        if self.arena.buf(desc) == BufId::Ba {
            // the firmware's own frame comes home
            self.wlan.fw_desc = Some(desc);
            if let Some(cb) = self.wlan.fw_desc_callback {
                cb(self.arena.frame_buf_mut(desc), success);
            }
        } else {
            let (cab, vif, is_bar) = {
                let buf = self.arena.frame_buf_mut(desc);
                let sf = SuperFrame::new(buf);
                let is_bar = FrameControl::parse(sf.frame()).is_back_req();
                (sf.cab(), sf.vif() % NUM_VIFS, is_bar)
            };
            if cab {
                self.wlan.cab_queue_len[vif] = self.wlan.cab_queue_len[vif].saturating_sub(1);
            }
            self.wlan_tx_complete(desc, success);
            if is_bar {
                self.wlan.queued_bar = self.wlan.queued_bar.saturating_sub(1);
            }
            self.arena.reclaim(&mut self.pta.down_queue, desc);
            self.down_trigger();
        }
        true
    }

    /// Scan all TX queues for completed frames, highest priority first, and
    /// resubmit whatever the retry queue collected along the way.
    pub(crate) fn handle_tx_completion(&mut self) {
        for i in (0..NUM_TX_QUEUES).rev() {
            loop {
                let q = &self.wlan.tx_queue[i];
                if q.is_empty() || self.arena.owner(q.head) != Owner::Sw {
                    break;
                }
                if !self.wlan_tx_status(i) {
                    break;
                }
            }

            self.wlan_tx_ampdu_reset(i);
            while let Some(desc) = self.arena.unlink_head(&mut self.wlan.tx_retry) {
                self.wlan_tx_enqueue(desc);
            }
            self.wlan_tx_ampdu_end(i);

            if !self.wlan.tx_queue[i].is_empty() {
                self.wlan_trigger(1 << i);
            }
        }
    }

    /// Transmit a firmware-built superframe through the reserved descriptor.
    /// The frame must already sit in the firmware TX buffer.
    pub fn wlan_tx_fw(&mut self, cb: Option<FwTxCallback>) -> FwResult<()> {
        let desc = self.wlan.fw_desc.take().ok_or(FwError::FwSlotBusy)?;
        let len = SuperFrame::peek_len(self.arena.frame_buf(desc));

        self.arena.set_owner(desc, Owner::Sw);
        self.arena.set_ctrl(desc, dma::CTRL_FS | dma::CTRL_LS);
        self.arena.set_total_len(desc, len);
        self.arena.set_data_size(desc, len);
        self.arena.set_next(desc, desc);
        self.arena.set_last(desc, desc);
        self.wlan.fw_desc_callback = cb;

        self.wlan_tx(desc);
        Ok(())
    }

    /// Answer the oldest pending BlockAckReq with an all-zero-bitmap
    /// BlockAck. Needs the firmware descriptor; if it is in flight the
    /// request stays queued for the next janitor round.
    pub(crate) fn wlan_send_buffered_ba(&mut self) {
        if self.wlan.queued_ba == 0 {
            return;
        }
        let Some(desc) = self.wlan.fw_desc else {
            return;
        };

        let ctx = self.wlan.ba_cache[self.wlan.ba_head];
        self.wlan.ba_head = (self.wlan.ba_head + 1) % BAR_CACHE_NUM;
        self.wlan.queued_ba -= 1;

        let len = (FRAME_OFF + BA_LEN) as u16;
        {
            let buf = self.arena.frame_buf_mut(desc);
            buf[..len as usize].fill(0);
            let mut sf = SuperFrame::new(buf);
            sf.set_len(len);
            sf.set_cookie(0);
            sf.set_misc(TXQ_VO, 0, false, false, false);
            sf.set_ri(0, RateInfo::new().with_tries(1));
            sf.set_hw_len((BA_LEN + FCS_LEN) as u16);
            let mac = sf.mac().with_no_ack(true);
            sf.set_mac(mac);
            sf.set_phy(ctx.phy);

            let frame = sf.frame_mut();
            wire::put_le16(
                frame,
                0,
                FrameControl::new()
                    .with_ftype(FTYPE_CTL)
                    .with_stype(STYPE_CTL_BACK)
                    .into_bits(),
            );
            frame[wire::BACK_RA_OFF..wire::BACK_RA_OFF + 6].copy_from_slice(&ctx.ta);
            frame[wire::BACK_TA_OFF..wire::BACK_TA_OFF + 6].copy_from_slice(&ctx.ra);
            wire::put_le16(
                frame,
                wire::BACK_CTRL_OFF,
                ctx.control | wire::BAR_CTRL_ACK_POLICY,
            );
            wire::put_le16(frame, wire::BACK_SSN_OFF, ctx.start_seq_num);
            // bitmap stays all-zero; the peer resends everything
        }

        let _ = self.wlan_tx_fw(None);
    }

    /// Release all buffered CAB frames of the interface into their queues.
    /// Every frame but the last announces more to come.
    fn wlan_cab_flush_queue(&mut self, vif: usize) {
        while let Some(desc) = self.arena.unlink_head(&mut self.wlan.cab_queue[vif]) {
            let more = !self.wlan.cab_queue[vif].is_empty();
            let queue = {
                let buf = self.arena.frame_buf_mut(desc);
                let mut sf = SuperFrame::new(buf);
                let queue = sf.queue();
                let frame = sf.frame_mut();
                if more {
                    wire::set_frame_control_flags(frame, wire::FCTL_MOREDATA);
                } else {
                    wire::clear_frame_control_flags(frame, wire::FCTL_MOREDATA);
                }
                queue
            };
            self.wlan_tx_prepare(desc);
            self.wlan_tx_enqueue(desc);
            self.wlan_trigger(1 << queue);
        }
    }

    /// Flush armed CAB queues once the DTIM beacon had time to go out.
    pub(crate) fn wlan_send_buffered_cab(&mut self) {
        for vif in 0..NUM_VIFS {
            if self.wlan.cab_flush_trigger[vif] == CabTrigger::Armed
                && mmio::is_after_msecs(&self.mmio, self.wlan.cab_flush_time, TBTT_DELTA_MS)
            {
                self.wlan_cab_flush_queue(vif);
                // new arrivals wait for the next DTIM period
                self.wlan.cab_flush_trigger[vif] = CabTrigger::Defer;
            }
        }
    }

    /// Patch the TIM element of the next beacon to match the CAB backlog and
    /// assign the beacon's sequence number.
    pub fn wlan_modify_beacon(&mut self, vif: usize, beacon: &mut [u8]) -> FwResult<()> {
        if vif >= NUM_VIFS {
            return Err(FwError::InvalidVif);
        }
        if beacon.len() < wire::BEACON_IE_OFF + wire::FCS_LEN {
            return Err(FwError::BufferTooShort);
        }

        if let Some(tim) = wire::beacon_find_ie(wire::EID_TIM, beacon) {
            if self.wlan.cab_queue_len[vif] != 0 && beacon[tim + wire::TIM_DTIM_COUNT] == 0 {
                self.wlan.cab_flush_trigger[vif] = CabTrigger::Armed;
            } else if self.wlan.cab_queue_len[vif] == 0
                && self.wlan.cab_flush_trigger[vif] != CabTrigger::Empty
            {
                beacon[tim + wire::TIM_BITMAP_CTRL] &= !wire::TIM_MCAST_BIT;
                self.wlan.cab_flush_trigger[vif] = CabTrigger::Empty;
            }
            if self.wlan.cab_flush_trigger[vif] != CabTrigger::Empty {
                beacon[tim + wire::TIM_BITMAP_CTRL] |= wire::TIM_MCAST_BIT;
            }
        }

        let seq = self.wlan.sequence[vif];
        wire::set_sequence(beacon, seq);
        if wire::is_first_frag(beacon) {
            self.wlan.sequence[vif] = seq.wrapping_add(0x10);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TX_BLOCK_COUNT;
    use crate::mock;

    #[test]
    fn clean_completion_reports_success_and_recycles() {
        let mut fw = mock::boot();
        mock::submit(&mut fw, &mock::data_superframe(2, 0x55, &[0; 40]));
        assert_eq!(fw.arena.queue_len(&fw.wlan.tx_queue[2]), 1);
        assert_eq!(fw.mmio.get(regs::MAC_REG_DMA_TRIGGER), 1 << 2);

        mock::complete_tx(&mut fw, 2, 0);
        fw.handle_tx_completion();

        assert!(fw.wlan.tx_queue[2].is_empty());
        assert_eq!(fw.arena.queue_len(&fw.pta.down_queue), TX_BLOCK_COUNT);
        fw.wlan.tx_status.flush(&mut fw.host);
        let status = mock::last_status(&fw.host);
        assert_eq!(status.cookie(), 0x55);
        assert_eq!(status.queue(), 2);
        assert!(status.success());
        assert_eq!(status.tries(), 1);
    }

    #[test]
    fn tx_failure_retries_in_place_and_unstucks_the_queue() {
        let mut fw = mock::boot();
        let mut sf = mock::data_superframe(1, 0x10, &[0; 40]);
        mock::set_ri_tries(&mut sf, 0, 3);
        mock::submit(&mut fw, &sf);

        mock::complete_tx(&mut fw, 1, dma::CTRL_TXFAIL);
        fw.handle_tx_completion();

        // still at the head, rearmed for the hardware, cnt stepped
        let head = fw.wlan.tx_queue[1].head;
        assert_eq!(fw.arena.owner(head), Owner::Hw);
        assert_eq!(fw.arena.ctrl(head) & dma::CTRL_FAIL_MASK, 0);
        let buf = fw.arena.frame_buf_mut(head);
        let sf = SuperFrame::new(buf);
        assert_eq!(sf.cnt(), 2);
        assert_eq!(sf.rix(), 0);
        // retransmission flag set, queue pointer rewritten with the busy tag
        assert_ne!(wire::get_le16(sf.frame(), 0) & wire::FCTL_RETRY, 0);
        assert_eq!(
            fw.mmio.get(regs::dma_txq_addr(1)),
            fw.wlan.tx_queue[1].head.to_reg() | 1
        );
    }

    #[test]
    fn exhausted_ladder_times_the_frame_out() {
        let mut fw = mock::boot();
        // one try, no alternative rates
        mock::submit(&mut fw, &mock::data_superframe(0, 0x77, &[0; 40]));

        mock::complete_tx(&mut fw, 0, dma::CTRL_TXFAIL);
        fw.handle_tx_completion();

        assert!(fw.wlan.tx_queue[0].is_empty());
        fw.wlan.tx_status.flush(&mut fw.host);
        let status = mock::last_status(&fw.host);
        assert_eq!(status.cookie(), 0x77);
        assert!(!status.success());
    }

    #[test]
    fn ladder_steps_to_the_next_rate() {
        let mut fw = mock::boot();
        let mut sf = mock::data_superframe(0, 0x33, &[0; 40]);
        mock::set_ri_tries(&mut sf, 0, 1);
        mock::set_ri_tries(&mut sf, 1, 2);
        mock::set_rr(&mut sf, 0, 0xdead_0000);
        mock::submit(&mut fw, &sf);

        mock::complete_tx(&mut fw, 0, dma::CTRL_TXFAIL);
        fw.handle_tx_completion();

        let head = fw.wlan.tx_queue[0].head;
        let buf = fw.arena.frame_buf_mut(head);
        let sf = SuperFrame::new(buf);
        assert_eq!(sf.rix(), 1);
        assert_eq!(sf.cnt(), 1);
        assert_eq!(sf.phy().into_bits(), 0xdead_0000);
    }

    #[test]
    fn in_place_retry_holds_back_later_completions() {
        let mut fw = mock::boot();
        let mut first = mock::data_superframe(0, 0x61, &[0; 40]);
        mock::set_ri_tries(&mut first, 0, 2);
        mock::submit(&mut fw, &first);
        mock::submit(&mut fw, &mock::data_superframe(0, 0x62, &[0; 40]));

        // both frames come back, the first with a plain failure and a try left
        mock::complete_tx(&mut fw, 0, dma::CTRL_TXFAIL);
        let second = fw.arena.next(fw.arena.last(fw.wlan.tx_queue[0].head));
        fw.arena.set_owner(second, Owner::Sw);
        fw.handle_tx_completion();

        // the retrying head blocks the scan; nothing is reported yet
        assert_eq!(fw.wlan.tx_status.pending(), 0);
        assert_eq!(fw.arena.queue_len(&fw.wlan.tx_queue[0]), 2);

        // the retry fails terminally, then the second frame drains behind it
        mock::complete_tx(&mut fw, 0, dma::CTRL_TXFAIL);
        fw.handle_tx_completion();
        fw.wlan.tx_status.flush(&mut fw.host);

        let (_, count, payload) = fw.host.responses.last().unwrap();
        assert_eq!(*count, 2);
        let s1 = TxStatus::from_bits(u16::from_le_bytes([payload[0], payload[1]]));
        let s2 = TxStatus::from_bits(u16::from_le_bytes([payload[2], payload[3]]));
        assert_eq!(s1.cookie(), 0x61);
        assert!(!s1.success());
        assert_eq!(s2.cookie(), 0x62);
        assert!(s2.success());
    }

    #[test]
    fn ba_failure_goes_through_the_retry_queue() {
        let mut fw = mock::boot();
        let mut sf = mock::data_superframe(2, 0x44, &mock::qos_frame(1));
        mock::set_ri_tries(&mut sf, 0, 3);
        mock::set_ampdu(&mut sf);
        mock::submit(&mut fw, &sf);

        mock::complete_tx(&mut fw, 2, dma::CTRL_BAFAIL);
        fw.handle_tx_completion();

        // resubmitted behind the completion scan, hardware kicked again
        assert_eq!(fw.arena.queue_len(&fw.wlan.tx_queue[2]), 1);
        assert!(fw.wlan.tx_retry.is_empty());
        let head = fw.wlan.tx_queue[2].head;
        let buf = fw.arena.frame_buf_mut(head);
        let sf = SuperFrame::new(buf);
        assert_eq!(sf.cnt(), 2);
        // aggregated frames never carry the retry flag
        assert_eq!(wire::get_le16(sf.frame(), 0) & wire::FCTL_RETRY, 0);
    }

    #[test]
    fn aggregates_chain_and_close() {
        let mut fw = mock::boot();
        let mut a = mock::data_superframe(1, 1, &mock::qos_frame(5));
        mock::set_ampdu(&mut a);
        let mut b = mock::data_superframe(1, 2, &mock::qos_frame(5));
        mock::set_ampdu(&mut b);
        let mut c = mock::data_superframe(1, 3, &mock::qos_frame(7));
        mock::set_ampdu(&mut c);

        mock::submit(&mut fw, &a);
        let first = fw.arena.buf(fw.wlan.tx_queue[1].head);
        mock::submit(&mut fw, &b);
        // same TID, the first frame stays open
        {
            let buf = fw.arena.buf_bytes_mut(first);
            assert!(!SuperFrame::new(buf).mac().ba_end());
        }
        let second = fw.wlan.ampdu_prev[1].unwrap();
        mock::submit(&mut fw, &c);
        // TID change closes the previous member
        {
            let buf = fw.arena.buf_bytes_mut(second);
            assert!(SuperFrame::new(buf).mac().ba_end());
        }

        let third = fw.wlan.ampdu_prev[1].unwrap();
        fw.wlan_tx_ampdu_end(1);
        let buf = fw.arena.buf_bytes_mut(third);
        assert!(SuperFrame::new(buf).mac().ba_end());
        assert!(fw.wlan.ampdu_prev[1].is_none());
    }

    #[test]
    fn sequence_numbers_step_per_interface() {
        let mut fw = mock::boot();
        let mut sf = mock::data_superframe(0, 1, &[0; 40]);
        mock::set_assign_seq(&mut sf);
        mock::submit(&mut fw, &sf);
        mock::submit(&mut fw, &sf);

        assert_eq!(fw.wlan.sequence[0], 0x20);
        let head = fw.wlan.tx_queue[0].head;
        let frame = &fw.arena.frame_buf(head)[FRAME_OFF..];
        // the head is the first submission, which took 0x0
        assert_eq!(wire::get_le16(frame, wire::SEQ_CTRL_OFF), 0x0);
    }

    #[test]
    fn cab_frames_wait_for_the_dtim_beacon() {
        let mut fw = mock::boot();
        let mut sf = mock::data_superframe(0, 9, &[0; 40]);
        mock::set_cab(&mut sf, 0);
        mock::submit(&mut fw, &sf);
        mock::submit(&mut fw, &sf);

        assert!(fw.wlan.tx_queue[0].is_empty());
        assert_eq!(fw.wlan.cab_queue_len[0], 2);

        // DTIM beacon goes out: announce and arm
        let mut beacon = mock::beacon_with_tim(0);
        fw.wlan_modify_beacon(0, &mut beacon).unwrap();
        let tim = wire::beacon_find_ie(wire::EID_TIM, &beacon).unwrap();
        assert_ne!(beacon[tim + wire::TIM_BITMAP_CTRL] & wire::TIM_MCAST_BIT, 0);
        assert_eq!(fw.wlan.cab_flush_trigger[0], CabTrigger::Armed);

        // flush window not reached yet
        fw.wlan.cab_flush_time = mmio::clock_counter(&fw.mmio);
        fw.wlan_send_buffered_cab();
        assert_eq!(fw.wlan.cab_queue_len[0], 2);

        // after the window the queue drains, MOREDATA on all but the last
        mock::advance_clock(&mut fw, (TBTT_DELTA_MS + 1) * 1000);
        fw.wlan_send_buffered_cab();
        assert!(fw.wlan.cab_queue[0].is_empty());
        assert_eq!(fw.arena.queue_len(&fw.wlan.tx_queue[0]), 2);
        assert_eq!(fw.wlan.cab_flush_trigger[0], CabTrigger::Defer);

        let first = fw.wlan.tx_queue[0].head;
        let second = fw.arena.next(fw.arena.last(first));
        let f1 = &fw.arena.frame_buf(first)[FRAME_OFF..];
        assert_ne!(wire::get_le16(f1, 0) & wire::FCTL_MOREDATA, 0);
        let f2 = &fw.arena.frame_buf(second)[FRAME_OFF..];
        assert_eq!(wire::get_le16(f2, 0) & wire::FCTL_MOREDATA, 0);
    }

    #[test]
    fn empty_cab_backlog_clears_the_tim_mcast_bit() {
        let mut fw = mock::boot();
        fw.wlan.cab_flush_trigger[0] = CabTrigger::Defer;
        let mut beacon = mock::beacon_with_tim(0);
        let tim = wire::beacon_find_ie(wire::EID_TIM, &beacon).unwrap();
        beacon[tim + wire::TIM_BITMAP_CTRL] |= wire::TIM_MCAST_BIT;

        fw.wlan_modify_beacon(0, &mut beacon).unwrap();

        assert_eq!(beacon[tim + wire::TIM_BITMAP_CTRL] & wire::TIM_MCAST_BIT, 0);
        assert_eq!(fw.wlan.cab_flush_trigger[0], CabTrigger::Empty);
    }

    #[test]
    fn buffered_ba_reply_round_trip() {
        let mut fw = mock::boot();
        let ctx = wire::BarCtx {
            ta: [1, 1, 1, 1, 1, 1],
            ra: [2, 2, 2, 2, 2, 2],
            start_seq_num: 0x120,
            control: wire::BAR_CTRL_COMPRESSED_BA,
            phy: fw.config.ba_reply_phy,
        };
        fw.wlan.ba_cache[0] = ctx;
        fw.wlan.ba_tail = 1;
        fw.wlan.queued_ba = 1;

        fw.wlan_send_buffered_ba();

        assert_eq!(fw.wlan.queued_ba, 0);
        assert!(fw.wlan.fw_desc.is_none());
        let head = fw.wlan.tx_queue[TXQ_VO].head;
        assert_eq!(fw.arena.buf(head), BufId::Ba);
        let frame = &fw.arena.frame_buf(head)[FRAME_OFF..];
        let fc = FrameControl::parse(frame);
        assert!(fc.is_ctl());
        assert_eq!(fc.stype(), STYPE_CTL_BACK);
        assert_eq!(&frame[wire::BACK_RA_OFF..wire::BACK_RA_OFF + 6], &ctx.ta);
        assert_eq!(&frame[wire::BACK_TA_OFF..wire::BACK_TA_OFF + 6], &ctx.ra);
        assert_eq!(wire::get_le16(frame, wire::BACK_SSN_OFF), 0x120);
        assert_ne!(
            wire::get_le16(frame, wire::BACK_CTRL_OFF) & wire::BAR_CTRL_ACK_POLICY,
            0
        );
        // zero bitmap
        assert_eq!(
            &frame[wire::BA_BITMAP_OFF..wire::BA_BITMAP_OFF + 8],
            &[0; 8]
        );

        // completion hands the descriptor back
        mock::complete_tx(&mut fw, TXQ_VO, 0);
        fw.handle_tx_completion();
        assert!(fw.wlan.fw_desc.is_some());
        assert_eq!(fw.wlan.tx_status.pending(), 0);
    }

    #[test]
    fn fw_tx_slot_is_exclusive() {
        let mut fw = mock::boot();
        let desc = fw.wlan.fw_desc.unwrap();
        {
            let buf = fw.arena.frame_buf_mut(desc);
            buf[..64].fill(0);
            let mut sf = SuperFrame::new(buf);
            sf.set_len(64);
            sf.set_misc(TXQ_VO, 0, false, false, false);
        }
        fw.wlan_tx_fw(None).unwrap();
        assert_eq!(fw.wlan_tx_fw(None), Err(FwError::FwSlotBusy));
    }
}

//! WLAN interrupt dispatch and watchdog duties.
//!
//! One [`Firmware::handle_wlan`] call per main-loop tick: ack and dispatch
//! the MAC interrupts, then run the janitor for everything that is buffered
//! rather than interrupt-driven. The timer path watches the TX engines for
//! stalls and escalates from pointer bumps to a full MAC reset.

use crate::config::{
    NUM_TX_QUEUES, QUEUE_BUMP_THRESHOLD, QUEUE_DUMP_THRESHOLD, QUEUE_RESET_THRESHOLD,
};
use crate::dma::Owner;
use crate::fw::Firmware;
use crate::hostif::{HostTransport, ResponseTag};
use crate::mmio::{self, Mmio};
use crate::regs;
use crate::superframe::{SuperFrame, MAX_RETRY_RATES};

/// Escalations needed before the MAC is reset.
const MAC_RESET_THRESHOLD: u32 = 2;

impl<M: Mmio, H: HostTransport> Firmware<M, H> {
    pub(crate) fn wlan_trigger(&mut self, queue_bits: u32) {
        self.mmio.set(regs::MAC_REG_DMA_TRIGGER, queue_bits);
    }

    /// Restart the queue's DMA engine on the current head, with the busy tag
    /// set so the engine skips its stale internal state.
    pub(crate) fn wlan_txunstuck(&mut self, qidx: usize) {
        self.mmio.set(
            regs::dma_txq_addr(qidx),
            self.wlan.tx_queue[qidx].head.to_reg() | 1,
        );
        self.wlan_trigger(1 << qidx);
    }

    fn wlan_txupdate(&mut self, qidx: usize) {
        self.mmio
            .set(regs::dma_txq_addr(qidx), self.wlan.tx_queue[qidx].head.to_reg());
        self.wlan_trigger(1 << qidx);
    }

    fn handle_pretbtt(&mut self) {
        self.wlan.cab_flush_time = mmio::clock_counter(&self.mmio);
        self.host.send_response(ResponseTag::Pretbtt, 0, &[]);
    }

    fn handle_atim(&mut self) {
        self.host.send_response(ResponseTag::Atim, 0, &[]);
    }

    fn handle_radar(&mut self) {
        self.host.send_response(ResponseTag::Radar, 0, &[]);
    }

    /// The beacon fifo wants fresh content; tell the host how many beacons
    /// went out and release the update window.
    fn handle_beacon_config(&mut self) {
        let bcn_count = self.mmio.get(regs::MAC_REG_BCN_COUNT);
        self.host
            .send_response(ResponseTag::BeaconConfig, 0, &bcn_count.to_le_bytes());
        self.mmio.set(regs::MAC_REG_BCN_CTRL, regs::BCN_CTRL_READY);
    }

    /// Deferred work that does not ride on an interrupt line.
    fn wlan_janitor(&mut self) {
        self.wlan_send_buffered_cab();
        self.wlan.tx_status.flush(&mut self.host);
        self.wlan_send_buffered_ba();
    }

    pub(crate) fn handle_wlan(&mut self) {
        let mut intr = self.mmio.get(regs::MAC_REG_INT_CTRL);
        // ack
        self.mmio.set(regs::MAC_REG_INT_CTRL, intr);

        intr |= self.wlan.soft_int;
        self.wlan.soft_int = 0;

        if intr & regs::MAC_INT_PRETBTT != 0 {
            intr &= !regs::MAC_INT_PRETBTT;
            self.handle_pretbtt();
        }
        if intr & regs::MAC_INT_ATIM != 0 {
            intr &= !regs::MAC_INT_ATIM;
            self.handle_atim();
        }
        if intr & regs::MAC_INT_RXC != 0 {
            intr &= !regs::MAC_INT_RXC;
            self.handle_wlan_rx();
        }
        if intr & (regs::MAC_INT_TXC | regs::MAC_INT_RETRY_FAIL) != 0 {
            intr &= !(regs::MAC_INT_TXC | regs::MAC_INT_RETRY_FAIL);
            self.handle_tx_completion();
        }
        if intr & regs::MAC_INT_QOS != 0 {
            intr &= !regs::MAC_INT_QOS;
            debug!("qos interrupt");
        }
        if intr & regs::MAC_INT_RADAR != 0 {
            intr &= !regs::MAC_INT_RADAR;
            self.handle_radar();
        }
        if intr & regs::MAC_INT_CFG_BCN != 0 {
            intr &= !regs::MAC_INT_CFG_BCN;
            self.handle_beacon_config();
        }
        if intr != 0 {
            debug!("unhandled wlan interrupts {:x}", intr);
        }

        self.wlan_janitor();
    }

    // --- stall surveillance -------------------------------------------------

    /// Compare every busy TX engine against its last known position and
    /// escalate the ones that stopped making progress.
    fn wlan_check_hang(&mut self) {
        for i in (0..NUM_TX_QUEUES).rev() {
            if self.wlan.tx_queue[i].is_empty() {
                continue;
            }

            let pos = self.mmio.get(regs::dma_txq_addr_curr(i));
            if pos == self.wlan.last_txq_addr[i] {
                self.wlan.txq_stall_ticks[i] += 1;
                let ticks = self.wlan.txq_stall_ticks[i];

                if ticks >= QUEUE_RESET_THRESHOLD {
                    self.wlan.mac_reset += 1;
                    continue;
                }
                if ticks >= QUEUE_DUMP_THRESHOLD {
                    self.wlan_dump_queue(i);
                }
                if ticks >= QUEUE_BUMP_THRESHOLD {
                    self.wlan_dma_bump(i);
                }
            } else {
                self.wlan.txq_stall_ticks[i] = 0;
                self.wlan.last_txq_addr[i] = pos;
            }
        }
    }

    /// Nudge a stalled queue. The status/trigger nibble pair distinguishes
    /// an engine that lost its restart edge from one that is merely slow.
    fn wlan_dma_bump(&mut self, qidx: usize) {
        let status = (self.mmio.get(regs::MAC_REG_DMA_STATUS) >> (12 + 4 * qidx)) & 0xf;
        let trigger = (self.mmio.get(regs::MAC_REG_DMA_TRIGGER) >> (12 + 4 * qidx)) & 0xf;

        if trigger == 0xa && status == 0x8 {
            debug!("txq{} stuck, restarting with the busy tag", qidx);
            self.wlan_txunstuck(qidx);
        } else {
            debug!("txq{} stalled, rewriting the head pointer", qidx);
            self.wlan_txupdate(qidx);
        }
    }

    fn wlan_dump_queue(&mut self, qidx: usize) {
        let mut id = self.wlan.tx_queue[qidx].head;
        while id != self.wlan.tx_queue[qidx].terminator {
            debug!(
                "txq{} desc {} status {:x} ctrl {:x} size {}",
                qidx,
                id.0,
                self.arena.status(id),
                self.arena.ctrl(id),
                self.arena.data_size(id)
            );
            id = self.arena.next(id);
        }
        debug!(
            "txq{} addr {:x} curr {:x} status {:x} trigger {:x}",
            qidx,
            self.mmio.get(regs::dma_txq_addr(qidx)),
            self.mmio.get(regs::dma_txq_addr_curr(qidx)),
            self.mmio.get(regs::MAC_REG_DMA_STATUS),
            self.mmio.get(regs::MAC_REG_DMA_TRIGGER)
        );
    }

    /// A receiver that only ever overruns is wedged, not busy.
    fn wlan_check_rx_overrun(&mut self) {
        let total = self.mmio.get(regs::MAC_REG_RX_TOTAL);
        let overruns = self.mmio.get(regs::MAC_REG_RX_OVERRUN);
        self.wlan.rx_total = self.wlan.rx_total.wrapping_add(total);
        self.wlan.rx_overruns = self.wlan.rx_overruns.wrapping_add(overruns);

        if overruns != 0 {
            if overruns == total {
                warning!("rx overrun, scheduling mac reset");
                self.wlan.mac_reset += 1;
            }
            self.wlan_trigger(regs::DMA_TRIGGER_RXQ);
        }
    }

    /// Housekeeping timer tick. A reset request has to persist across two
    /// consecutive ticks before the hammer falls; a single spurious one
    /// decays.
    pub(crate) fn wlan_timer(&mut self) {
        let cached = self.wlan.mac_reset;

        self.wlan_check_hang();
        self.wlan_check_rx_overrun();

        if self.wlan.mac_reset >= MAC_RESET_THRESHOLD {
            self.wlan_mac_reset();
        } else if self.wlan.mac_reset != 0 && cached == self.wlan.mac_reset {
            self.wlan.mac_reset -= 1;
        }
    }

    /// Power-cycle the MAC around its sticky registers, then re-anchor every
    /// DMA engine on the first frame the hardware still owes us.
    fn wlan_mac_reset(&mut self) {
        warning!("mac reset");

        const STICKY: [u32; 9] = [
            regs::MAC_REG_AMPDU_FACTOR,
            regs::MAC_REG_AMPDU_DENSITY,
            regs::MAC_REG_BCN_ADDR,
            regs::MAC_REG_CAM_MODE,
            regs::MAC_REG_CAM_ROLL_CALL_TBL_L,
            regs::MAC_REG_CAM_ROLL_CALL_TBL_H,
            regs::MAC_REG_ACK_TPC,
            regs::MAC_REG_RTS_CTS_TPC,
            regs::MAC_REG_RTS_CTS_RATE,
        ];
        let mut saved = [0u32; STICKY.len()];
        for (slot, reg) in saved.iter_mut().zip(STICKY) {
            *slot = self.mmio.get(reg);
        }

        self.mmio
            .orl(regs::MAC_REG_POWER_STATE_CTRL, regs::MAC_POWER_STATE_CTRL_RESET);
        mmio::delay(&self.mmio, 2);

        for (slot, reg) in saved.iter().zip(STICKY) {
            self.mmio.set(reg, *slot);
        }

        for i in 0..NUM_TX_QUEUES {
            if self.wlan.txq_stall_ticks[i] >= QUEUE_RESET_THRESHOLD
                && !self.wlan.tx_queue[i].is_empty()
            {
                // time the wedged frame out on its next completion
                let head = self.wlan.tx_queue[i].head;
                let buf = self.arena.frame_buf_mut(head);
                let mut sf = SuperFrame::new(buf);
                sf.set_rix(MAX_RETRY_RATES as u8);
                sf.set_cnt(0xff);
            }
            self.wlan.txq_stall_ticks[i] = 0;

            // skip past everything already completed
            let anchor = self.arena.first_not_owned(&self.wlan.tx_queue[i], Owner::Sw);
            self.mmio.set(regs::dma_txq_addr(i), anchor.to_reg());
            self.wlan.last_txq_addr[i] = self.mmio.get(regs::dma_txq_addr_curr(i));
            if anchor != self.wlan.tx_queue[i].terminator {
                self.wlan_trigger(1 << i);
            }
        }

        // replay everything that might have been lost in the blackout
        self.wlan.soft_int |= regs::MAC_INT_RXC | regs::MAC_INT_TXC | regs::MAC_INT_RETRY_FAIL;

        self.mmio
            .set(regs::MAC_REG_DMA_RXQ_ADDR, self.wlan.rx_queue.head.to_reg());
        self.wlan_trigger(regs::DMA_TRIGGER_RXQ);
        self.wlan.mac_reset = 0;
    }
}

//! Host interface.
//!
//! Frames travel between host and firmware over two DMA queues: the down
//! queue carries TX superframes from the host, the up queue carries received
//! frames and command responses back. Out-of-band messages (TX status
//! batches, event notifications) go through the [`HostTransport`]
//! collaborator, which stands in for the transport's command endpoint.

use macro_bits::serializable_enum;

use crate::dma::{BufId, Owner};
use crate::fw::Firmware;
use crate::mmio::Mmio;
use crate::regs;
use crate::superframe::{SuperFrame, SUPERDESC_LEN};
use crate::txstatus::TxStatus;

serializable_enum! {
    /// Tags of firmware-to-host messages.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum ResponseTag: u8 {
        #[default]
        Pretbtt => 0xc0,
        TxComp => 0xc1,
        BeaconConfig => 0xc2,
        Atim => 0xc3,
        Radar => 0xc4
    }
}

/// Out-of-band message channel to the host.
pub trait HostTransport {
    /// Send one response message. `ext` carries tag-specific extra data
    /// (e.g. the record count of a TX status batch).
    fn send_response(&mut self, tag: ResponseTag, ext: u8, payload: &[u8]);

    /// Transport housekeeping hook, run once per main-loop tick after the
    /// host interface queues have been drained.
    fn poll(&mut self) {}
}

impl<M: Mmio, H: HostTransport> Firmware<M, H> {
    pub(crate) fn down_trigger(&mut self) {
        self.mmio.set(regs::PTA_REG_DN_DMA_TRIGGER, 1);
    }

    pub(crate) fn up_trigger(&mut self) {
        self.mmio.set(regs::PTA_REG_UP_DMA_TRIGGER, 1);
    }

    /// Whether the claimed superframe length survived the transfer. The
    /// hardware rounds transfer lengths up to 4 bytes, so only gross
    /// mismatches (clipped transfers) are detectable.
    fn length_check(&self, desc: crate::dma::DescId) -> bool {
        let total = self.arena.total_len(desc);
        if (total as usize) < SUPERDESC_LEN {
            return false;
        }
        SuperFrame::peek_len(self.arena.payload(desc)) <= total
    }

    /// Drain completed downloads: validate each superframe and hand it to
    /// the TX path. A clipped frame cannot be transmitted; its descriptor
    /// goes straight back into the rotation, with a failure status for the
    /// host when the superdesc header is still intact.
    fn handle_download(&mut self) {
        // Completed descriptors are normally Stopped, but an undocumented
        // hardware case leaves them Sw; filter on "not Hw".
        while let Some(desc) = self
            .arena
            .dequeue_not_owned(&mut self.pta.down_queue, Owner::Hw)
        {
            if !self.length_check(desc) {
                warning!(
                    "download length check failed, totalLen {}",
                    self.arena.total_len(desc)
                );
                if self.arena.total_len(desc) as usize >= SUPERDESC_LEN {
                    let buf = self.arena.payload_mut(desc);
                    let sf = SuperFrame::new(buf);
                    let status = TxStatus::new()
                        .with_cookie(sf.cookie())
                        .with_queue(sf.queue() as u8)
                        .with_success(false);
                    self.wlan.tx_status.push(&mut self.host, status);
                }
                self.arena.reclaim(&mut self.pta.down_queue, desc);
                self.down_trigger();
                continue;
            }

            self.wlan_tx(desc);
        }
    }

    /// Drain completed uploads. The response buffer descriptor returns to
    /// the command path; everything else was a forwarded RX frame whose
    /// descriptor rejoins the RX ring.
    fn handle_upload(&mut self) {
        while let Some(desc) = self
            .arena
            .dequeue_not_owned(&mut self.pta.up_queue, Owner::Hw)
        {
            // Descriptor identity shuffles on every queue append; only the
            // payload buffer identifies the response descriptor.
            if self.arena.buf(desc) == BufId::Rsp {
                self.wlan.rsp_desc = Some(desc);
            } else {
                self.arena.reclaim(&mut self.wlan.rx_queue, desc);
                self.wlan_trigger(regs::DMA_TRIGGER_RXQ);
            }
        }
    }

    /// Host interface tick: read and ack the transfer interrupt flags, then
    /// drain whatever finished.
    pub fn handle_host_interface(&mut self) {
        let pta_int = self.mmio.get(regs::PTA_REG_INT_FLAG);
        self.mmio.set(regs::PTA_REG_INT_FLAG, pta_int);

        if pta_int & regs::PTA_INT_FLAG_DN != 0 {
            self.handle_download();
        }
        if pta_int & regs::PTA_INT_FLAG_UP != 0 {
            self.handle_upload();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use crate::txstatus::TxStatus;

    #[test]
    fn download_forwards_valid_superframes() {
        let mut fw = mock::boot();
        let bytes = mock::data_superframe(1, 0x11, &[0; 40]);
        mock::host_download(&mut fw, &bytes);

        fw.handle_host_interface();

        // the frame sits in TX queue 1, superdesc hidden
        assert_eq!(fw.arena.queue_len(&fw.wlan.tx_queue[1]), 1);
        let head = fw.wlan.tx_queue[1].head;
        assert_eq!(fw.arena.payload(head).len(), bytes.len() - SUPERDESC_LEN);
    }

    #[test]
    fn clipped_download_is_reported_and_reclaimed() {
        let mut fw = mock::boot();
        let mut sf = mock::data_superframe(0, 0x2a, &[0; 40]);
        // claim more than was transferred
        sf[0] = 0xff;
        sf[1] = 0x01;
        let down_len = fw.arena.queue_len(&fw.pta.down_queue);
        mock::host_download(&mut fw, &sf);

        fw.handle_host_interface();

        // back in the rotation, nothing queued for TX
        assert_eq!(fw.arena.queue_len(&fw.pta.down_queue), down_len);
        assert!(fw.wlan.tx_queue[0].is_empty());
        fw.wlan.tx_status.flush(&mut fw.host);
        let (_, count, payload) = &fw.host.responses[0];
        assert_eq!(*count, 1);
        let status = TxStatus::from_bits(u16::from_le_bytes([payload[0], payload[1]]));
        assert_eq!(status.cookie(), 0x2a);
        assert!(!status.success());
    }

    #[test]
    fn runt_download_is_reclaimed_silently() {
        let mut fw = mock::boot();
        let down_len = fw.arena.queue_len(&fw.pta.down_queue);
        let desc = fw.pta.down_queue.head;
        fw.arena.set_total_len(desc, 8); // shorter than a superdesc
        fw.arena.set_data_size(desc, 8);
        fw.arena.set_owner(desc, crate::dma::Owner::Stopped);
        mock::raise(&mut fw, regs::PTA_REG_INT_FLAG, regs::PTA_INT_FLAG_DN);

        fw.handle_host_interface();

        assert_eq!(fw.arena.queue_len(&fw.pta.down_queue), down_len);
        assert_eq!(fw.wlan.tx_status.pending(), 0);
    }

    #[test]
    fn upload_recognizes_the_response_descriptor_by_payload() {
        let mut fw = mock::boot();
        // queue the response descriptor plus one RX frame for upload
        let rsp = fw.wlan.rsp_desc.take().unwrap();
        fw.arena.set_owner(rsp, crate::dma::Owner::Stopped);
        fw.arena.put(&mut fw.pta.up_queue, rsp);

        let rx = fw.arena.dequeue_owned(&mut fw.wlan.rx_queue, crate::dma::Owner::Hw).unwrap();
        fw.arena.set_owner(rx, crate::dma::Owner::Stopped);
        let rx_len = fw.arena.queue_len(&fw.wlan.rx_queue);
        fw.arena.put(&mut fw.pta.up_queue, rx);

        mock::raise(&mut fw, regs::PTA_REG_INT_FLAG, regs::PTA_INT_FLAG_UP);
        fw.handle_host_interface();

        assert!(fw.wlan.rsp_desc.is_some());
        assert_eq!(fw.arena.buf(fw.wlan.rsp_desc.unwrap()), BufId::Rsp);
        // the RX frame descriptor went back to the RX ring, rearmed
        assert_eq!(fw.arena.queue_len(&fw.wlan.rx_queue), rx_len + 1);
        assert!(fw.pta.up_queue.is_empty());
    }
}

//! TX superframe layout.
//!
//! Every frame the host hands down for transmission is a superframe: the
//! firmware-private superdesc (rate ladder, cookie, queue routing), followed
//! by the hardware TX descriptor (length plus MAC/PHY control words),
//! followed by the 802.11 frame itself. The superdesc never reaches the
//! radio; [`crate::dma::Arena::hide_super`] moves the payload window past it
//! before the frame enters a TX queue.
//!
//! Layout, all fields little endian:
//!
//! ```text
//!  0  len            total superframe length claimed by the host
//!  2  rix            current rate ladder index
//!  3  cnt            tries so far at the current rate
//!  4  cookie         host frame lookup token
//!  5  ampdu          density/factor and their commit flags
//!  6  misc           queue, vif, cab/seq/tsf flags
//!  7  (pad)
//!  8  ri[4]          per-rate info: tries, erp_prot, ampdu
//! 12  rr[3]          alternative PHY vectors for the retry ladder
//! 24  hw length      frame length incl. FCS, as the radio counts it
//! 26  hw mac         MAC control word
//! 28  hw phy         PHY vector
//! 32  frame          802.11 frame
//! ```

use bitfield_struct::bitfield;

use crate::wire;

/// Bytes of the firmware-private superdesc.
pub const SUPERDESC_LEN: usize = 24;

/// Bytes of the hardware TX descriptor.
pub const HWDESC_LEN: usize = 8;

/// Offset of the 802.11 frame inside the superframe.
pub const FRAME_OFF: usize = SUPERDESC_LEN + HWDESC_LEN;

/// Rates in the ladder (`ri`).
pub const MAX_RATES: usize = 4;

/// Alternative rate vectors (`rr`); one less than `ri` since the first rate
/// vector arrives in the hardware descriptor itself.
pub const MAX_RETRY_RATES: usize = 3;

const RI_OFF: usize = 8;
const RR_OFF: usize = 12;
const HW_LEN_OFF: usize = 24;
const HW_MAC_OFF: usize = 26;
const HW_PHY_OFF: usize = 28;

/// Per-rate entry of the ladder.
#[bitfield(u8)]
pub struct RateInfo {
    #[bits(3)]
    pub tries: u8,
    #[bits(3)]
    pub erp_prot: u8,
    pub ampdu: bool,
    __: bool,
}

/// The hardware MAC control word.
#[bitfield(u16)]
pub struct TxMacCtrl {
    #[bits(2)]
    pub erp_prot: u8,
    pub no_ack: bool,
    pub backoff: bool,
    pub burst: bool,
    pub ampdu: bool,
    /// Closes the running aggregate after this frame.
    pub ba_end: bool,
    pub hw_duration: bool,
    #[bits(2)]
    pub qos_queue: u8,
    pub disable_txop: bool,
    pub txop_rifs: bool,
    pub rate_probe: bool,
    #[bits(3)]
    __: u8,
}

/// The hardware PHY vector.
#[bitfield(u32)]
pub struct TxPhyCtrl {
    #[bits(2)]
    pub modulation: u8,
    pub preamble: bool,
    #[bits(2)]
    pub bandwidth: u8,
    #[bits(3)]
    pub heavy_clip: u8,
    #[bits(6)]
    pub tx_power: u8,
    #[bits(3)]
    pub chains: u8,
    #[bits(7)]
    pub mcs: u8,
    #[bits(8)]
    __: u8,
}

pub const MOD_CCK: u8 = 0;
pub const MOD_OFDM: u8 = 1;
pub const MOD_HT: u8 = 2;

/// OFDM 6 MBit rate code.
pub const RATE_OFDM_6M: u8 = 0xb;

/// PHY vector for robust control responses: OFDM 6 MBit, one chain, 17 dBm.
pub const PHY_OFDM_6M: u32 = TxPhyCtrl::new()
    .with_modulation(MOD_OFDM)
    .with_tx_power(34)
    .with_chains(1)
    .with_mcs(RATE_OFDM_6M)
    .into_bits();

/// Mutable fixed-offset view of one superframe buffer.
pub struct SuperFrame<'a> {
    buf: &'a mut [u8],
}

impl<'a> SuperFrame<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        debug_assert!(buf.len() >= FRAME_OFF);
        Self { buf }
    }

    /// The claimed superframe length, readable without a full view. Used by
    /// the download path before the frame is trusted.
    pub fn peek_len(buf: &[u8]) -> u16 {
        wire::get_le16(buf, 0)
    }

    pub fn len(&self) -> u16 {
        wire::get_le16(self.buf, 0)
    }

    pub fn set_len(&mut self, len: u16) {
        wire::put_le16(self.buf, 0, len);
    }

    pub fn rix(&self) -> u8 {
        self.buf[2]
    }

    pub fn set_rix(&mut self, rix: u8) {
        self.buf[2] = rix;
    }

    pub fn cnt(&self) -> u8 {
        self.buf[3]
    }

    pub fn set_cnt(&mut self, cnt: u8) {
        self.buf[3] = cnt;
    }

    pub fn cookie(&self) -> u8 {
        self.buf[4]
    }

    pub fn set_cookie(&mut self, cookie: u8) {
        self.buf[4] = cookie;
    }

    pub fn ampdu_density(&self) -> u8 {
        self.buf[5] & 0x7
    }

    pub fn ampdu_factor(&self) -> u8 {
        (self.buf[5] >> 3) & 0x3
    }

    pub fn ampdu_commit_density(&self) -> bool {
        self.buf[5] & 0x20 != 0
    }

    pub fn ampdu_commit_factor(&self) -> bool {
        self.buf[5] & 0x40 != 0
    }

    pub fn set_ampdu_settings(
        &mut self,
        density: u8,
        factor: u8,
        commit_density: bool,
        commit_factor: bool,
    ) {
        self.buf[5] = (density & 0x7)
            | (factor & 0x3) << 3
            | (commit_density as u8) << 5
            | (commit_factor as u8) << 6;
    }

    pub fn queue(&self) -> usize {
        (self.buf[6] & 0x3) as usize
    }

    pub fn assign_seq(&self) -> bool {
        self.buf[6] & 0x4 != 0
    }

    pub fn vif(&self) -> usize {
        ((self.buf[6] >> 3) & 0x7) as usize
    }

    pub fn fill_in_tsf(&self) -> bool {
        self.buf[6] & 0x40 != 0
    }

    pub fn cab(&self) -> bool {
        self.buf[6] & 0x80 != 0
    }

    pub fn set_misc(&mut self, queue: usize, vif: usize, assign_seq: bool, tsf: bool, cab: bool) {
        self.buf[6] = (queue as u8 & 0x3)
            | (assign_seq as u8) << 2
            | (vif as u8 & 0x7) << 3
            | (tsf as u8) << 6
            | (cab as u8) << 7;
    }

    pub fn ri(&self, i: usize) -> RateInfo {
        RateInfo::from_bits(self.buf[RI_OFF + i])
    }

    pub fn set_ri(&mut self, i: usize, ri: RateInfo) {
        self.buf[RI_OFF + i] = ri.into_bits();
    }

    pub fn rr(&self, i: usize) -> u32 {
        wire::get_le32(self.buf, RR_OFF + i * 4)
    }

    pub fn set_rr(&mut self, i: usize, phy: u32) {
        wire::put_le32(self.buf, RR_OFF + i * 4, phy);
    }

    pub fn hw_len(&self) -> u16 {
        wire::get_le16(self.buf, HW_LEN_OFF)
    }

    pub fn set_hw_len(&mut self, len: u16) {
        wire::put_le16(self.buf, HW_LEN_OFF, len);
    }

    pub fn mac(&self) -> TxMacCtrl {
        TxMacCtrl::from_bits(wire::get_le16(self.buf, HW_MAC_OFF))
    }

    pub fn set_mac(&mut self, mac: TxMacCtrl) {
        wire::put_le16(self.buf, HW_MAC_OFF, mac.into_bits());
    }

    pub fn phy(&self) -> TxPhyCtrl {
        TxPhyCtrl::from_bits(wire::get_le32(self.buf, HW_PHY_OFF))
    }

    pub fn set_phy(&mut self, phy: u32) {
        wire::put_le32(self.buf, HW_PHY_OFF, phy);
    }

    pub fn frame(&self) -> &[u8] {
        &self.buf[FRAME_OFF..]
    }

    pub fn frame_mut(&mut self) -> &mut [u8] {
        &mut self.buf[FRAME_OFF..]
    }
}

/// The 802.11 frame part of a superframe buffer.
pub fn frame_of(buf: &[u8]) -> &[u8] {
    &buf[FRAME_OFF..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misc_byte_round_trip() {
        let mut buf = [0u8; 64];
        let mut sf = SuperFrame::new(&mut buf);
        sf.set_misc(2, 1, true, false, true);
        assert_eq!(sf.queue(), 2);
        assert_eq!(sf.vif(), 1);
        assert!(sf.assign_seq());
        assert!(!sf.fill_in_tsf());
        assert!(sf.cab());
    }

    #[test]
    fn ampdu_byte_round_trip() {
        let mut buf = [0u8; 64];
        let mut sf = SuperFrame::new(&mut buf);
        sf.set_ampdu_settings(5, 2, true, false);
        assert_eq!(sf.ampdu_density(), 5);
        assert_eq!(sf.ampdu_factor(), 2);
        assert!(sf.ampdu_commit_density());
        assert!(!sf.ampdu_commit_factor());
    }

    #[test]
    fn rate_ladder_fields_do_not_overlap() {
        let mut buf = [0u8; 64];
        let mut sf = SuperFrame::new(&mut buf);
        for i in 0..MAX_RATES {
            sf.set_ri(i, RateInfo::new().with_tries(i as u8 + 1));
        }
        for i in 0..MAX_RETRY_RATES {
            sf.set_rr(i, 0x1000_0000 + i as u32);
        }
        sf.set_hw_len(0x1234);
        for i in 0..MAX_RATES {
            assert_eq!(sf.ri(i).tries(), i as u8 + 1);
        }
        for i in 0..MAX_RETRY_RATES {
            assert_eq!(sf.rr(i), 0x1000_0000 + i as u32);
        }
        assert_eq!(sf.hw_len(), 0x1234);
    }

    #[test]
    fn phy_vector_encodes_ofdm_6m() {
        let phy = TxPhyCtrl::from_bits(PHY_OFDM_6M);
        assert_eq!(phy.modulation(), MOD_OFDM);
        assert_eq!(phy.mcs(), RATE_OFDM_6M);
        assert_eq!(phy.chains(), 1);
    }

    #[test]
    fn frame_starts_after_hwdesc() {
        let mut buf = [0u8; 64];
        buf[FRAME_OFF] = 0xaa;
        let sf = SuperFrame::new(&mut buf);
        assert_eq!(sf.frame()[0], 0xaa);
        assert_eq!(frame_of(&buf)[0], 0xaa);
    }
}

//! 802.11 wire helpers.
//!
//! Frame control, sequence control, QoS and the fixed BAR/BA layouts,
//! operating on byte slices at explicit offsets. All multi-byte fields are
//! little endian on the wire.

use bitfield_struct::bitfield;
use macro_bits::bit;

/// Length of the frame check sequence the hardware appends.
pub const FCS_LEN: usize = 4;

/// 3-address 802.11 header length; the QoS control field follows it.
pub const HDR_LEN: usize = 24;

pub(crate) fn get_le16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

pub(crate) fn put_le16(buf: &mut [u8], off: usize, val: u16) {
    buf[off..off + 2].copy_from_slice(&val.to_le_bytes());
}

pub(crate) fn get_le32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub(crate) fn put_le32(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

/// The leading frame control word of every 802.11 frame.
#[bitfield(u16)]
pub struct FrameControl {
    #[bits(2)]
    pub protocol_version: u8,
    #[bits(2)]
    pub ftype: u8,
    #[bits(4)]
    pub stype: u8,
    pub to_ds: bool,
    pub from_ds: bool,
    pub more_fragments: bool,
    pub retry: bool,
    pub power_management: bool,
    pub more_data: bool,
    pub protected: bool,
    pub order: bool,
}

pub const FTYPE_MGMT: u8 = 0;
pub const FTYPE_CTL: u8 = 1;
pub const FTYPE_DATA: u8 = 2;

pub const STYPE_CTL_BACK_REQ: u8 = 8;
pub const STYPE_CTL_BACK: u8 = 9;
pub const STYPE_CTL_PSPOLL: u8 = 10;

/// QoS data frames carry the subtype QoS bit.
const STYPE_QOS_BIT: u8 = 8;

impl FrameControl {
    pub fn parse(frame: &[u8]) -> Self {
        Self::from_bits(get_le16(frame, 0))
    }

    pub fn is_data(&self) -> bool {
        self.ftype() == FTYPE_DATA
    }

    pub fn is_mgmt(&self) -> bool {
        self.ftype() == FTYPE_MGMT
    }

    pub fn is_ctl(&self) -> bool {
        self.ftype() == FTYPE_CTL
    }

    pub fn is_back_req(&self) -> bool {
        self.is_ctl() && self.stype() == STYPE_CTL_BACK_REQ
    }

    pub fn is_qos_data(&self) -> bool {
        self.is_data() && self.stype() & STYPE_QOS_BIT != 0
    }
}

/// Set a frame control flag in place.
pub(crate) fn set_frame_control_flags(frame: &mut [u8], flags: u16) {
    let fc = get_le16(frame, 0);
    put_le16(frame, 0, fc | flags);
}

pub(crate) fn clear_frame_control_flags(frame: &mut [u8], flags: u16) {
    let fc = get_le16(frame, 0);
    put_le16(frame, 0, fc & !flags);
}

pub const FCTL_RETRY: u16 = bit!(11);
pub const FCTL_MOREDATA: u16 = bit!(13);

/// Sequence control field offset and masks.
pub const SEQ_CTRL_OFF: usize = 22;
pub const SCTL_FRAG_MASK: u16 = 0x000f;
pub const SCTL_SEQ_MASK: u16 = 0xfff0;

/// Overwrite the sequence number, keeping the fragment number.
pub(crate) fn set_sequence(frame: &mut [u8], seq: u16) {
    let ctrl = get_le16(frame, SEQ_CTRL_OFF) & !SCTL_SEQ_MASK;
    put_le16(frame, SEQ_CTRL_OFF, ctrl | (seq & SCTL_SEQ_MASK));
}

pub(crate) fn is_first_frag(frame: &[u8]) -> bool {
    get_le16(frame, SEQ_CTRL_OFF) & SCTL_FRAG_MASK == 0
}

/// Traffic identifier of a QoS data frame. The QoS control field sits right
/// behind the (3- or 4-address) header.
pub fn tid(frame: &[u8]) -> u8 {
    let fc = FrameControl::parse(frame);
    if !fc.is_qos_data() {
        return 0;
    }
    let qos_off = if fc.to_ds() && fc.from_ds() {
        HDR_LEN + 6
    } else {
        HDR_LEN
    };
    if frame.len() <= qos_off {
        return 0;
    }
    frame[qos_off] & 0xf
}

/// Whether two frames belong to the same header flow: frame control +
/// duration and all three addresses match.
pub fn same_hdr(a: &[u8], b: &[u8]) -> bool {
    a.len() >= 20 && b.len() >= 20 && a[..20] == b[..20]
}

/// Whether two frames may share one aggregate: same TID, or the exact same
/// header (retransmissions).
pub fn same_aggr(a: &[u8], b: &[u8]) -> bool {
    tid(a) == tid(b) || same_hdr(a, b)
}

// --- BlockAckReq / BlockAck ------------------------------------------------
//
//  0: frame control   2: duration   4: ra   10: ta
// 16: BAR/BA control 18: start sequence number
// The BA additionally carries the 8 byte compressed bitmap at 20.

pub const BAR_LEN: usize = 20;
pub const BA_LEN: usize = 28;
pub const BACK_RA_OFF: usize = 4;
pub const BACK_TA_OFF: usize = 10;
pub const BACK_CTRL_OFF: usize = 16;
pub const BACK_SSN_OFF: usize = 18;
pub const BA_BITMAP_OFF: usize = 20;

pub const BAR_CTRL_ACK_POLICY: u16 = bit!(0);
pub const BAR_CTRL_MULTI_TID: u16 = bit!(1);
pub const BAR_CTRL_COMPRESSED_BA: u16 = bit!(2);

/// Per-BAR reply state, captured on the RX path and consumed when the reply
/// BlockAck goes out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BarCtx {
    pub ta: [u8; 6],
    pub ra: [u8; 6],
    pub start_seq_num: u16,
    pub control: u16,
    pub phy: u32,
}

// --- Beacon / TIM ----------------------------------------------------------

/// Offset of the first information element in a beacon: header plus
/// timestamp, beacon interval and capability info.
pub const BEACON_IE_OFF: usize = HDR_LEN + 8 + 2 + 2;

pub const EID_TIM: u8 = 5;

/// Find an information element in a beacon frame (FCS included in `beacon`).
/// Returns the offset of the element header.
pub fn beacon_find_ie(eid: u8, beacon: &[u8]) -> Option<usize> {
    let end = beacon.len().checked_sub(FCS_LEN)?;
    let mut pos = BEACON_IE_OFF;
    while pos + 2 <= end {
        let len = beacon[pos + 1] as usize;
        if pos + 2 + len > end {
            return None;
        }
        if beacon[pos] == eid {
            return Some(pos);
        }
        pos += 2 + len;
    }
    None
}

// TIM element body layout, relative to the element header.
pub const TIM_DTIM_COUNT: usize = 2;
pub const TIM_BITMAP_CTRL: usize = 4;

/// Multicast traffic indication bit in the TIM bitmap control octet.
pub const TIM_MCAST_BIT: u8 = 0x1;

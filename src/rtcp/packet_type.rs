// RTCP packet types (per RFC3550; feedback per RFC4585/5104)
pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;
pub const PT_RTPFB: u8 = 205;
pub const PT_PSFB: u8 = 206;

/// Packet types that collide with RTP payload types 64..=95 (RFC 5761 §4).
pub const RTCP_PT_RANGE: std::ops::RangeInclusive<u8> = 192..=223;

#[must_use]
pub fn is_rtcp_packet_type(pt: u8) -> bool {
    RTCP_PT_RANGE.contains(&pt)
}

use crate::{rtcp::packet_type::is_rtcp_packet_type, stun::looks_like_stun};

const RTP_VERSION_BITS: u8 = 0b10;
const RTP_MIN_LEN: usize = 12;
const RTCP_MIN_LEN: usize = 8;

/// The four protocols sharing one socket (RFC 5764 §5.1.2, RFC 5761 §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Ice,
    Dtls,
    Rtp,
    Rtcp,
}

impl PacketKind {
    /// Evaluation order of the pipeline, highest first.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            PacketKind::Rtp => 4,
            PacketKind::Ice => 3,
            PacketKind::Rtcp => 2,
            PacketKind::Dtls => 1,
        }
    }

    #[must_use]
    pub fn matches(self, buf: &[u8]) -> bool {
        match self {
            PacketKind::Ice => looks_like_stun(buf),
            PacketKind::Dtls => is_dtls(buf),
            PacketKind::Rtp => is_rtp(buf),
            PacketKind::Rtcp => is_rtcp(buf),
        }
    }
}

#[inline]
pub fn is_dtls(buf: &[u8]) -> bool {
    matches!(buf.first(), Some(20..=63))
}

#[inline]
fn rtp_family(buf: &[u8]) -> Option<u8> {
    match buf {
        [b0, b1, ..] if b0 >> 6 == RTP_VERSION_BITS => Some(b1 & 0x7F),
        _ => None,
    }
}

/// RTP v2 whose `pt + 128` stays clear of the RTCP packet-type range.
#[inline]
pub fn is_rtp(buf: &[u8]) -> bool {
    buf.len() >= RTP_MIN_LEN && rtp_family(buf).is_some_and(|pt| !is_rtcp_packet_type(pt + 128))
}

#[inline]
pub fn is_rtcp(buf: &[u8]) -> bool {
    buf.len() >= RTCP_MIN_LEN && rtp_family(buf).is_some_and(|pt| is_rtcp_packet_type(pt + 128))
}

/// Stateless first-match classification, in priority order.
#[must_use]
pub fn classify(buf: &[u8]) -> Option<PacketKind> {
    let mut kinds = [PacketKind::Ice, PacketKind::Dtls, PacketKind::Rtp, PacketKind::Rtcp];
    kinds.sort_by_key(|k| std::cmp::Reverse(k.priority()));
    kinds.into_iter().find(|k| k.matches(buf))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn stun() -> Vec<u8> {
        let mut b = vec![0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];
        b.extend_from_slice(&[7; 12]);
        b
    }

    fn rtp(pt: u8) -> Vec<u8> {
        let mut b = vec![0x80, pt, 0, 1, 0, 0, 0, 0, 0, 0, 0, 9];
        b.extend_from_slice(b"media");
        b
    }

    fn matching(buf: &[u8]) -> Vec<PacketKind> {
        [PacketKind::Ice, PacketKind::Dtls, PacketKind::Rtp, PacketKind::Rtcp]
            .into_iter()
            .filter(|k| k.matches(buf))
            .collect()
    }

    #[test]
    fn each_sample_matches_exactly_one_kind() {
        let dtls = vec![0x16, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let rr = vec![0x81, 201, 0, 7, 0, 0, 0, 1];
        assert_eq!(matching(&rtp(111)), vec![PacketKind::Rtp]);
        assert_eq!(matching(&rtp(0x80 | 96)), vec![PacketKind::Rtp]);
        assert_eq!(matching(&stun()), vec![PacketKind::Ice]);
        assert_eq!(matching(&dtls), vec![PacketKind::Dtls]);
        assert_eq!(matching(&rr), vec![PacketKind::Rtcp]);
    }

    #[test]
    fn payload_types_colliding_with_rtcp_route_to_rtcp() {
        // pt 72 => 200 (SR), pt 95 => 223
        let sr = rtp(72);
        assert_eq!(classify(&sr), Some(PacketKind::Rtcp));
        assert_eq!(classify(&rtp(95)), Some(PacketKind::Rtcp));
        assert_eq!(classify(&rtp(96)), Some(PacketKind::Rtp));
        // marker bit does not change the family
        assert_eq!(classify(&rtp(0x80 | 72)), Some(PacketKind::Rtcp));
    }

    #[test]
    fn boundaries_and_garbage() {
        assert!(is_dtls(&[20]));
        assert!(is_dtls(&[63]));
        assert!(!is_dtls(&[64]));
        assert!(!is_dtls(&[19]));
        assert_eq!(classify(&[]), None);
        assert_eq!(classify(&rtp(111)[..11]), None);
        let mut bad_cookie = stun();
        bad_cookie[4] = 0;
        assert_eq!(classify(&bad_cookie), None);
        assert_eq!(classify(&[0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn priority_order_is_rtp_stun_rtcp_dtls() {
        let mut kinds = [PacketKind::Dtls, PacketKind::Rtcp, PacketKind::Ice, PacketKind::Rtp];
        kinds.sort_by_key(|k| std::cmp::Reverse(k.priority()));
        assert_eq!(kinds, [PacketKind::Rtp, PacketKind::Ice, PacketKind::Rtcp, PacketKind::Dtls]);
    }
}

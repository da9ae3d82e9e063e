use super::{packet_type::is_rtcp_packet_type, rtcp_error::RtcpError};

pub const RTCP_VERSION: u8 = 2;
pub const COMMON_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonHeader {
    padding: bool,     // P
    rc_or_fmt: u8,     // 5 bits (report count or FMT)
    pt: u8,            // packet type
    length_words: u16, // number of 32-bit words minus one
}

impl CommonHeader {
    pub fn new(rc_or_fmt: u8, pt: u8, length_words: u16) -> Self {
        Self {
            padding: false,
            rc_or_fmt,
            pt,
            length_words,
        }
    }

    /// Parses the header and returns it with the packet's total byte length.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < COMMON_HEADER_LEN {
            return Err(RtcpError::TooShort);
        }
        let vprc = buf[0];
        let version = vprc >> 6;
        if version != RTCP_VERSION {
            return Err(RtcpError::BadVersion(version));
        }
        let pt = buf[1];
        if !is_rtcp_packet_type(pt) {
            return Err(RtcpError::NotRtcp(pt));
        }
        let length_words = u16::from_be_bytes([buf[2], buf[3]]);

        let total_bytes = (usize::from(length_words) + 1) * 4;
        if buf.len() < total_bytes {
            return Err(RtcpError::Truncated);
        }

        Ok((
            Self {
                padding: ((vprc >> 5) & 1) != 0,
                rc_or_fmt: vprc & 0x1F,
                pt,
                length_words,
            },
            total_bytes,
        ))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let vprc = (RTCP_VERSION << 6) | (u8::from(self.padding) << 5) | (self.rc_or_fmt & 0x1F);
        out.push(vprc);
        out.push(self.pt);
        out.extend_from_slice(&self.length_words.to_be_bytes());
    }

    pub fn padding(&self) -> bool {
        self.padding
    }

    pub fn rc_or_fmt(&self) -> u8 {
        self.rc_or_fmt
    }

    pub fn pt(&self) -> u8 {
        self.pt
    }

    pub fn length_words(&self) -> u16 {
        self.length_words
    }
}

use byteorder::{BigEndian, ByteOrder};

use super::rtcp_error::RtcpError;

pub const REPORT_BLOCK_LEN: usize = 24;

/// ReportBlock per RFC3550 §6.4.2 (24 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    /// 24-bit signed cumulative number of packets lost.
    pub cumulative_lost: i32,
    pub highest_seq_no_received: u32,
    pub interarrival_jitter: u32,
    pub lsr: u32,
    pub dlsr: u32,
}

impl ReportBlock {
    pub fn decode(buf: &[u8]) -> Result<Self, RtcpError> {
        if buf.len() < REPORT_BLOCK_LEN {
            return Err(RtcpError::Truncated);
        }
        // 24-bit signed, sign-extended through the top byte
        let cl_raw = BigEndian::read_u24(&buf[5..8]);
        let cumulative_lost = ((cl_raw << 8) as i32) >> 8;

        Ok(Self {
            ssrc: BigEndian::read_u32(&buf[0..4]),
            fraction_lost: buf[4],
            cumulative_lost,
            highest_seq_no_received: BigEndian::read_u32(&buf[8..12]),
            interarrival_jitter: BigEndian::read_u32(&buf[12..16]),
            lsr: BigEndian::read_u32(&buf[16..20]),
            dlsr: BigEndian::read_u32(&buf[20..24]),
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut block = [0u8; REPORT_BLOCK_LEN];
        BigEndian::write_u32(&mut block[0..4], self.ssrc);
        block[4] = self.fraction_lost;
        let cl = self.cumulative_lost.clamp(-8_388_608, 8_388_607);
        BigEndian::write_u24(&mut block[5..8], cl as u32 & 0x00FF_FFFF);
        BigEndian::write_u32(&mut block[8..12], self.highest_seq_no_received);
        BigEndian::write_u32(&mut block[12..16], self.interarrival_jitter);
        BigEndian::write_u32(&mut block[16..20], self.lsr);
        BigEndian::write_u32(&mut block[20..24], self.dlsr);
        out.extend_from_slice(&block);
    }

    /// Fraction lost as a ratio in `0.0..1.0`.
    #[must_use]
    pub fn loss_ratio(&self) -> f32 {
        f32::from(self.fraction_lost) / 256.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn negative_cumulative_loss_is_sign_extended() {
        let rb = ReportBlock {
            ssrc: 0x1234_5678,
            fraction_lost: 64,
            cumulative_lost: -3,
            highest_seq_no_received: 70_000,
            interarrival_jitter: 12,
            lsr: 1,
            dlsr: 2,
        };
        let mut out = Vec::new();
        rb.encode_into(&mut out);
        assert_eq!(out.len(), REPORT_BLOCK_LEN);
        assert_eq!(&out[5..8], &[0xFF, 0xFF, 0xFD]);
        assert_eq!(ReportBlock::decode(&out).unwrap(), rb);
        assert!((rb.loss_ratio() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn short_block_is_rejected() {
        assert_eq!(ReportBlock::decode(&[0; 23]), Err(RtcpError::Truncated));
    }
}

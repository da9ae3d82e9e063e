use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use super::{
    common_header::{COMMON_HEADER_LEN, CommonHeader},
    packet_type::{PT_RR, PT_SR},
    report_block::{REPORT_BLOCK_LEN, ReportBlock},
    rtcp_error::RtcpError,
};
use crate::{log::log_sink::LogSink, sink_debug, sink_info};

const SENDER_INFO_LEN: usize = 20;

/// Raised when a peer reports loss above the configured threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct CongestionSignal {
    pub reporter_ssrc: u32,
    pub source_ssrc: u32,
    pub loss_ratio: f32,
    pub cumulative_lost: i32,
}

/// Extracts `(reporter ssrc, block)` pairs from every SR/RR in a decrypted
/// compound packet. Other packet types are skipped.
pub fn report_blocks(compound: &[u8]) -> Result<Vec<(u32, ReportBlock)>, RtcpError> {
    let mut out = Vec::new();
    let mut idx = 0usize;
    while idx < compound.len() {
        let (hdr, total) = CommonHeader::decode(&compound[idx..])?;
        let body = &compound[idx + COMMON_HEADER_LEN..idx + total];
        let blocks_at = match hdr.pt() {
            PT_SR => Some(4 + SENDER_INFO_LEN),
            PT_RR => Some(4),
            _ => None,
        };
        if let Some(offset) = blocks_at {
            if body.len() < offset {
                return Err(RtcpError::Truncated);
            }
            let reporter = BigEndian::read_u32(&body[0..4]);
            for n in 0..usize::from(hdr.rc_or_fmt()) {
                let start = offset + n * REPORT_BLOCK_LEN;
                let block = body.get(start..).ok_or(RtcpError::Truncated)?;
                out.push((reporter, ReportBlock::decode(block)?));
            }
        }
        idx += total;
    }
    Ok(out)
}

/// Coarse congestion detector fed with inbound RTCP.
pub struct CongestionMonitor {
    threshold: f32,
    logger: Arc<dyn LogSink>,
}

impl CongestionMonitor {
    pub fn new(threshold: f32, logger: Arc<dyn LogSink>) -> Self {
        Self { threshold, logger }
    }

    /// Returns the worst report block whose loss exceeds the threshold.
    /// Malformed packets are logged and ignored.
    pub fn inspect(&self, compound: &[u8]) -> Option<CongestionSignal> {
        let blocks = match report_blocks(compound) {
            Ok(b) => b,
            Err(e) => {
                sink_debug!(self.logger, "[RTCP] Ignoring undecodable compound: {}", e);
                return None;
            }
        };
        let (reporter, worst) = blocks
            .into_iter()
            .filter(|(_, rb)| rb.loss_ratio() > self.threshold)
            .max_by_key(|(_, rb)| rb.fraction_lost)?;

        let signal = CongestionSignal {
            reporter_ssrc: reporter,
            source_ssrc: worst.ssrc,
            loss_ratio: worst.loss_ratio(),
            cumulative_lost: worst.cumulative_lost,
        };
        sink_info!(
            self.logger,
            "[RTCP] Congestion: peer {:#010x} reports {:.1}% loss on {:#010x}",
            signal.reporter_ssrc,
            signal.loss_ratio * 100.0,
            signal.source_ssrc
        );
        Some(signal)
    }
}

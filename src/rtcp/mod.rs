//! Minimal RTCP reading: common header, report blocks and a coarse
//! congestion signal derived from SR/RR loss fractions.

pub mod common_header;
pub mod congestion;
pub mod packet_type;
pub mod report_block;
pub mod rtcp_error;

pub use common_header::CommonHeader;
pub use congestion::{CongestionMonitor, CongestionSignal, report_blocks};
pub use report_block::ReportBlock;
pub use rtcp_error::RtcpError;

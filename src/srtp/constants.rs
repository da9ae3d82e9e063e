// Key derivation labels (RFC 3711 §4.3.1 / §4.3.2).
pub const SRTP_LABEL_ENCRYPTION: u8 = 0x00;
pub const SRTP_LABEL_AUTH: u8 = 0x01;
pub const SRTP_LABEL_SALT: u8 = 0x02;
pub const SRTCP_LABEL_ENCRYPTION: u8 = 0x03;
pub const SRTCP_LABEL_AUTH: u8 = 0x04;
pub const SRTCP_LABEL_SALT: u8 = 0x05;

// AES-128 master material
pub const MASTER_KEY_LEN: usize = 16;
pub const MASTER_SALT_LEN: usize = 14;

pub const SESSION_KEY_LEN: usize = 16; // 128 bits
pub const SESSION_AUTH_LEN: usize = 20; // 160 bits (SHA1)
pub const SESSION_SALT_LEN: usize = 14; // 112 bits

pub const AUTH_TAG_LEN_80: usize = 10;
pub const AUTH_TAG_LEN_32: usize = 4;

// Replay protection window size (64 packets)
pub const REPLAY_WINDOW_SIZE: u64 = 64;

/// Per-transformer limit on tracked SSRCs.
pub const MAX_SSRC_CONTEXTS: usize = 64;

pub const RTP_HEADER_LEN: usize = 12;
pub const RTCP_HEADER_LEN: usize = 8;

/// Length of the trailing `E || SRTCP index` word.
pub const SRTCP_INDEX_LEN: usize = 4;
pub const SRTCP_E_FLAG: u32 = 0x8000_0000;
pub const SRTCP_INDEX_MASK: u32 = 0x7FFF_FFFF;

/// Half of the 16-bit sequence space, used by the index estimation.
pub const SEQ_HALF: u16 = 0x8000;

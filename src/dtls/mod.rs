//! DTLS-SRTP handshake (RFC 5764) over the channel's shared UDP socket.

pub mod dtls_error;
pub mod dtls_role;
pub mod dtls_state;
pub mod handshake_engine;
pub mod identity;
pub mod transport_adapter;

pub use dtls_error::DtlsError;
pub use dtls_role::DtlsRole;
pub use dtls_state::DtlsHandshakeState;
pub use handshake_engine::{DtlsHandshakeEngine, DtlsListener, DtlsSettings, build_context};
pub use identity::DtlsIdentity;
pub use transport_adapter::DtlsTransportAdapter;

pub mod harvester;
pub mod ice_credentials;
pub mod ice_transaction;
pub mod stun_ice_engine;

pub use harvester::start_harvester;
pub use ice_credentials::IceCredentials;
pub use ice_transaction::IceTransaction;
pub use stun_ice_engine::{IceListener, StunIceEngine};

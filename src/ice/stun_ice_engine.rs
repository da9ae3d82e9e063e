use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, Weak},
};

use crate::{
    ice::{ice_credentials::IceCredentials, ice_transaction::IceTransaction},
    log::log_sink::LogSink,
    sink_debug, sink_info, sink_trace, sink_warn,
    stun::{
        MessageBuilder, MessageType, StunAttribute, StunError, StunMessage,
        constants::{ATTR_USE_CANDIDATE, ERROR_BAD_REQUEST},
    },
};

/// Host candidate priority (RFC 8445 §5.1.2.1): type preference 126,
/// local preference 65535, component 1.
const HOST_PRIORITY: u32 = (126 << 24) | (65_535 << 8) | (256 - 1);

/// Receives the one "candidate selected" notification of a channel.
pub trait IceListener: Send + Sync {
    fn on_candidate_selected(&self, remote: SocketAddr, use_candidate: bool);
}

/// Answers and issues STUN binding checks with short-term credentials.
///
/// Incoming requests must carry `USERNAME = "<local ufrag>:<remote ufrag>"`
/// and an integrity tag under the local password. Outgoing checks use
/// `"<remote ufrag>:<local ufrag>"` keyed with the remote password.
pub struct StunIceEngine {
    transaction: IceTransaction,
    controlling: bool,
    tie_breaker: u64,
    priority: u32,
    listener: Mutex<Option<Weak<dyn IceListener>>>,
    logger: Arc<dyn LogSink>,
}

impl StunIceEngine {
    pub fn new(
        local: IceCredentials,
        remote: IceCredentials,
        controlling: bool,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            transaction: IceTransaction::new(local, remote),
            controlling,
            tie_breaker: rand::random(),
            priority: HOST_PRIORITY,
            listener: Mutex::new(None),
            logger,
        }
    }

    pub fn set_listener(&self, listener: Weak<dyn IceListener>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    #[must_use]
    pub fn is_controlling(&self) -> bool {
        self.controlling
    }

    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.transaction.is_selected()
    }

    #[must_use]
    pub fn transaction(&self) -> &IceTransaction {
        &self.transaction
    }

    /// Builds a binding request and remembers its transaction id.
    pub fn encode_binding_request(&self, username: &str, password: &str) -> Result<Vec<u8>, StunError> {
        let builder = MessageBuilder::with_random_id(MessageType::BindingRequest);
        let tid = builder.transaction_id();

        let role = if self.controlling {
            StunAttribute::IceControlling(self.tie_breaker)
        } else {
            StunAttribute::IceControlled(self.tie_breaker)
        };
        let mut builder = builder
            .attribute(&StunAttribute::Username(username.to_string()))
            .attribute(&StunAttribute::Priority(self.priority))
            .attribute(&role);
        if self.controlling {
            builder = builder.attribute(&StunAttribute::UseCandidate);
        }
        let bytes = builder
            .message_integrity(password.as_bytes())?
            .fingerprint()
            .build();

        self.transaction.remember(tid);
        Ok(bytes)
    }

    /// Connectivity check toward the remote agent using the negotiated credentials.
    pub fn connectivity_check(&self) -> Result<Vec<u8>, StunError> {
        let username = format!(
            "{}:{}",
            self.transaction.remote.ufrag, self.transaction.local.ufrag
        );
        self.encode_binding_request(&username, &self.transaction.remote.pwd)
    }

    /// Pipeline entry point: decodes and dispatches a datagram.
    /// Returns the reply to send back, if any.
    pub fn handle(&self, bytes: &[u8], local_addr: SocketAddr, remote_addr: SocketAddr) -> Option<Vec<u8>> {
        let msg = match StunMessage::decode(bytes) {
            Ok(m) => m,
            Err(e) => {
                sink_debug!(self.logger, "[ICE] dropping undecodable STUN from {}: {}", remote_addr, e);
                return None;
            }
        };
        match msg.msg_type {
            MessageType::BindingRequest => self.process_request(&msg, local_addr, remote_addr),
            MessageType::BindingSuccess | MessageType::BindingError => {
                self.process_response(&msg, remote_addr);
                None
            }
            MessageType::BindingIndication => None,
            MessageType::Other(t) => {
                sink_debug!(self.logger, "[ICE] ignoring STUN type {:#06x} from {}", t, remote_addr);
                None
            }
        }
    }

    pub fn process_request(
        &self,
        msg: &StunMessage,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Option<Vec<u8>> {
        let Some(username) = msg.username() else {
            sink_debug!(self.logger, "[ICE] request without USERNAME from {}", remote_addr);
            return self.error_response(msg, ERROR_BAD_REQUEST, "Bad Request");
        };
        if !msg.has_integrity() {
            sink_debug!(self.logger, "[ICE] request without MESSAGE-INTEGRITY from {}", remote_addr);
            return self.error_response(msg, ERROR_BAD_REQUEST, "Bad Request");
        }

        let local_frag = username.split(':').next().unwrap_or_default();
        if local_frag != self.transaction.local.ufrag {
            sink_trace!(self.logger, "[ICE] unknown ufrag {:?} from {}", local_frag, remote_addr);
            return None;
        }
        if !msg.verify_integrity(self.transaction.local.pwd.as_bytes()) {
            sink_trace!(self.logger, "[ICE] integrity check failed from {}", remote_addr);
            return None;
        }

        let response = MessageBuilder::new(MessageType::BindingSuccess, msg.transaction_id)
            .attribute(&StunAttribute::XorMappedAddress(remote_addr))
            .message_integrity(self.transaction.local.pwd.as_bytes())
            .map(MessageBuilder::fingerprint)
            .map(MessageBuilder::build);

        let use_candidate = msg.has_attribute(ATTR_USE_CANDIDATE);
        self.fire_selected(remote_addr, use_candidate);

        match response {
            Ok(bytes) => {
                sink_trace!(self.logger, "[ICE] binding success {} -> {}", local_addr, remote_addr);
                Some(bytes)
            }
            Err(e) => {
                sink_warn!(self.logger, "[ICE] failed to build binding response: {}", e);
                None
            }
        }
    }

    pub fn process_response(&self, msg: &StunMessage, remote_addr: SocketAddr) {
        if !self.transaction.take(&msg.transaction_id) {
            sink_trace!(self.logger, "[ICE] response for unknown transaction from {}", remote_addr);
            return;
        }
        if msg.msg_type == MessageType::BindingError {
            let (code, reason) = msg.error_code().unwrap_or((0, ""));
            sink_warn!(self.logger, "[ICE] binding error {} {:?} from {}", code, reason, remote_addr);
            return;
        }
        if !msg.verify_integrity(self.transaction.remote.pwd.as_bytes()) {
            sink_debug!(self.logger, "[ICE] response integrity failed from {}", remote_addr);
            return;
        }
        self.fire_selected(remote_addr, self.controlling);
    }

    fn error_response(&self, msg: &StunMessage, code: u16, reason: &str) -> Option<Vec<u8>> {
        Some(
            MessageBuilder::new(MessageType::BindingError, msg.transaction_id)
                .attribute(&StunAttribute::ErrorCode {
                    code,
                    reason: reason.to_string(),
                })
                .fingerprint()
                .build(),
        )
    }

    fn fire_selected(&self, remote_addr: SocketAddr, use_candidate: bool) {
        if !self.transaction.mark_selected() {
            return;
        }
        sink_info!(
            self.logger,
            "[ICE] candidate selected: {} (use-candidate={})",
            remote_addr,
            use_candidate
        );
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(listener) = listener {
            listener.on_candidate_selected(remote_addr, use_candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        hits: AtomicUsize,
        last: Mutex<Option<(SocketAddr, bool)>>,
    }

    impl IceListener for Recorder {
        fn on_candidate_selected(&self, remote: SocketAddr, use_candidate: bool) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((remote, use_candidate));
        }
    }

    fn engines() -> (StunIceEngine, StunIceEngine) {
        let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let a = IceCredentials::new("aaaa", "a-password-of-22-chars!");
        let b = IceCredentials::new("bbbb", "b-password-of-22-chars!");
        (
            StunIceEngine::new(a.clone(), b.clone(), true, log.clone()),
            StunIceEngine::new(b, a, false, log),
        )
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn valid_request_gets_success_and_selects_once() {
        let (controlling, controlled) = engines();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn IceListener> = Arc::downgrade(&recorder) as Weak<dyn IceListener>;
        controlled.set_listener(weak);

        let local = addr("127.0.0.1:4000");
        let peer = addr("127.0.0.1:5000");
        for _ in 0..4 {
            let request = controlling.connectivity_check().unwrap();
            let reply = controlled.handle(&request, local, peer).expect("success response");
            let msg = StunMessage::decode(&reply).unwrap();
            assert_eq!(msg.msg_type, MessageType::BindingSuccess);
            assert!(msg.attributes.contains(&StunAttribute::XorMappedAddress(peer)));
        }

        assert_eq!(recorder.hits.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.last.lock().unwrap(), Some((peer, true)));
    }

    #[test]
    fn response_selects_on_requesting_side() {
        let (controlling, controlled) = engines();
        let recorder = Arc::new(Recorder::default());
        controlling.set_listener(Arc::downgrade(&recorder) as Weak<dyn IceListener>);

        let request = controlling.connectivity_check().unwrap();
        let reply = controlled
            .handle(&request, addr("127.0.0.1:5000"), addr("127.0.0.1:4000"))
            .unwrap();
        assert!(controlling.handle(&reply, addr("127.0.0.1:4000"), addr("127.0.0.1:5000")).is_none());

        assert!(controlling.is_selected());
        assert_eq!(recorder.hits.load(Ordering::SeqCst), 1);
        assert_eq!(controlling.transaction().outstanding_len(), 0);
    }

    #[test]
    fn wrong_password_is_dropped_silently() {
        let (_controlling, controlled) = engines();
        let forged = MessageBuilder::with_random_id(MessageType::BindingRequest)
            .attribute(&StunAttribute::Username("bbbb:aaaa".into()))
            .message_integrity(b"guessed")
            .unwrap()
            .fingerprint()
            .build();
        assert!(controlled.handle(&forged, addr("127.0.0.1:1"), addr("127.0.0.1:2")).is_none());
        assert!(!controlled.is_selected());
    }

    #[test]
    fn wrong_ufrag_is_dropped_silently() {
        let (controlling, controlled) = engines();
        let req = controlling.encode_binding_request("zzzz:aaaa", "b-password-of-22-chars!").unwrap();
        assert!(controlled.handle(&req, addr("127.0.0.1:1"), addr("127.0.0.1:2")).is_none());
    }

    #[test]
    fn missing_username_gets_400() {
        let (_controlling, controlled) = engines();
        let req = MessageBuilder::with_random_id(MessageType::BindingRequest)
            .fingerprint()
            .build();
        let reply = controlled.handle(&req, addr("127.0.0.1:1"), addr("127.0.0.1:2")).unwrap();
        let msg = StunMessage::decode(&reply).unwrap();
        assert_eq!(msg.msg_type, MessageType::BindingError);
        assert_eq!(msg.error_code().map(|(c, _)| c), Some(400));
        assert!(!controlled.is_selected());
    }

    #[test]
    fn unsolicited_response_is_ignored() {
        let (controlling, _controlled) = engines();
        let stray = MessageBuilder::with_random_id(MessageType::BindingSuccess)
            .message_integrity(b"b-password-of-22-chars!")
            .unwrap()
            .build();
        controlling.handle(&stray, addr("127.0.0.1:1"), addr("127.0.0.1:2"));
        assert!(!controlling.is_selected());
    }

    #[test]
    fn controlling_requests_carry_use_candidate() {
        let (controlling, controlled) = engines();
        let a = StunMessage::decode(&controlling.connectivity_check().unwrap()).unwrap();
        let b = StunMessage::decode(&controlled.connectivity_check().unwrap()).unwrap();
        assert!(a.has_attribute(ATTR_USE_CANDIDATE));
        assert!(!b.has_attribute(ATTR_USE_CANDIDATE));
        assert_eq!(a.username(), Some("bbbb:aaaa"));
        assert_eq!(b.username(), Some("aaaa:bbbb"));
    }
}

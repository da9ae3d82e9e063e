use std::{
    io,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use openssl::{
    hash::MessageDigest,
    ssl::{
        HandshakeError, Ssl, SslContext, SslContextBuilder, SslMethod, SslStream, SslVerifyMode,
    },
};

use crate::{
    config::GatewayConfig,
    dtls::{
        dtls_error::DtlsError,
        dtls_role::DtlsRole,
        dtls_state::DtlsHandshakeState,
        identity::DtlsIdentity,
        transport_adapter::{AdapterStream, DtlsTransportAdapter},
    },
    log::log_sink::LogSink,
    sink_debug, sink_error, sink_info, sink_trace, sink_warn,
    srtp::{
        SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig, SrtpTransformers,
        constants::{MASTER_KEY_LEN, MASTER_SALT_LEN},
    },
    transport::DatagramSink,
};

const SRTP_PROFILES: &str = "SRTP_AES128_CM_SHA1_80:SRTP_AES128_CM_SHA1_32";
const EXPORTER_LABEL: &str = "EXTRACTOR-dtls_srtp";
const DTLS_MTU: u32 = 1200;

/// Handshake outcome callbacks. Invoked from the worker thread.
pub trait DtlsListener: Send + Sync {
    fn on_handshake_complete(&self, transformers: SrtpTransformers);
    fn on_handshake_failed(&self, error: &DtlsError);
}

/// Timing knobs of the handshake (`[DTLS] max_delay_ms`, `receive_wait_ms`).
#[derive(Debug, Clone, Copy)]
pub struct DtlsSettings {
    pub max_delay: Duration,
    pub receive_wait: Duration,
}

impl Default for DtlsSettings {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(20),
            receive_wait: Duration::from_millis(100),
        }
    }
}

impl From<&GatewayConfig> for DtlsSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_delay: config.dtls_max_delay,
            receive_wait: config.dtls_receive_wait,
        }
    }
}

struct EngineShared {
    state: Mutex<DtlsHandshakeState>,
    // Bumped by reset(); a worker from an older generation discards its result.
    generation: AtomicU64,
    listener: Mutex<Option<Weak<dyn DtlsListener>>>,
}

impl EngineShared {
    fn finish(
        &self,
        generation: u64,
        outcome: Result<SrtpTransformers, DtlsError>,
        logger: &Arc<dyn LogSink>,
    ) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != generation {
            sink_debug!(logger, "[DTLS] Discarding result of a reset handshake");
            return;
        }
        *state = match &outcome {
            Ok(_) => DtlsHandshakeState::Complete,
            Err(e) => DtlsHandshakeState::Failed(e.to_string()),
        };
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade);
        drop(state);

        match outcome {
            Ok(transformers) => {
                sink_info!(logger, "[DTLS] Handshake Success! SRTP keys derived.");
                if let Some(l) = listener {
                    l.on_handshake_complete(transformers);
                }
            }
            Err(e) => {
                sink_error!(logger, "[DTLS] Handshake FAILED: {}", e);
                if let Some(l) = listener {
                    l.on_handshake_failed(&e);
                }
            }
        }
    }
}

/// Runs one DTLS-SRTP handshake per attempt on a dedicated worker thread.
///
/// Inbound records reach the worker through [`enqueue`](Self::enqueue);
/// outbound records leave through the channel's [`DatagramSink`].
pub struct DtlsHandshakeEngine {
    context: SslContext,
    sink: Weak<dyn DatagramSink>,
    settings: DtlsSettings,
    adapter: Mutex<Option<Arc<DtlsTransportAdapter>>>,
    shared: Arc<EngineShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    logger: Arc<dyn LogSink>,
}

impl DtlsHandshakeEngine {
    /// `remote_fingerprint` pins the peer certificate (SDP `a=fingerprint`).
    pub fn new(
        identity: &DtlsIdentity,
        remote_fingerprint: Option<String>,
        sink: Weak<dyn DatagramSink>,
        settings: DtlsSettings,
        logger: Arc<dyn LogSink>,
    ) -> Result<Self, DtlsError> {
        let context = build_context(identity, remote_fingerprint, &logger)?;
        Ok(Self::with_context(context, sink, settings, logger))
    }

    /// Infallible constructor over a context from [`build_context`].
    pub fn with_context(
        context: SslContext,
        sink: Weak<dyn DatagramSink>,
        settings: DtlsSettings,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            context,
            sink,
            settings,
            adapter: Mutex::new(None),
            shared: Arc::new(EngineShared {
                state: Mutex::new(DtlsHandshakeState::Idle),
                generation: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
            worker: Mutex::new(None),
            logger,
        }
    }

    pub fn set_listener(&self, listener: Weak<dyn DtlsListener>) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    #[must_use]
    pub fn state(&self) -> DtlsHandshakeState {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state() == DtlsHandshakeState::Complete
    }

    /// Starts the handshake unless one already ran since the last reset.
    /// `use_candidate` selects the client role. Returns whether a worker was
    /// spawned.
    pub fn handshake(&self, use_candidate: bool) -> bool {
        let role = DtlsRole::from_use_candidate(use_candidate);
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != DtlsHandshakeState::Idle {
            sink_debug!(
                self.logger,
                "[DTLS] handshake({}) ignored in state {:?}",
                use_candidate,
                *state
            );
            return false;
        }

        let ssl = match Ssl::new(&self.context) {
            Ok(ssl) => ssl,
            Err(e) => {
                *state = DtlsHandshakeState::Failed(e.to_string());
                drop(state);
                self.notify_failure(&DtlsError::from(e));
                return false;
            }
        };

        let adapter = Arc::new(DtlsTransportAdapter::new(
            self.sink.clone(),
            self.settings.max_delay,
            self.settings.receive_wait,
            self.logger.clone(),
        ));
        *self.adapter.lock().unwrap_or_else(|e| e.into_inner()) = Some(adapter.clone());
        *state = DtlsHandshakeState::Handshaking(role);
        let generation = self.shared.generation.load(Ordering::SeqCst);
        drop(state);

        sink_info!(
            self.logger,
            "[DTLS] Starting handshake as {:?}. Timeout: {:?}",
            role,
            self.settings.max_delay
        );

        let shared = self.shared.clone();
        let logger = self.logger.clone();
        let spawned = thread::Builder::new()
            .name(format!("dtls-{:?}", role).to_lowercase())
            .spawn(move || {
                let outcome = run_handshake(ssl, role, &adapter, &logger).and_then(|config| {
                    SrtpTransformers::from_session(&config, logger.clone()).map_err(DtlsError::from)
                });
                shared.finish(generation, outcome, &logger);
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                true
            }
            Err(e) => {
                let err = DtlsError::Io(e);
                *self.shared.state.lock().unwrap_or_else(|e| e.into_inner()) =
                    DtlsHandshakeState::Failed(err.to_string());
                self.notify_failure(&err);
                false
            }
        }
    }

    /// Hands one inbound DTLS record to the running handshake.
    /// Records arriving outside a handshake are dropped.
    pub fn enqueue(&self, datagram: &[u8]) -> bool {
        let adapter = self.adapter.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match adapter {
            Some(adapter) if matches!(self.state(), DtlsHandshakeState::Handshaking(_)) => {
                adapter.push(datagram);
                true
            }
            _ => {
                sink_trace!(
                    self.logger,
                    "[DTLS] Dropping {} byte record outside handshake",
                    datagram.len()
                );
                false
            }
        }
    }

    /// Aborts any running worker, forgets the listener and returns to `Idle`.
    pub fn reset(&self) {
        self.halt(false);
        sink_debug!(self.logger, "[DTLS] Engine reset");
    }

    /// Aborts any running worker and forgets the listener, keeping the
    /// outcome: `Complete` and `Failed` stay as they are, an interrupted
    /// handshake ends as `Failed`.
    pub fn shutdown(&self) {
        let state = self.halt(true);
        sink_debug!(self.logger, "[DTLS] Engine shut down in state {:?}", state);
    }

    fn halt(&self, keep_outcome: bool) -> DtlsHandshakeState {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(adapter) = self.adapter.lock().unwrap_or_else(|e| e.into_inner()).take() {
            adapter.close();
        }
        if !keep_outcome {
            *state = DtlsHandshakeState::Idle;
        } else if matches!(*state, DtlsHandshakeState::Handshaking(_)) {
            *state = DtlsHandshakeState::Failed(DtlsError::Aborted.to_string());
        }
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        let current = state.clone();
        drop(state);
        // Detached: the worker exits on the closed adapter.
        self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        current
    }

    fn notify_failure(&self, error: &DtlsError) {
        sink_error!(self.logger, "[DTLS] Handshake FAILED: {}", error);
        let listener = self
            .shared
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(l) = listener {
            l.on_handshake_failed(error);
        }
    }
}

impl Drop for DtlsHandshakeEngine {
    fn drop(&mut self) {
        if let Some(adapter) = self.adapter.lock().unwrap_or_else(|e| e.into_inner()).take() {
            adapter.close();
        }
    }
}

fn run_handshake(
    mut ssl: Ssl,
    role: DtlsRole,
    adapter: &Arc<DtlsTransportAdapter>,
    logger: &Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    ssl.set_mtu(DTLS_MTU)?;
    let stream = adapter.stream();
    let started = match role {
        DtlsRole::Client => ssl.connect(stream),
        DtlsRole::Server => ssl.accept(stream),
    };
    let stream = drive_handshake(started, adapter)?;
    derive_srtp_keys(&stream, role, logger)
}

/// Re-enters OpenSSL after every empty receive window so its retransmission
/// timer can fire, until success, failure or the deadline.
fn drive_handshake(
    mut result: Result<SslStream<AdapterStream>, HandshakeError<AdapterStream>>,
    adapter: &DtlsTransportAdapter,
) -> Result<SslStream<AdapterStream>, DtlsError> {
    loop {
        match result {
            Ok(stream) => return Ok(stream),
            Err(HandshakeError::WouldBlock(mid)) => {
                if adapter.is_expired() {
                    return Err(DtlsError::Timeout(adapter.max_delay()));
                }
                result = mid.handshake();
            }
            Err(HandshakeError::Failure(mid)) => {
                let err = mid.into_error();
                return Err(match err.io_error().map(io::Error::kind) {
                    Some(io::ErrorKind::TimedOut) => DtlsError::Timeout(adapter.max_delay()),
                    Some(io::ErrorKind::ConnectionAborted) => DtlsError::Aborted,
                    _ => DtlsError::Handshake(format!("{:?}", err)),
                });
            }
            Err(HandshakeError::SetupFailure(e)) => return Err(DtlsError::Ssl(format!("{:?}", e))),
        }
    }
}

fn derive_srtp_keys(
    stream: &SslStream<AdapterStream>,
    role: DtlsRole,
    logger: &Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    let selected_profile = stream
        .ssl()
        .selected_srtp_profile()
        .ok_or(DtlsError::NoSrtpProfile)?;

    let profile_name = selected_profile.name();
    sink_debug!(logger, "[DTLS] Negotiated SRTP Profile: {}", profile_name);
    let profile = SrtpProfile::from_openssl_name(profile_name).map_err(|e| {
        sink_warn!(logger, "[DTLS] Unknown SRTP Profile selected: {}", profile_name);
        DtlsError::from(e)
    })?;

    let total_len = 2 * (MASTER_KEY_LEN + MASTER_SALT_LEN);
    let mut key_mat = vec![0u8; total_len];
    stream
        .ssl()
        .export_keying_material(&mut key_mat, EXPORTER_LABEL, None)
        .map_err(|e| DtlsError::KeyExport(format!("{}", e)))?;

    sink_trace!(
        logger,
        "[DTLS] Key material exported successfully ({} bytes)",
        total_len
    );

    let (client_key, rest) = key_mat.split_at(MASTER_KEY_LEN);
    let (server_key, rest) = rest.split_at(MASTER_KEY_LEN);
    let (client_salt, server_salt) = rest.split_at(MASTER_SALT_LEN);

    let client_keys = SrtpEndpointKeys {
        master_key: client_key.to_vec(),
        master_salt: client_salt.to_vec(),
    };
    let server_keys = SrtpEndpointKeys {
        master_key: server_key.to_vec(),
        master_salt: server_salt.to_vec(),
    };
    key_mat.fill(0);

    let (outbound, inbound) = match role {
        DtlsRole::Client => (client_keys, server_keys),
        DtlsRole::Server => (server_keys, client_keys),
    };

    Ok(SrtpSessionConfig {
        profile,
        outbound,
        inbound,
    })
}

/// DTLS context with `use_srtp`, the local identity and optional peer
/// fingerprint pinning.
pub fn build_context(
    identity: &DtlsIdentity,
    remote_fingerprint: Option<String>,
    logger: &Arc<dyn LogSink>,
) -> Result<SslContext, DtlsError> {
    let mut builder = SslContextBuilder::new(SslMethod::dtls())?;
    builder
        .set_tlsext_use_srtp(SRTP_PROFILES)
        .map_err(|e| DtlsError::Ssl(format!("set_tlsext_use_srtp failed: {}", e)))?;
    builder
        .set_cipher_list("DEFAULT:@SECLEVEL=0")
        .map_err(|e| DtlsError::Ssl(format!("set_cipher_list failed: {}", e)))?;
    identity.apply(&mut builder)?;

    match remote_fingerprint {
        Some(fp) => {
            sink_debug!(logger, "[DTLS] Expecting remote fingerprint: {}", fp);
            let logger_cb = logger.clone();
            builder.set_verify_callback(
                SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
                move |_preverify_ok, ctx| {
                    let Some(cert) = ctx.current_cert() else {
                        sink_warn!(logger_cb, "[DTLS] Verify: No certificate presented by peer!");
                        return false;
                    };
                    let computed_fp = match cert.digest(MessageDigest::sha256()) {
                        Ok(d) => d
                            .iter()
                            .map(|b| format!("{:02X}", b))
                            .collect::<Vec<String>>()
                            .join(":"),
                        Err(e) => {
                            sink_error!(logger_cb, "[DTLS] Verify: Failed to compute digest: {}", e);
                            return false;
                        }
                    };
                    if computed_fp.eq_ignore_ascii_case(&fp) {
                        sink_info!(logger_cb, "[DTLS] Verify: Fingerprint MATCHED ({})", computed_fp);
                        true
                    } else {
                        sink_warn!(
                            logger_cb,
                            "[DTLS] Verify: Fingerprint MISMATCH!\n  Expected: {}\n  Got:      {}",
                            fp,
                            computed_fp
                        );
                        false
                    }
                },
            );
        }
        None => {
            sink_warn!(
                logger,
                "[DTLS] No remote fingerprint provided. Verification will be disabled."
            );
            builder.set_verify(SslVerifyMode::NONE);
        }
    }

    Ok(builder.build())
}

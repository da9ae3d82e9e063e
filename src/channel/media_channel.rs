use std::{
    collections::VecDeque,
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
};

use mio::net::UdpSocket;

use super::{
    channel_error::ChannelError,
    channel_params::{ChannelParams, ChannelSettings},
    media_event::{CloseReason, InboundMedia, MediaEvent},
};
use crate::{
    dtls::{
        DtlsError, DtlsHandshakeEngine, DtlsHandshakeState, DtlsIdentity, DtlsListener,
        build_context,
    },
    ice::{IceListener, StunIceEngine, start_harvester},
    log::log_sink::LogSink,
    multiplexer::{ChannelMultiplexer, PollOwner, Registration},
    pipeline::{
        MediaKind, MediaReceiver, MediaSink, PacketHandler, PacketHandlerPipeline, PacketKind,
        ReceiveCounters, ReceiveStats,
    },
    rtcp::CongestionMonitor,
    scheduler::{PeriodicExecutor, TaskHandle},
    sink_debug, sink_info, sink_trace, sink_warn,
    srtp::SrtpTransformers,
    transport::DatagramSink,
};

const RECV_BUFFER_LEN: usize = 4096;
const MAX_PENDING_DATAGRAMS: usize = 256;

/// Shared services a channel is built with. Cloned per channel.
#[derive(Clone)]
pub struct ChannelRuntime {
    pub multiplexer: Arc<ChannelMultiplexer>,
    pub executor: Arc<PeriodicExecutor>,
    pub identity: Arc<DtlsIdentity>,
    pub settings: ChannelSettings,
    pub logger: Arc<dyn LogSink>,
}

/// One call: a UDP socket carrying STUN, DTLS, SRTP and SRTCP.
///
/// Lifecycle: ICE selects a remote candidate, which starts DTLS; the
/// completed handshake installs the SRTP/SRTCP handlers. Handshake failure
/// or a fatal socket error closes the channel. Only this type touches the
/// socket.
pub struct MediaChannel {
    call_id: String,
    local_addr: SocketAddr,
    params: ChannelParams,
    socket: Mutex<UdpSocket>,
    registration: Mutex<Option<Registration>>,
    remote: Mutex<Option<SocketAddr>>,
    pipeline: RwLock<PacketHandlerPipeline>,
    ice: Arc<StunIceEngine>,
    dtls: Arc<DtlsHandshakeEngine>,
    transformers: Mutex<Option<SrtpTransformers>>,
    harvester: Mutex<Option<TaskHandle>>,
    pending: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
    closed: AtomicBool,
    stats: Arc<ReceiveStats>,
    congestion: CongestionMonitor,
    multiplexer: Arc<ChannelMultiplexer>,
    events: Sender<MediaEvent>,
    media: Sender<InboundMedia>,
    self_ref: Weak<MediaChannel>,
    logger: Arc<dyn LogSink>,
}

impl std::fmt::Debug for MediaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaChannel")
            .field("call_id", &self.call_id)
            .field("local_addr", &self.local_addr)
            .field("remote", &self.remote())
            .field("closed", &self.is_channel_closed())
            .finish_non_exhaustive()
    }
}

impl MediaChannel {
    /// Binds the socket, joins the multiplexer and starts harvesting.
    pub fn open(
        params: ChannelParams,
        runtime: &ChannelRuntime,
        events: Sender<MediaEvent>,
        media: Sender<InboundMedia>,
    ) -> Result<Arc<Self>, ChannelError> {
        let settings = runtime.settings;
        let logger = runtime.logger.clone();
        let socket = UdpSocket::bind(settings.bind_address).map_err(|source| ChannelError::Bind {
            addr: settings.bind_address,
            source,
        })?;
        let local_addr = socket.local_addr()?;
        let context = build_context(
            &runtime.identity,
            params.remote_fingerprint.clone(),
            &logger,
        )?;

        let ice = Arc::new(StunIceEngine::new(
            params.local_credentials.clone(),
            params.remote_credentials.clone(),
            params.controlling,
            logger.clone(),
        ));

        let channel = Arc::new_cyclic(|weak: &Weak<MediaChannel>| {
            let sink: Weak<dyn DatagramSink> = weak.clone();
            let dtls = Arc::new(DtlsHandshakeEngine::with_context(
                context,
                sink,
                settings.dtls,
                logger.clone(),
            ));
            let mut pipeline = PacketHandlerPipeline::new();
            pipeline.add_handler(PacketHandler::Ice(ice.clone()));
            pipeline.add_handler(PacketHandler::Dtls(dtls.clone()));

            MediaChannel {
                call_id: params.call_id.clone(),
                local_addr,
                params,
                socket: Mutex::new(socket),
                registration: Mutex::new(None),
                remote: Mutex::new(None),
                pipeline: RwLock::new(pipeline),
                ice,
                dtls,
                transformers: Mutex::new(None),
                harvester: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                stats: Arc::new(ReceiveStats::default()),
                congestion: CongestionMonitor::new(settings.congestion_loss_threshold, logger.clone()),
                multiplexer: runtime.multiplexer.clone(),
                events,
                media,
                self_ref: weak.clone(),
                logger,
            }
        });

        let ice_listener: Weak<dyn IceListener> = channel.self_ref.clone();
        let dtls_listener: Weak<dyn DtlsListener> = channel.self_ref.clone();
        channel.ice.set_listener(ice_listener);
        channel.dtls.set_listener(dtls_listener);

        let owner: Weak<dyn PollOwner> = channel.self_ref.clone();
        let registration = {
            let mut socket = channel.socket.lock().unwrap_or_else(|e| e.into_inner());
            runtime.multiplexer.register(&mut socket, owner)?
        };
        *channel
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(registration);

        let sink: Weak<dyn DatagramSink> = channel.self_ref.clone();
        let handle = start_harvester(
            &runtime.executor,
            channel.ice.clone(),
            sink,
            channel.params.remote_candidates.clone(),
            settings.stun_interval,
            channel.logger.clone(),
        );
        *channel.harvester.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        sink_info!(
            channel.logger,
            "[CHANNEL] {} open on {} (controlling={})",
            channel.call_id,
            local_addr,
            channel.params.controlling
        );
        Ok(channel)
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.transformers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    #[must_use]
    pub fn is_channel_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn dtls_state(&self) -> DtlsHandshakeState {
        self.dtls.state()
    }

    #[must_use]
    pub fn handler_kinds(&self) -> Vec<PacketKind> {
        self.pipeline
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .kinds()
    }

    #[must_use]
    pub fn stats(&self) -> ReceiveCounters {
        self.stats.snapshot()
    }

    /// Protects a clear RTP packet and sends it to the selected remote.
    pub fn send_rtp(&self, packet: &[u8]) -> Result<(), ChannelError> {
        self.send_protected(packet, MediaKind::Rtp)
    }

    /// Protects a clear compound RTCP packet and sends it.
    pub fn send_rtcp(&self, packet: &[u8]) -> Result<(), ChannelError> {
        self.send_protected(packet, MediaKind::Rtcp)
    }

    fn send_protected(&self, packet: &[u8], kind: MediaKind) -> Result<(), ChannelError> {
        if self.is_channel_closed() {
            return Err(ChannelError::Closed);
        }
        let transformers = self
            .transformers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ChannelError::NotReady)?;
        let remote = self.remote().ok_or(ChannelError::NotReady)?;

        let mut protected = packet.to_vec();
        match kind {
            MediaKind::Rtp => transformers.rtp_encoder.transform(&mut protected)?,
            MediaKind::Rtcp => transformers.rtcp_encoder.transform(&mut protected)?,
        }
        self.send_to(&protected, remote)?;
        Ok(())
    }

    /// Tears the channel down once: stops harvesting and DTLS, drops the
    /// handlers and keys, leaves the multiplexer and reports `ChannelClosed`.
    pub fn close(&self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(h) = self.harvester.lock().unwrap_or_else(|e| e.into_inner()).take() {
            h.cancel();
        }
        self.ice.clear_listener();
        self.dtls.shutdown();
        self.pipeline
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.transformers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let registration = self
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(registration) = registration {
            let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = self.multiplexer.deregister(&mut socket, registration) {
                sink_debug!(self.logger, "[CHANNEL] {} deregister: {}", self.call_id, e);
            }
        }

        sink_info!(self.logger, "[CHANNEL] {} closed: {:?}", self.call_id, reason);
        self.emit(MediaEvent::ChannelClosed {
            call_id: self.call_id.clone(),
            reason,
        });
    }

    fn emit(&self, event: MediaEvent) {
        if self.events.send(event).is_err() {
            sink_trace!(self.logger, "[CHANNEL] {} event receiver gone", self.call_id);
        }
    }

    /// Routes one datagram through the pipeline. DTLS and media are accepted
    /// only from the remote selected by ICE.
    fn dispatch(&self, bytes: &[u8], from: SocketAddr) {
        // Cloned out so handlers may reach back into the pipeline.
        let handler = self
            .pipeline
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .classify(bytes)
            .cloned();
        let Some(handler) = handler else {
            sink_trace!(
                self.logger,
                "[CHANNEL] {} unclassified {} bytes from {}",
                self.call_id,
                bytes.len(),
                from
            );
            return;
        };
        if handler.kind() != PacketKind::Ice && self.remote() != Some(from) {
            sink_trace!(
                self.logger,
                "[CHANNEL] {} {:?} from unselected {}",
                self.call_id,
                handler.kind(),
                from
            );
            return;
        }
        if let Some(reply) = handler.handle(bytes, self.local_addr, from) {
            if let Err(e) = self.send_to(&reply, from) {
                sink_debug!(self.logger, "[CHANNEL] {} reply to {} failed: {}", self.call_id, from, e);
            }
        }
    }

    fn install_media_handlers(&self, transformers: &SrtpTransformers) {
        let sink: Weak<dyn MediaSink> = self.self_ref.clone();
        let mut pipeline = self.pipeline.write().unwrap_or_else(|e| e.into_inner());
        pipeline.add_handler(PacketHandler::Rtp(MediaReceiver::new(
            MediaKind::Rtp,
            transformers.rtp_decoder.clone(),
            sink.clone(),
            self.stats.clone(),
            self.logger.clone(),
        )));
        pipeline.add_handler(PacketHandler::Rtcp(MediaReceiver::new(
            MediaKind::Rtcp,
            transformers.rtcp_decoder.clone(),
            sink,
            self.stats.clone(),
            self.logger.clone(),
        )));
    }

    fn accepts_payload_type(&self, packet: &[u8]) -> bool {
        let types = &self.params.remote_payload_types;
        types.is_empty() || packet.get(1).is_some_and(|b| types.contains(&(b & 0x7F)))
    }
}

impl IceListener for MediaChannel {
    fn on_candidate_selected(&self, remote: SocketAddr, use_candidate: bool) {
        if self.is_channel_closed() {
            return;
        }
        *self.remote.lock().unwrap_or_else(|e| e.into_inner()) = Some(remote);
        self.emit(MediaEvent::CandidateSelected {
            call_id: self.call_id.clone(),
            remote,
            use_candidate,
        });
        // DTLS role follows the ICE role.
        self.dtls.handshake(self.ice.is_controlling());
    }
}

impl DtlsListener for MediaChannel {
    fn on_handshake_complete(&self, transformers: SrtpTransformers) {
        if self.is_channel_closed() {
            return;
        }
        self.install_media_handlers(&transformers);
        *self.transformers.lock().unwrap_or_else(|e| e.into_inner()) = Some(transformers);
        sink_info!(self.logger, "[CHANNEL] {} SRTP ready", self.call_id);
        self.emit(MediaEvent::HandshakeComplete {
            call_id: self.call_id.clone(),
        });
    }

    fn on_handshake_failed(&self, error: &DtlsError) {
        let reason = error.to_string();
        self.emit(MediaEvent::HandshakeFailed {
            call_id: self.call_id.clone(),
            reason: reason.clone(),
        });
        self.close(CloseReason::HandshakeFailed(reason));
    }
}

impl MediaSink for MediaChannel {
    fn on_rtp(&self, packet: Vec<u8>, from: SocketAddr) {
        if !self.accepts_payload_type(&packet) {
            sink_trace!(self.logger, "[CHANNEL] {} unexpected payload type", self.call_id);
            return;
        }
        let _ = self.media.send(InboundMedia {
            call_id: self.call_id.clone(),
            kind: MediaKind::Rtp,
            packet,
            from,
        });
    }

    fn on_rtcp(&self, packet: Vec<u8>, from: SocketAddr) {
        if let Some(signal) = self.congestion.inspect(&packet) {
            self.emit(MediaEvent::CongestionSignal {
                call_id: self.call_id.clone(),
                signal,
            });
        }
        let _ = self.media.send(InboundMedia {
            call_id: self.call_id.clone(),
            kind: MediaKind::Rtcp,
            packet,
            from,
        });
    }
}

impl DatagramSink for MediaChannel {
    fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<usize> {
        if self.is_channel_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let result = self
            .socket
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .send_to(data, to);
        match result {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                if pending.len() >= MAX_PENDING_DATAGRAMS {
                    sink_warn!(self.logger, "[CHANNEL] {} send queue full, dropping", self.call_id);
                } else {
                    pending.push_back((data.to_vec(), to));
                }
                Ok(data.len())
            }
            other => other,
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote()
    }
}

impl PollOwner for MediaChannel {
    fn receive(&self) {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let mut fatal = None;
        loop {
            if self.is_channel_closed() {
                return;
            }
            let result = self
                .socket
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .recv_from(&mut buf);
            match result {
                Ok((n, from)) => self.dispatch(&buf[..n], from),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = fatal {
            sink_warn!(self.logger, "[CHANNEL] {} socket error: {}", self.call_id, e);
            self.close(CloseReason::SocketError(e.to_string()));
        }
    }

    fn has_pending_output(&self) -> bool {
        !self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    fn send(&self) {
        let socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while let Some((data, to)) = pending.front() {
            match socket.send_to(data, *to) {
                Ok(_) => {
                    pending.pop_front();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    sink_debug!(self.logger, "[CHANNEL] {} dropped queued datagram: {}", self.call_id, e);
                    pending.pop_front();
                }
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.is_channel_closed()
    }
}

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
};

use thiserror::Error;

use crate::{
    channel::{
        ChannelError, ChannelParams, ChannelRegistry, ChannelRuntime, ChannelSettings,
        CloseReason, InboundMedia, MediaChannel, MediaEvent,
    },
    config::GatewayConfig,
    dtls::{DtlsError, DtlsIdentity},
    log::log_sink::LogSink,
    multiplexer::{ChannelMultiplexer, MultiplexerError},
    scheduler::PeriodicExecutor,
    sink_debug, sink_info,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("DTLS identity: {0}")]
    Identity(#[from] DtlsError),
    #[error("executor: {0}")]
    Executor(#[from] io::Error),
    #[error(transparent)]
    Multiplexer(#[from] MultiplexerError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("gateway is shut down")]
    ShutDown,
}

/// Process-wide owner of the multiplexer pool, the periodic executor, the
/// DTLS identity and the channel registry.
pub struct MediaGateway {
    runtime: ChannelRuntime,
    registry: ChannelRegistry,
    events: Sender<MediaEvent>,
    media: Sender<InboundMedia>,
    stopped: AtomicBool,
}

impl MediaGateway {
    pub fn start(
        config: &GatewayConfig,
        events: Sender<MediaEvent>,
        media: Sender<InboundMedia>,
        logger: Arc<dyn LogSink>,
    ) -> Result<Self, GatewayError> {
        let identity = Arc::new(DtlsIdentity::from_config(config, &logger)?);
        let executor = Arc::new(PeriodicExecutor::start(logger.clone())?);
        let multiplexer = Arc::new(ChannelMultiplexer::new(
            config.pool_size,
            config.poll_interval,
            logger.clone(),
        ));
        multiplexer.start()?;

        sink_info!(
            logger,
            "[GATEWAY] started: {} poll loop(s), bind {}",
            config.pool_size,
            config.bind_address
        );
        Ok(Self {
            runtime: ChannelRuntime {
                multiplexer,
                executor,
                identity,
                settings: ChannelSettings::from(config),
                logger,
            },
            registry: ChannelRegistry::new(),
            events,
            media,
            stopped: AtomicBool::new(false),
        })
    }

    /// Local certificate fingerprint for the SDP answer.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.runtime.identity.fingerprint()
    }

    /// Opens and registers a channel for `params.call_id`.
    pub fn open_channel(&self, params: ChannelParams) -> Result<Arc<MediaChannel>, GatewayError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(GatewayError::ShutDown);
        }
        self.registry.prune_closed();
        if self.registry.contains(&params.call_id) {
            return Err(ChannelError::DuplicateCallId(params.call_id).into());
        }
        let channel = MediaChannel::open(
            params,
            &self.runtime,
            self.events.clone(),
            self.media.clone(),
        )?;
        if let Err(e) = self.registry.insert(channel.clone()) {
            channel.close(CloseReason::Requested);
            return Err(e.into());
        }
        Ok(channel)
    }

    #[must_use]
    pub fn channel(&self, call_id: &str) -> Option<Arc<MediaChannel>> {
        self.registry.get(call_id)
    }

    /// Closes and forgets a channel. Returns whether it was known.
    pub fn close_channel(&self, call_id: &str) -> bool {
        match self.registry.remove(call_id) {
            Some(channel) => {
                channel.close(CloseReason::Requested);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn call_ids(&self) -> Vec<String> {
        self.registry.call_ids()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Closes every channel, then stops the executor and the poll loops.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        sink_debug!(
            self.runtime.logger,
            "[GATEWAY] closing {} channel(s)",
            self.registry.len()
        );
        self.registry.close_all(&CloseReason::Shutdown);
        self.runtime.executor.shutdown();
        self.runtime.multiplexer.stop();
        sink_info!(self.runtime.logger, "[GATEWAY] shut down");
    }
}

impl Drop for MediaGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::{ice::IceCredentials, log::NoopLogSink};
    use std::{
        net::SocketAddr,
        sync::mpsc::{self, Receiver},
        time::Duration,
    };

    fn config() -> GatewayConfig {
        GatewayConfig {
            pool_size: 2,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..GatewayConfig::default()
        }
    }

    fn gateway() -> (MediaGateway, Receiver<MediaEvent>) {
        let (events_tx, events_rx) = mpsc::channel();
        let (media_tx, _media_rx) = mpsc::channel();
        let gw = MediaGateway::start(&config(), events_tx, media_tx, Arc::new(NoopLogSink)).unwrap();
        (gw, events_rx)
    }

    fn params(call_id: &str) -> ChannelParams {
        ChannelParams {
            call_id: call_id.to_string(),
            local_credentials: IceCredentials::generate(),
            remote_credentials: IceCredentials::generate(),
            remote_candidates: Vec::new(),
            remote_payload_types: vec![96],
            controlling: false,
            remote_fingerprint: None,
        }
    }

    #[test]
    fn opens_and_closes_channels_by_call_id() {
        let (gw, events) = gateway();
        let ch = gw.open_channel(params("call-1")).unwrap();
        assert_eq!(ch.call_id(), "call-1");
        assert!(ch.local_addr().port() > 0);
        assert_eq!(gw.channel_count(), 1);
        assert!(gw.channel("call-1").is_some());

        assert!(gw.close_channel("call-1"));
        assert!(!gw.close_channel("call-1"));
        assert_eq!(gw.channel_count(), 0);
        let ev = events.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(
            ev,
            MediaEvent::ChannelClosed {
                call_id: "call-1".into(),
                reason: CloseReason::Requested
            }
        );
    }

    #[test]
    fn duplicate_call_id_is_rejected() {
        let (gw, _events) = gateway();
        let first = gw.open_channel(params("dup")).unwrap();
        let shown = format!("{:?}", first);
        assert!(shown.contains("\"dup\"") && shown.contains("closed: false"));
        let err = gw.open_channel(params("dup")).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Channel(ChannelError::DuplicateCallId(ref id)) if id == "dup"
        ));
    }

    #[test]
    fn shutdown_closes_everything_and_is_idempotent() {
        let (gw, events) = gateway();
        let a = gw.open_channel(params("a")).unwrap();
        let b = gw.open_channel(params("b")).unwrap();
        gw.shutdown();
        gw.shutdown();
        assert!(a.is_channel_closed() && b.is_channel_closed());
        assert!(!gw.is_running());
        assert!(matches!(gw.open_channel(params("c")), Err(GatewayError::ShutDown)));

        let closed: Vec<_> = events.try_iter().collect();
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|e| matches!(
            e,
            MediaEvent::ChannelClosed { reason: CloseReason::Shutdown, .. }
        )));
    }

    #[test]
    fn fingerprint_comes_from_identity() {
        let (gw, _events) = gateway();
        assert_eq!(gw.fingerprint().split(':').count(), 32);
    }
}

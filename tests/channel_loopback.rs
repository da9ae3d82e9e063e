#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        mpsc::{self, Receiver},
    },
    time::{Duration, Instant},
};

use byteorder::{BigEndian, WriteBytesExt};
use rustygate::{
    channel::{ChannelParams, CloseReason, InboundMedia, MediaEvent},
    config::GatewayConfig,
    dtls::DtlsHandshakeState,
    gateway::MediaGateway,
    ice::IceCredentials,
    log::NoopLogSink,
    pipeline::MediaKind,
};

const WAIT: Duration = Duration::from_secs(10);

struct Side {
    gateway: MediaGateway,
    events: Receiver<MediaEvent>,
    media: Receiver<InboundMedia>,
}

fn loopback_config() -> GatewayConfig {
    GatewayConfig {
        pool_size: 2,
        stun_interval: Duration::from_millis(50),
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..GatewayConfig::default()
    }
}

fn side(config: &GatewayConfig) -> Side {
    let (events_tx, events) = mpsc::channel();
    let (media_tx, media) = mpsc::channel();
    let gateway = MediaGateway::start(config, events_tx, media_tx, Arc::new(NoopLogSink)).unwrap();
    Side {
        gateway,
        events,
        media,
    }
}

/// Waits for the first event matching `pred`, skipping the others.
fn wait_for(events: &Receiver<MediaEvent>, pred: impl Fn(&MediaEvent) -> bool) -> MediaEvent {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let ev = events.recv_timeout(left).expect("timed out waiting for event");
        if pred(&ev) {
            return ev;
        }
    }
}

fn rtp_packet(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut p = vec![0x80, 96];
    p.write_u16::<BigEndian>(seq).unwrap();
    p.write_u32::<BigEndian>(u32::from(seq) * 3000).unwrap();
    p.write_u32::<BigEndian>(ssrc).unwrap();
    p.extend_from_slice(payload);
    p
}

fn receiver_report(reporter: u32, source: u32, fraction_lost: u8) -> Vec<u8> {
    let mut p = vec![0x81, 201];
    p.write_u16::<BigEndian>(7).unwrap();
    p.write_u32::<BigEndian>(reporter).unwrap();
    p.write_u32::<BigEndian>(source).unwrap();
    p.write_u8(fraction_lost).unwrap();
    p.write_u24::<BigEndian>(42).unwrap();
    p.write_u32::<BigEndian>(1000).unwrap(); // highest seq
    p.write_u32::<BigEndian>(5).unwrap(); // jitter
    p.write_u32::<BigEndian>(0).unwrap(); // lsr
    p.write_u32::<BigEndian>(0).unwrap(); // dlsr
    p
}

#[test]
fn two_channels_negotiate_and_exchange_srtp() {
    let config = loopback_config();
    let controlling = side(&config);
    let controlled = side(&config);

    let creds_a = IceCredentials::generate();
    let creds_b = IceCredentials::generate();

    let chan_b = controlled
        .gateway
        .open_channel(ChannelParams {
            call_id: "call-b".into(),
            local_credentials: creds_b.clone(),
            remote_credentials: creds_a.clone(),
            remote_candidates: Vec::new(),
            remote_payload_types: vec![96],
            controlling: false,
            remote_fingerprint: Some(controlling.gateway.fingerprint().to_string()),
        })
        .unwrap();
    let chan_a = controlling
        .gateway
        .open_channel(ChannelParams {
            call_id: "call-a".into(),
            local_credentials: creds_a,
            remote_credentials: creds_b,
            remote_candidates: vec![chan_b.local_addr()],
            remote_payload_types: vec![96],
            controlling: true,
            remote_fingerprint: Some(controlled.gateway.fingerprint().to_string()),
        })
        .unwrap();

    let selected = wait_for(&controlled.events, |e| {
        matches!(e, MediaEvent::CandidateSelected { .. })
    });
    assert!(matches!(
        selected,
        MediaEvent::CandidateSelected { remote, .. } if remote == chan_a.local_addr()
    ));
    wait_for(&controlling.events, |e| matches!(e, MediaEvent::HandshakeComplete { .. }));
    wait_for(&controlled.events, |e| matches!(e, MediaEvent::HandshakeComplete { .. }));
    assert!(chan_a.is_ready() && chan_b.is_ready());
    assert_eq!(chan_a.dtls_state(), DtlsHandshakeState::Complete);
    assert_eq!(chan_b.remote(), Some(chan_a.local_addr()));

    // RTP a -> b
    let clear = rtp_packet(1, 0x1111_2222, b"frame-one");
    chan_a.send_rtp(&clear).unwrap();
    let got = controlled.media.recv_timeout(WAIT).unwrap();
    assert_eq!(got.call_id, "call-b");
    assert_eq!(got.kind, MediaKind::Rtp);
    assert_eq!(got.packet, clear);
    assert_eq!(got.from, chan_a.local_addr());

    // RTCP b -> a, lossy enough to raise a congestion signal
    let report = receiver_report(0x3333_4444, 0x1111_2222, 128);
    chan_b.send_rtcp(&report).unwrap();
    let got = controlling.media.recv_timeout(WAIT).unwrap();
    assert_eq!(got.kind, MediaKind::Rtcp);
    assert_eq!(got.packet, report);
    let signal = wait_for(&controlling.events, |e| {
        matches!(e, MediaEvent::CongestionSignal { .. })
    });
    match signal {
        MediaEvent::CongestionSignal { call_id, signal } => {
            assert_eq!(call_id, "call-a");
            assert_eq!(signal.source_ssrc, 0x1111_2222);
            assert!((signal.loss_ratio - 0.5).abs() < f32::EPSILON);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(chan_b.stats().accepted, 1);
    assert_eq!(chan_a.stats().accepted, 1);

    controlling.gateway.shutdown();
    controlled.gateway.shutdown();
    assert!(chan_a.is_channel_closed() && !chan_a.is_ready());
    assert_eq!(chan_a.dtls_state(), DtlsHandshakeState::Complete);
}

#[test]
fn unexpected_payload_type_is_not_forwarded() {
    let config = loopback_config();
    let controlling = side(&config);
    let controlled = side(&config);
    let creds_a = IceCredentials::generate();
    let creds_b = IceCredentials::generate();

    let chan_b = controlled
        .gateway
        .open_channel(ChannelParams {
            call_id: "pt-b".into(),
            local_credentials: creds_b.clone(),
            remote_credentials: creds_a.clone(),
            remote_candidates: Vec::new(),
            remote_payload_types: vec![111],
            controlling: false,
            remote_fingerprint: None,
        })
        .unwrap();
    let chan_a = controlling
        .gateway
        .open_channel(ChannelParams {
            call_id: "pt-a".into(),
            local_credentials: creds_a,
            remote_credentials: creds_b,
            remote_candidates: vec![chan_b.local_addr()],
            remote_payload_types: Vec::new(),
            controlling: true,
            remote_fingerprint: None,
        })
        .unwrap();
    wait_for(&controlled.events, |e| matches!(e, MediaEvent::HandshakeComplete { .. }));
    wait_for(&controlling.events, |e| matches!(e, MediaEvent::HandshakeComplete { .. }));

    chan_a.send_rtp(&rtp_packet(9, 0xABCD, b"pt96")).unwrap();
    assert!(controlled.media.recv_timeout(Duration::from_millis(300)).is_err());
    // Authenticated and decrypted, just not one of the negotiated types.
    assert_eq!(chan_b.stats().accepted, 1);
}

#[test]
fn send_before_keys_is_not_ready() {
    let s = side(&loopback_config());
    let ch = s
        .gateway
        .open_channel(ChannelParams {
            call_id: "early".into(),
            local_credentials: IceCredentials::generate(),
            remote_credentials: IceCredentials::generate(),
            remote_candidates: Vec::new(),
            remote_payload_types: Vec::new(),
            controlling: true,
            remote_fingerprint: None,
        })
        .unwrap();
    assert!(!ch.is_ready());
    assert!(ch.send_rtp(&rtp_packet(1, 1, b"x")).is_err());
    s.gateway.close_channel("early");
    let closed = wait_for(&s.events, |e| matches!(e, MediaEvent::ChannelClosed { .. }));
    assert_eq!(
        closed,
        MediaEvent::ChannelClosed {
            call_id: "early".into(),
            reason: CloseReason::Requested
        }
    );
    assert!(ch.send_rtp(&rtp_packet(2, 1, b"x")).is_err());
}


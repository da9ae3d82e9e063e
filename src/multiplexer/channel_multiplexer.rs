use std::{
    collections::HashMap,
    io,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use mio::{Events, Interest, Poll, Registry, Token, net::UdpSocket};

use super::{multiplexer_error::MultiplexerError, poll_owner::PollOwner};
use crate::{log::log_sink::LogSink, sink_debug, sink_error, sink_info, sink_warn};

const EVENTS_CAPACITY: usize = 256;

/// Where a socket lives in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration {
    pub member: usize,
    pub token: Token,
}

type OwnerMap = Mutex<HashMap<Token, Weak<dyn PollOwner>>>;

struct PollMember {
    registry: Registry,
    owners: Arc<OwnerMap>,
    next_token: AtomicUsize,
}

struct Running {
    members: Vec<PollMember>,
    threads: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

/// Fixed pool of `mio::Poll` loops shared by every channel.
///
/// Sockets are spread round-robin at registration. A loop never reads or
/// writes itself; it calls back into the owning [`PollOwner`].
pub struct ChannelMultiplexer {
    pool_size: usize,
    poll_interval: Duration,
    counter: AtomicUsize,
    running: Mutex<Option<Running>>,
    logger: Arc<dyn LogSink>,
}

impl ChannelMultiplexer {
    pub fn new(pool_size: usize, poll_interval: Duration, logger: Arc<dyn LogSink>) -> Self {
        Self {
            pool_size: pool_size.max(1),
            poll_interval,
            counter: AtomicUsize::new(0),
            running: Mutex::new(None),
            logger,
        }
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Spawns the poll threads. A second call is a no-op.
    pub fn start(&self) -> Result<(), MultiplexerError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let mut members = Vec::with_capacity(self.pool_size);
        let mut threads = Vec::with_capacity(self.pool_size);
        for index in 0..self.pool_size {
            let setup = Poll::new().and_then(|poll| {
                let registry = poll.registry().try_clone()?;
                Ok((poll, registry))
            });
            let (poll, registry) = match setup {
                Ok(pair) => pair,
                Err(e) => {
                    abort_started(&stop, threads);
                    return Err(e.into());
                }
            };
            let owners: Arc<OwnerMap> = Arc::new(Mutex::new(HashMap::new()));
            members.push(PollMember {
                registry,
                owners: owners.clone(),
                next_token: AtomicUsize::new(0),
            });

            let loop_stop = stop.clone();
            let logger = self.logger.clone();
            let interval = self.poll_interval;
            let spawned = thread::Builder::new()
                .name(format!("mux-{}", index))
                .spawn(move || run_poll_loop(index, poll, &owners, &loop_stop, interval, &logger));
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    abort_started(&stop, threads);
                    return Err(e.into());
                }
            }
        }

        sink_info!(
            self.logger,
            "[MUX] started {} poll loops (interval {:?})",
            self.pool_size,
            self.poll_interval
        );
        *running = Some(Running {
            members,
            threads,
            stop,
        });
        Ok(())
    }

    /// Signals and joins every loop, then drops all polls and bookkeeping.
    /// A second call is a no-op.
    pub fn stop(&self) {
        // Taken out before joining: owners may call deregister from a loop.
        let taken = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(r) = taken else {
            return;
        };
        r.stop.store(true, Ordering::SeqCst);
        for t in r.threads {
            let _ = t.join();
        }
        for m in &r.members {
            m.owners.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
        sink_info!(self.logger, "[MUX] stopped");
    }

    /// Adds `socket` to the next pool member, round-robin.
    pub fn register(
        &self,
        socket: &mut UdpSocket,
        owner: Weak<dyn PollOwner>,
    ) -> Result<Registration, MultiplexerError> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let r = running.as_ref().ok_or(MultiplexerError::NotRunning)?;

        let member_index = self.counter.fetch_add(1, Ordering::SeqCst) % r.members.len();
        let member = &r.members[member_index];
        let token = Token(member.next_token.fetch_add(1, Ordering::SeqCst));

        member.owners.lock().unwrap_or_else(|e| e.into_inner()).insert(token, owner);
        if let Err(e) = member
            .registry
            .register(socket, token, Interest::READABLE | Interest::WRITABLE)
        {
            member.owners.lock().unwrap_or_else(|e| e.into_inner()).remove(&token);
            return Err(e.into());
        }

        let registration = Registration {
            member: member_index,
            token,
        };
        sink_debug!(self.logger, "[MUX] registered {:?}", registration);
        Ok(registration)
    }

    pub fn deregister(
        &self,
        socket: &mut UdpSocket,
        registration: Registration,
    ) -> Result<(), MultiplexerError> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let r = running.as_ref().ok_or(MultiplexerError::NotRunning)?;
        let member = r
            .members
            .get(registration.member)
            .ok_or(MultiplexerError::UnknownRegistration(registration))?;

        let removed = member
            .owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&registration.token);
        if removed.is_none() {
            return Err(MultiplexerError::UnknownRegistration(registration));
        }
        member.registry.deregister(socket)?;
        sink_debug!(self.logger, "[MUX] deregistered {:?}", registration);
        Ok(())
    }

    /// Live registrations per pool member.
    #[must_use]
    pub fn registrations(&self) -> Vec<usize> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running
            .as_ref()
            .map(|r| {
                r.members
                    .iter()
                    .map(|m| m.owners.lock().unwrap_or_else(|e| e.into_inner()).len())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for ChannelMultiplexer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Signals and joins the loops spawned so far by a failed `start`.
fn abort_started(stop: &AtomicBool, threads: Vec<JoinHandle<()>>) {
    stop.store(true, Ordering::SeqCst);
    for t in threads {
        let _ = t.join();
    }
}

fn run_poll_loop(
    index: usize,
    mut poll: Poll,
    owners: &OwnerMap,
    stop: &AtomicBool,
    interval: Duration,
    logger: &Arc<dyn LogSink>,
) {
    let mut events = Events::with_capacity(EVENTS_CAPACITY);
    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = poll.poll(&mut events, Some(interval)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            sink_error!(logger, "[MUX] poll loop {} failed: {}", index, e);
            break;
        }

        let ready: Vec<(bool, Arc<dyn PollOwner>)> = {
            let map = owners.lock().unwrap_or_else(|e| e.into_inner());
            events
                .iter()
                .filter_map(|ev| {
                    map.get(&ev.token())
                        .and_then(Weak::upgrade)
                        .map(|owner| (ev.is_readable(), owner))
                })
                .collect()
        };

        for (readable, owner) in ready {
            if owner.is_closed() {
                continue;
            }
            if readable {
                owner.receive();
            }
            if owner.has_pending_output() {
                owner.send();
            }
        }
    }
    if !stop.load(Ordering::SeqCst) {
        sink_warn!(logger, "[MUX] poll loop {} exited early", index);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use std::{net::SocketAddr, time::Instant};

    #[derive(Default)]
    struct CountingOwner {
        socket: Mutex<Option<UdpSocket>>,
        received: AtomicUsize,
        closed: AtomicBool,
    }

    impl PollOwner for CountingOwner {
        fn receive(&self) {
            let guard = self.socket.lock().unwrap();
            let Some(sock) = guard.as_ref() else { return };
            let mut buf = [0u8; 1500];
            while sock.recv_from(&mut buf).is_ok() {
                self.received.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn has_pending_output(&self) -> bool {
            false
        }

        fn send(&self) {}

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn mux(pool: usize) -> ChannelMultiplexer {
        ChannelMultiplexer::new(pool, Duration::from_millis(1), Arc::new(NoopLogSink))
    }

    fn bind() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    fn owner_with(sock: UdpSocket) -> (Arc<CountingOwner>, SocketAddr) {
        let addr = sock.local_addr().unwrap();
        let owner = Arc::new(CountingOwner::default());
        *owner.socket.lock().unwrap() = Some(sock);
        (owner, addr)
    }

    fn register(m: &ChannelMultiplexer, owner: &Arc<CountingOwner>) -> Registration {
        let dyn_owner: Arc<dyn PollOwner> = owner.clone();
        let mut guard = owner.socket.lock().unwrap();
        m.register(guard.as_mut().unwrap(), Arc::downgrade(&dyn_owner))
            .unwrap()
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn sockets_are_assigned_round_robin() {
        let m = mux(3);
        m.start().unwrap();
        let owners: Vec<_> = (0..6).map(|_| owner_with(bind()).0).collect();
        let members: Vec<usize> = owners.iter().map(|o| register(&m, o).member).collect();
        assert_eq!(members, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(m.registrations(), vec![2, 2, 2]);
        m.stop();
    }

    #[test]
    fn readable_socket_calls_owner_receive() {
        let m = mux(2);
        m.start().unwrap();
        let (owner, addr) = owner_with(bind());
        let _reg = register(&m, &owner);

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"ping", addr).unwrap();
        sender.send_to(b"pong", addr).unwrap();
        assert!(wait_for(|| owner.received.load(Ordering::SeqCst) == 2));
        m.stop();
    }

    #[test]
    fn closed_owner_is_skipped() {
        let m = mux(1);
        m.start().unwrap();
        let (owner, addr) = owner_with(bind());
        let _reg = register(&m, &owner);
        owner.closed.store(true, Ordering::SeqCst);

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"ignored", addr).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(owner.received.load(Ordering::SeqCst), 0);
        m.stop();
    }

    #[test]
    fn deregister_removes_bookkeeping() {
        let m = mux(1);
        m.start().unwrap();
        let (owner, _) = owner_with(bind());
        let reg = register(&m, &owner);
        let mut guard = owner.socket.lock().unwrap();
        m.deregister(guard.as_mut().unwrap(), reg).unwrap();
        assert_eq!(m.registrations(), vec![0]);
        assert!(matches!(
            m.deregister(guard.as_mut().unwrap(), reg),
            Err(MultiplexerError::UnknownRegistration(_))
        ));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let m = mux(2);
        m.start().unwrap();
        m.start().unwrap();
        assert!(m.is_running());
        m.stop();
        m.stop();
        assert!(!m.is_running());
        assert!(m.registrations().is_empty());

        let (owner, _) = owner_with(bind());
        let dyn_owner: Arc<dyn PollOwner> = owner.clone();
        let mut guard = owner.socket.lock().unwrap();
        assert!(matches!(
            m.register(guard.as_mut().unwrap(), Arc::downgrade(&dyn_owner)),
            Err(MultiplexerError::NotRunning)
        ));
    }
}

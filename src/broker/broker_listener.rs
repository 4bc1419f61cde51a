use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::broker::broker_config::BrokerConfig;
use crate::broker::broker_error::BrokerError;
use crate::broker::cancel_token::CancelToken;
use crate::broker::live_sessions::LiveSessions;
use crate::broker::queue_registry::QueueRegistry;
use crate::broker::session::Session;
use crate::broker::types::SessionId;
use crate::log::LogSink;
use crate::{sink_debug, sink_info, sink_warn};

/// Pause after a failed `accept` (e.g. out of file descriptors) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
/// Upper bound on the self-connect that wakes the accept thread.
const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// A running broker: one accept thread plus one thread per session.
///
/// Everything a broker owns (registry, sessions, cancellation root) is per
/// instance, so several brokers can share a process.
///
/// ```no_run
/// use std::sync::Arc;
/// use rustymq::broker::{Broker, BrokerConfig};
/// use rustymq::log::NoopLogSink;
///
/// let mut broker = Broker::start(&BrokerConfig::local(0), Arc::new(NoopLogSink))?;
/// println!("listening on {}", broker.local_addr());
/// broker.stop();
/// # Ok::<(), rustymq::broker::BrokerError>(())
/// ```
pub struct Broker {
    local_addr: SocketAddr,
    registry: Arc<QueueRegistry>,
    live: Arc<LiveSessions>,
    shutdown: CancelToken,
    accept_thread: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
    log: Arc<dyn LogSink>,
    stopped: bool,
}

impl Broker {
    /// Bind and start accepting connections.
    ///
    /// # Errors
    /// [`BrokerError::Bind`] if the address is unavailable; [`BrokerError::Io`]
    /// if the accept thread cannot be spawned.
    pub fn start(config: &BrokerConfig, log: Arc<dyn LogSink>) -> Result<Self, BrokerError> {
        Self::start_with_registry(config, log, Arc::new(QueueRegistry::new()))
    }

    /// Like [`start`](Self::start), serving the queues of `registry`.
    pub fn start_with_registry(
        config: &BrokerConfig,
        log: Arc<dyn LogSink>,
        registry: Arc<QueueRegistry>,
    ) -> Result<Self, BrokerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| BrokerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let live = Arc::new(LiveSessions::new());
        let shutdown = CancelToken::new();

        let accept_thread = {
            let registry = Arc::clone(&registry);
            let live = Arc::clone(&live);
            let shutdown = shutdown.clone();
            let log = Arc::clone(&log);
            thread::Builder::new()
                .name("broker-accept".into())
                .spawn(move || accept_loop(listener, registry, live, shutdown, log))?
        };

        sink_info!(log, "broker listening on {}", local_addr);

        Ok(Self {
            local_addr,
            registry,
            live,
            shutdown,
            accept_thread: Some(accept_thread),
            shutdown_timeout: config.shutdown_timeout,
            log,
            stopped: false,
        })
    }

    /// The bound address; with port `0` in the config this carries the real port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Number of sessions that have not finished yet.
    pub fn live_sessions(&self) -> usize {
        self.live.len()
    }

    /// Stop accepting, cancel every session and wait for them to finish.
    ///
    /// Blocked consumers are released and sent the close sentinel; blocked
    /// producer reads are released by shutting down the read half of their
    /// sockets. Sessions still running after `shutdown_timeout` have their
    /// sockets shut down completely.
    ///
    /// Returns `true` if every session finished within the timeout. Messages
    /// still queued are left in memory. Calling it again is a no-op.
    pub fn stop(&mut self) -> bool {
        if self.stopped {
            return self.live.is_empty();
        }
        self.stopped = true;

        sink_info!(self.log, "broker on {} stopping", self.local_addr);
        self.shutdown.cancel();
        self.stop_accepting();

        self.live.shutdown_all(Shutdown::Read);
        let drained = self.live.wait_empty(self.shutdown_timeout);
        if !drained {
            let stragglers = self.live.ids();
            self.live.shutdown_all(Shutdown::Both);
            sink_warn!(
                self.log,
                "broker on {} forced sessions {:?} closed after {:?}",
                self.local_addr,
                stragglers,
                self.shutdown_timeout
            );
        }

        sink_info!(
            self.log,
            "broker on {} stopped; {} message(s) left in {} queue(s)",
            self.local_addr,
            self.registry.snapshot().iter().map(|q| q.depth).sum::<usize>(),
            self.registry.len()
        );
        drained
    }

    /// Block until the accept thread exits, which only happens on `stop()`.
    pub fn wait(&mut self) {
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }

    /// Wake the blocked `accept` with a connection to ourselves, then join the thread.
    fn stop_accepting(&mut self) {
        let Some(handle) = self.accept_thread.take() else {
            return;
        };

        match TcpStream::connect_timeout(&wake_addr(self.local_addr), WAKE_CONNECT_TIMEOUT) {
            Ok(_) => {
                let _ = handle.join();
            }
            Err(e) => {
                // Leave the thread detached; it exits on its next accept.
                sink_warn!(self.log, "could not wake accept thread: {}", e);
            }
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Where to connect to reach a listener bound to `addr`.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

fn accept_loop(
    listener: TcpListener,
    registry: Arc<QueueRegistry>,
    live: Arc<LiveSessions>,
    shutdown: CancelToken,
    log: Arc<dyn LogSink>,
) {
    let mut next_session_id: SessionId = 1;

    for stream in listener.incoming() {
        if shutdown.is_cancelled() {
            break;
        }

        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                sink_warn!(log, "incoming TCP accept failed: {} (continuing to accept)", e);
                thread::sleep(ACCEPT_BACKOFF);
                continue;
            }
        };

        let id = next_session_id;
        next_session_id += 1;

        if let Err(e) = spawn_session(id, stream, &registry, &live, &shutdown, &log) {
            sink_warn!(log, "failed to start session {}: {}", id, e);
        }
    }

    sink_debug!(log, "accept loop exited");
}

fn spawn_session(
    id: SessionId,
    stream: TcpStream,
    registry: &Arc<QueueRegistry>,
    live: &Arc<LiveSessions>,
    shutdown: &CancelToken,
    log: &Arc<dyn LogSink>,
) -> io::Result<()> {
    let _ = stream.set_nodelay(true);
    live.insert(id, stream.try_clone()?);

    let session = match Session::new(id, stream, Arc::clone(registry), shutdown, Arc::clone(log)) {
        Ok(session) => session,
        Err(e) => {
            live.remove(id);
            return Err(e);
        }
    };

    sink_debug!(log, "accepted connection as session {}", id);

    let live_for_session = Arc::clone(live);
    let spawned = thread::Builder::new()
        .name(format!("session-{id}"))
        .spawn(move || {
            let _ = session.run();
            live_for_session.remove(id);
        });

    if let Err(e) = spawned {
        live.remove(id);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::client::Consumer;
    use crate::log::NoopLogSink;
    use crate::log::log_level::LogLevel;
    use crate::protocol::QueueName;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<String>>);

    impl LogSink for CollectingSink {
        fn log(&self, _level: LogLevel, msg: &str, _target: &'static str) {
            self.0.lock().unwrap().push(msg.to_string());
        }
    }

    impl CollectingSink {
        fn contains(&self, needle: &str) -> bool {
            self.0.lock().unwrap().iter().any(|line| line.contains(needle))
        }
    }

    #[test]
    fn ephemeral_port_is_reported() {
        let mut broker = Broker::start(&BrokerConfig::local(0), Arc::new(NoopLogSink)).unwrap();
        assert_ne!(broker.local_addr().port(), 0);
        assert!(broker.stop());
    }

    #[test]
    fn stop_is_idempotent_and_fast_when_idle() {
        let mut broker = Broker::start(&BrokerConfig::local(0), Arc::new(NoopLogSink)).unwrap();
        let start = Instant::now();
        assert!(broker.stop());
        assert!(broker.stop());
        assert!(start.elapsed() < Duration::from_secs(1));
        broker.wait();
    }

    #[test]
    fn second_broker_on_same_port_fails_to_bind() {
        let first = Broker::start(&BrokerConfig::local(0), Arc::new(NoopLogSink)).unwrap();
        let port = first.local_addr().port();

        match Broker::start(&BrokerConfig::local(port), Arc::new(NoopLogSink)) {
            Err(BrokerError::Bind { addr, .. }) => assert_eq!(addr, format!("127.0.0.1:{port}")),
            Err(other) => panic!("expected Bind, got {other}"),
            Ok(_) => panic!("second bind should fail"),
        }
    }

    #[test]
    fn wake_addr_maps_unspecified_to_loopback() {
        let any: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        assert_eq!(wake_addr(any), "127.0.0.1:4000".parse().unwrap());
        let any6: SocketAddr = "[::]:4000".parse().unwrap();
        assert_eq!(wake_addr(any6), "[::1]:4000".parse().unwrap());
        let fixed: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(wake_addr(fixed), fixed);
    }

    #[test]
    fn stop_reports_messages_left_behind() {
        let sink = Arc::new(CollectingSink::default());
        let mut broker = Broker::start(&BrokerConfig::local(0), sink.clone()).unwrap();
        let queue = broker
            .registry()
            .get_or_create_queue(&QueueName::new("left").unwrap());
        queue.enqueue(Bytes::from_static(b"a"));
        queue.enqueue(Bytes::from_static(b"b"));

        assert!(broker.stop());
        assert!(sink.contains("2 message(s) left in 1 queue(s)"));
    }

    #[test]
    fn stop_forces_a_session_stuck_writing() {
        let sink = Arc::new(CollectingSink::default());
        let config = BrokerConfig::local(0).with_shutdown_timeout(Duration::from_millis(100));
        let mut broker = Broker::start(&config, sink.clone()).unwrap();
        let port = broker.local_addr().port();

        // Far more than loopback socket buffers hold; the consumer never reads.
        let queue = broker
            .registry()
            .get_or_create_queue(&QueueName::new("flood").unwrap());
        let big = Bytes::from(vec![0u8; 65_535]);
        for _ in 0..512 {
            queue.enqueue(big.clone());
        }
        let _consumer = Consumer::connect("flood", "127.0.0.1", port).unwrap();

        // Wait until the session has stopped making progress.
        let mut last = usize::MAX;
        loop {
            thread::sleep(Duration::from_millis(50));
            let depth = queue.len();
            if depth == last {
                break;
            }
            last = depth;
        }

        let start = Instant::now();
        assert!(!broker.stop(), "a blocked writer cannot finish on its own");
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(sink.contains("forced sessions [1] closed"));
    }
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use rustymq::broker::{Broker, BrokerConfig, QueueRegistry, RegistryEvent};
use rustymq::client::{ClientError, Consumer, Producer};
use rustymq::log::log_level::LogLevel;
use rustymq::log::{LogSink, NoopLogSink};
use rustymq::protocol::{FrameError, read_frame, write_frame};

const HOST: &str = "127.0.0.1";
const WAIT: Duration = Duration::from_secs(3);

fn start_broker() -> (Broker, Receiver<RegistryEvent>) {
    let (tx, rx) = mpsc::channel();
    let registry = Arc::new(QueueRegistry::with_observer(tx));
    let broker =
        Broker::start_with_registry(&BrokerConfig::local(0), Arc::new(NoopLogSink), registry)
            .unwrap();
    (broker, rx)
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<String>>);

impl LogSink for CollectingSink {
    fn log(&self, _level: LogLevel, msg: &str, _target: &'static str) {
        self.0.lock().unwrap().push(msg.to_string());
    }
}

fn port(broker: &Broker) -> u16 {
    broker.local_addr().port()
}

/// Poll until `n` consumers are parked on `queue`.
fn wait_for_waiters(broker: &Broker, queue: &str, n: usize) {
    let deadline = Instant::now() + WAIT;
    loop {
        let waiting = broker
            .registry()
            .stats(queue)
            .map_or(0, |s| s.waiting_consumers);
        if waiting >= n {
            return;
        }
        assert!(Instant::now() < deadline, "{n} consumer(s) never waited on {queue}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Drain events until `count` messages have been enqueued on `queue`.
fn wait_for_enqueued(events: &Receiver<RegistryEvent>, queue: &str, count: usize) {
    let mut seen = 0;
    while seen < count {
        match events.recv_timeout(WAIT).expect("enqueue event") {
            RegistryEvent::Enqueued { queue: q, .. } if q.as_str() == queue => seen += 1,
            _ => {}
        }
    }
}

#[test]
fn orders_message_is_delivered_and_second_receive_ends_on_stop() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let mut producer = Producer::connect("orders", HOST, port).unwrap();
    producer.send(b"\x01\x02\x03").unwrap();

    let (tx, rx) = mpsc::channel();
    let consumer = thread::spawn(move || {
        let mut consumer = Consumer::connect("orders", HOST, port).unwrap();
        tx.send(consumer.receive()).unwrap();
        tx.send(consumer.receive()).unwrap();
    });

    let first = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(first, Bytes::from_static(b"\x01\x02\x03"));

    // The second receive has nothing to return until the broker stops.
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

    let stopped_at = Instant::now();
    assert!(broker.stop());
    let second = rx.recv_timeout(WAIT).expect("receive released by stop");
    assert!(matches!(second, Err(ClientError::Canceled)), "got {second:?}");
    assert!(stopped_at.elapsed() < WAIT);

    consumer.join().unwrap();
}

#[test]
fn single_consumer_sees_every_message_in_order() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let mut producer = Producer::connect("seq", HOST, port).unwrap();
    for i in 0u16..500 {
        producer.send(&i.to_be_bytes()).unwrap();
    }

    let mut consumer = Consumer::connect("seq", HOST, port).unwrap();
    for i in 0u16..500 {
        let message = consumer.receive().unwrap();
        assert_eq!(&message[..], &i.to_be_bytes());
    }
    assert_eq!(consumer.receive_timeout(Duration::from_millis(50)).unwrap(), None);

    producer.close().unwrap();
    consumer.close().unwrap();
    broker.stop();
}

#[test]
fn each_producer_keeps_its_own_order() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let producers: Vec<_> = (0u8..3)
        .map(|tag| {
            thread::spawn(move || {
                let mut producer = Producer::connect("shared", HOST, port).unwrap();
                for seq in 0u8..100 {
                    producer.send(&[tag, seq]).unwrap();
                }
                producer.close().unwrap();
            })
        })
        .collect();

    let mut consumer = Consumer::connect("shared", HOST, port).unwrap();
    let mut next = [0u8; 3];
    for _ in 0..300 {
        let message = consumer.receive().unwrap();
        let (tag, seq) = (message[0] as usize, message[1]);
        assert_eq!(seq, next[tag], "producer {tag} reordered");
        next[tag] += 1;
    }
    assert_eq!(next, [100, 100, 100]);

    for p in producers {
        p.join().unwrap();
    }
    broker.stop();
}

#[test]
fn alternating_producers_interleave_in_enqueue_order() {
    let (mut broker, events) = start_broker();
    let port = port(&broker);

    let mut producers: Vec<Producer> = (0..3)
        .map(|_| Producer::connect("turns", HOST, port).unwrap())
        .collect();

    let mut expected = Vec::new();
    for round in 0u8..10 {
        for (tag, producer) in producers.iter_mut().enumerate() {
            let message = [tag as u8, round];
            producer.send(&message).unwrap();
            // The next producer only sends once this one's message is queued.
            wait_for_enqueued(&events, "turns", 1);
            expected.push(message.to_vec());
        }
    }

    let mut consumer = Consumer::connect("turns", HOST, port).unwrap();
    let got: Vec<Vec<u8>> = (0..30)
        .map(|_| consumer.receive().unwrap().to_vec())
        .collect();
    assert_eq!(got, expected);
    broker.stop();
}

#[test]
fn queues_do_not_leak_into_each_other() {
    let (mut broker, events) = start_broker();
    let port = port(&broker);

    let mut producer = Producer::connect("A", HOST, port).unwrap();
    producer.send(b"for A").unwrap();
    wait_for_enqueued(&events, "A", 1);

    let mut consumer_b = Consumer::connect("B", HOST, port).unwrap();
    assert_eq!(consumer_b.receive_timeout(Duration::from_millis(150)).unwrap(), None);

    let mut consumer_a = Consumer::connect("A", HOST, port).unwrap();
    assert_eq!(consumer_a.receive().unwrap(), Bytes::from_static(b"for A"));

    let names: Vec<String> = broker
        .registry()
        .queue_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(names, vec!["A", "B"]);
    broker.stop();
}

#[test]
fn competing_consumers_split_the_queue() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let (tx, rx) = mpsc::channel();
    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let tx = tx.clone();
            thread::spawn(move || {
                let mut consumer = Consumer::connect("work", HOST, port).unwrap();
                while let Ok(message) = consumer.receive() {
                    tx.send(message[0]).unwrap();
                }
            })
        })
        .collect();
    drop(tx);
    wait_for_waiters(&broker, "work", 2);

    let mut producer = Producer::connect("work", HOST, port).unwrap();
    for i in 0u8..40 {
        producer.send(&[i]).unwrap();
    }

    let mut got: Vec<u8> = (0..40).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    got.sort_unstable();
    assert_eq!(got, (0u8..40).collect::<Vec<_>>());

    broker.stop();
    for c in consumers {
        c.join().unwrap();
    }
    assert!(rx.try_recv().is_err(), "a message was delivered twice");
}

#[test]
fn departed_consumer_does_not_swallow_later_messages() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let mut leaving = Consumer::connect("jobs", HOST, port).unwrap();
    wait_for_waiters(&broker, "jobs", 1);
    leaving.close().unwrap();
    assert!(matches!(leaving.receive(), Err(ClientError::AlreadyClosed)));

    let deadline = Instant::now() + WAIT;
    while broker.live_sessions() > 0 {
        assert!(Instant::now() < deadline, "closed consumer session lingered");
        thread::sleep(Duration::from_millis(5));
    }

    let mut producer = Producer::connect("jobs", HOST, port).unwrap();
    producer.send(b"after").unwrap();

    let mut staying = Consumer::connect("jobs", HOST, port).unwrap();
    assert_eq!(staying.receive().unwrap(), Bytes::from_static(b"after"));
    broker.stop();
}

#[test]
fn bogus_role_closes_only_that_connection() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let mut consumer = Consumer::connect("orders", HOST, port).unwrap();
    wait_for_waiters(&broker, "orders", 1);

    let mut raw = TcpStream::connect((HOST, port)).unwrap();
    write_frame(&mut raw, b"bogus").unwrap();
    raw.set_read_timeout(Some(WAIT)).unwrap();
    assert!(matches!(read_frame(&mut raw), Err(FrameError::ConnectionClosed)));

    let mut producer = Producer::connect("orders", HOST, port).unwrap();
    producer.send(b"still up").unwrap();
    assert_eq!(consumer.receive().unwrap(), Bytes::from_static(b"still up"));
    broker.stop();
}

#[test]
fn malformed_length_prefix_drops_the_producer() {
    let (mut broker, events) = start_broker();
    let port = port(&broker);

    let mut raw = TcpStream::connect((HOST, port)).unwrap();
    write_frame(&mut raw, b"producer").unwrap();
    write_frame(&mut raw, b"raw").unwrap();
    write_frame(&mut raw, b"ok").unwrap();
    raw.write_i32::<BigEndian>(-7).unwrap();
    raw.flush().unwrap();
    wait_for_enqueued(&events, "raw", 1);

    raw.set_read_timeout(Some(WAIT)).unwrap();
    assert!(matches!(read_frame(&mut raw), Err(FrameError::ConnectionClosed)));
    assert_eq!(broker.registry().stats("raw").map(|s| s.depth), Some(1));
    broker.stop();
}

#[test]
fn oversized_message_is_rejected_locally() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let mut producer = Producer::connect("big", HOST, port).unwrap();
    let too_big = vec![0u8; 65_536];
    assert!(matches!(
        producer.send(&too_big),
        Err(ClientError::Frame(FrameError::FrameTooLarge { len: 65_536 }))
    ));

    let largest = vec![7u8; 65_535];
    producer.send(&largest).unwrap();

    let mut consumer = Consumer::connect("big", HOST, port).unwrap();
    assert_eq!(consumer.receive().unwrap().len(), 65_535);
    broker.stop();
}

#[test]
fn stop_releases_every_blocked_session() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);

    let (tx, rx) = mpsc::channel();
    for name in ["q1", "q2", "q3"] {
        let tx = tx.clone();
        thread::spawn(move || {
            let mut consumer = Consumer::connect(name, HOST, port).unwrap();
            tx.send(consumer.receive()).unwrap();
        });
    }
    for name in ["q1", "q2", "q3"] {
        wait_for_waiters(&broker, name, 1);
    }
    // An idle producer is blocked in a read, not a dequeue.
    let _idle_producer = Producer::connect("q1", HOST, port).unwrap();

    let start = Instant::now();
    assert!(broker.stop(), "sessions did not finish in time");
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(broker.live_sessions(), 0);

    for _ in 0..3 {
        let result = rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(result, Err(ClientError::Canceled)), "got {result:?}");
    }
}

#[test]
fn stopped_broker_refuses_new_connections() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);
    broker.stop();

    assert!(TcpStream::connect((HOST, port)).is_err());
}

#[test]
fn closing_consumer_loses_only_frames_already_sent_to_it() {
    let (mut broker, events) = start_broker();
    let port = port(&broker);

    let mut producer = Producer::connect("inflight", HOST, port).unwrap();
    for i in 0u8..3 {
        producer.send(&[i]).unwrap();
    }
    wait_for_enqueued(&events, "inflight", 3);

    let mut first = Consumer::connect("inflight", HOST, port).unwrap();
    assert_eq!(&first.receive().unwrap()[..], &[0]);
    first.close().unwrap();

    let deadline = Instant::now() + WAIT;
    while broker.live_sessions() > 1 {
        assert!(Instant::now() < deadline, "closed consumer session lingered");
        thread::sleep(Duration::from_millis(5));
    }

    producer.send(&[9]).unwrap();
    let mut second = Consumer::connect("inflight", HOST, port).unwrap();
    let mut rest = Vec::new();
    loop {
        let message = second.receive().unwrap();
        rest.push(message[0]);
        if message[0] == 9 {
            break;
        }
    }

    // Frames already written to the first socket are gone; the others arrive once, in order.
    assert!(
        matches!(rest.as_slice(), [9] | [2, 9] | [1, 2, 9]),
        "unexpected delivery {rest:?}"
    );
    assert_eq!(broker.registry().stats("inflight").map(|s| s.depth), Some(0));
    broker.stop();
}

#[test]
fn client_handles_log_connect_and_close() {
    let (mut broker, _events) = start_broker();
    let port = port(&broker);
    let sink = Arc::new(CollectingSink::default());

    let mut producer = Producer::connect("logged", HOST, port)
        .unwrap()
        .with_log(sink.clone());
    producer.close().unwrap();

    let lines = sink.0.lock().unwrap().clone();
    assert!(
        lines.iter().any(|l| l.contains("producer for logged connected to 127.0.0.1:")),
        "{lines:?}"
    );
    assert!(
        lines
            .iter()
            .any(|l| l.contains("producer on queue logged closed connection to 127.0.0.1:")),
        "{lines:?}"
    );
    broker.stop();
}

//! Stream transport against a real loopback TCP peer
//!
//! Every test binds its own listener on port 0 and drives the peer side by
//! hand, so framing, reconnect and shutdown are observed on the wire.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sunlink::{StreamTransport, Transport, TransportConfig, TransportError, TransportState};

type StateLog = Arc<Mutex<Vec<(TransportState, String)>>>;

fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn config(port: u16) -> TransportConfig {
    TransportConfig::new("127.0.0.1")
        .with_stream_port(port)
        .with_connect_timeout_ms(1000)
        .with_retry_delay_ms(50)
        .with_max_retry_delay_ms(200)
}

/// Transport wired to a state log and a channel of received messages.
fn transport(port: u16) -> (StreamTransport, StateLog, Receiver<Vec<u8>>) {
    let transport = StreamTransport::new(config(port));
    let log: StateLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    transport.set_state_callback(Box::new(move |state, reason| {
        sink.lock().unwrap().push((state, reason.to_string()));
    }));
    let (tx, rx) = mpsc::channel();
    transport.set_message_callback(Box::new(move |bytes| {
        let _ = tx.send(bytes.to_vec());
    }));
    (transport, log, rx)
}

fn states(log: &StateLog) -> Vec<TransportState> {
    log.lock().unwrap().iter().map(|(s, _)| *s).collect()
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .unwrap();
    stream.write_all(payload).unwrap();
}

fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut payload).unwrap();
    payload
}

#[test]
fn connects_sends_and_receives() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_frame(&mut stream);
        write_frame(&mut stream, &request);
        write_frame(&mut stream, b"second");
        // hold the connection until the client hangs up
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let (transport, log, rx) = transport(port);
    transport.connect().expect("connect");
    assert!(transport.is_connected());
    assert_eq!(
        states(&log),
        vec![TransportState::Connecting, TransportState::Connected]
    );

    assert!(transport.send(b"hello bridge"));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"hello bridge");
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"second");

    transport.disconnect();
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert_eq!(states(&log).last(), Some(&TransportState::Disconnected));
    peer.join().unwrap();
}

#[test]
fn frames_arrive_in_order() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for i in 0u32..200 {
            write_frame(&mut stream, &i.to_be_bytes());
        }
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let (transport, _log, rx) = transport(port);
    transport.connect().expect("connect");
    for i in 0u32..200 {
        let msg = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg, i.to_be_bytes());
    }
    transport.disconnect();
    peer.join().unwrap();
}

#[test]
fn initial_failure_is_reported_but_not_retried() {
    let (listener, port) = listener();
    drop(listener);

    let (transport, log, _rx) = transport(port);
    match transport.connect() {
        Err(TransportError::Connect { .. }) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(
        states(&log),
        vec![TransportState::Connecting, TransportState::Error]
    );

    thread::sleep(Duration::from_millis(300));
    assert_eq!(transport.state(), TransportState::Error);
    assert_eq!(states(&log).len(), 2, "no reconnect after initial failure");
}

#[test]
fn oversized_frame_is_a_protocol_error() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (mut first, _) = listener.accept().unwrap();
        // 2 MiB header and no payload; the client must not wait for it
        first.write_all(&[0x00, 0x20, 0x00, 0x00]).unwrap();
        // the client reconnects
        let (mut second, _) = listener.accept().unwrap();
        write_frame(&mut second, b"after reconnect");
        let mut rest = Vec::new();
        let _ = second.read_to_end(&mut rest);
        drop(first);
    });

    let (transport, log, rx) = transport(port);
    transport.connect().expect("connect");

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(3)).unwrap(),
        b"after reconnect"
    );

    let entries = log.lock().unwrap().clone();
    let error = entries
        .iter()
        .find(|(s, _)| *s == TransportState::Error)
        .expect("error transition");
    assert!(error.1.contains("Protocol error"), "reason: {}", error.1);
    assert_eq!(
        entries.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
        vec![
            TransportState::Connecting,
            TransportState::Connected,
            TransportState::Error,
            TransportState::Reconnecting,
            TransportState::Connected,
        ]
    );

    transport.disconnect();
    peer.join().unwrap();
}

#[test]
fn reconnects_after_peer_close() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (first, _) = listener.accept().unwrap();
        drop(first);
        let (mut second, _) = listener.accept().unwrap();
        let got = read_frame(&mut second);
        write_frame(&mut second, &got);
        let mut rest = Vec::new();
        let _ = second.read_to_end(&mut rest);
    });

    let (transport, log, rx) = transport(port);
    transport.connect().expect("connect");

    assert!(wait_until(Duration::from_secs(3), || {
        states(&log).len() >= 5 && transport.is_connected()
    }));
    assert!(transport.send(b"still here"));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"still here");

    transport.disconnect();
    peer.join().unwrap();
}

#[test]
fn keeps_retrying_until_peer_returns() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (first, _) = listener.accept().unwrap();
        drop(first);
        drop(listener);
    });

    let (transport, log, _rx) = transport(port);
    transport.connect().expect("connect");
    peer.join().unwrap();

    // several failed attempts at 50, 100, 200, 200 ms
    thread::sleep(Duration::from_millis(700));
    assert_eq!(transport.state(), TransportState::Reconnecting);

    let listener = TcpListener::bind(("127.0.0.1", port)).expect("rebind same port");
    let accept = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream
    });
    assert!(wait_until(Duration::from_secs(3), || transport.is_connected()));
    let _stream = accept.join().unwrap();

    let states = states(&log);
    assert_eq!(states.last(), Some(&TransportState::Connected));
    assert_eq!(
        states.iter().filter(|s| **s == TransportState::Reconnecting).count(),
        1,
        "failed attempts stay in Reconnecting: {:?}",
        states
    );
    transport.disconnect();
}

#[test]
fn disconnect_during_backoff_is_prompt_and_final() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (first, _) = listener.accept().unwrap();
        drop(first);
    });

    let transport = StreamTransport::new(config(port).with_retry_delay_ms(10_000).with_max_retry_delay_ms(10_000));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    transport.set_state_callback(Box::new(move |state, _| sink.lock().unwrap().push(state)));
    transport.connect().expect("connect");
    peer.join().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        transport.state() == TransportState::Reconnecting
    }));

    let started = Instant::now();
    transport.disconnect();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(500), "disconnect() took {:?}", elapsed);

    let seen = calls.lock().unwrap().len();
    assert_eq!(calls.lock().unwrap().last(), Some(&TransportState::Disconnected));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(calls.lock().unwrap().len(), seen, "callback fired after disconnect()");
}

#[test]
fn send_requires_connection_and_size_limit() {
    let (listener, port) = listener();
    let (transport, log, _rx) = transport(port);
    assert!(!transport.send(b"not yet"));

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });
    transport.connect().expect("connect");

    let too_big = vec![0u8; sunlink::framing::MAX_FRAME_LEN + 1];
    assert!(!transport.send(&too_big));
    assert!(transport.is_connected(), "oversized send must not drop the link");
    assert_eq!(states(&log).len(), 2);

    transport.disconnect();
    peer.join().unwrap();
}

#[test]
fn second_connect_is_rejected() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let (transport, _log, _rx) = transport(port);
    transport.connect().expect("connect");
    assert!(matches!(transport.connect(), Err(TransportError::AlreadyConnected)));
    transport.disconnect();
    peer.join().unwrap();
}

#[test]
fn reconnect_after_disconnect() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().unwrap();
            let got = read_frame(&mut stream);
            write_frame(&mut stream, &got);
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
        }
    });

    let (transport, _log, rx) = transport(port);
    for round in 0..2u8 {
        transport.connect().expect("connect");
        assert!(transport.send(&[round]));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![round]);
        transport.disconnect();
    }
    peer.join().unwrap();
}

#[test]
fn callback_may_send_without_deadlock() {
    let (listener, port) = listener();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        write_frame(&mut stream, b"ping");
        let reply = read_frame(&mut stream);
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        reply
    });

    let transport = Arc::new(StreamTransport::new(config(port)));
    let replier = Arc::downgrade(&transport);
    transport.set_message_callback(Box::new(move |bytes| {
        if bytes == b"ping" {
            if let Some(t) = replier.upgrade() {
                assert!(t.send(b"pong"));
            }
        }
    }));
    transport.connect().expect("connect");

    thread::sleep(Duration::from_millis(300));
    transport.disconnect();
    assert_eq!(peer.join().unwrap(), b"pong");
}

/// Peer that sends `hold`, then hangs up on the first connection. The message
/// callback parks the receive thread on `hold` so the client's own send is
/// the first to notice the dead socket.
fn hang_up_after_hold(listener: TcpListener, then_echo: bool) -> thread::JoinHandle<Option<Vec<u8>>> {
    thread::spawn(move || {
        let (mut first, _) = listener.accept().unwrap();
        write_frame(&mut first, b"hold");
        drop(first);
        if !then_echo {
            return None;
        }
        let (mut second, _) = listener.accept().unwrap();
        let got = read_frame(&mut second);
        write_frame(&mut second, &got);
        let mut rest = Vec::new();
        let _ = second.read_to_end(&mut rest);
        Some(got)
    })
}

fn hold_aware_receiver(transport: &StreamTransport) -> (Receiver<()>, Receiver<Vec<u8>>) {
    let (held_tx, held_rx) = mpsc::channel();
    let (msg_tx, msg_rx) = mpsc::channel();
    transport.set_message_callback(Box::new(move |bytes| {
        if bytes == b"hold" {
            let _ = held_tx.send(());
            thread::sleep(Duration::from_millis(400));
        } else {
            let _ = msg_tx.send(bytes.to_vec());
        }
    }));
    (held_rx, msg_rx)
}

/// Send until a write fails. False if every attempt succeeded.
fn send_until_refused(transport: &StreamTransport) -> bool {
    for _ in 0..300 {
        if !transport.send(b"x") {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn send_failure_takes_reconnect_path() {
    let (listener, port) = listener();
    let peer = hang_up_after_hold(listener, true);

    let transport = StreamTransport::new(config(port));
    let log: StateLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    transport.set_state_callback(Box::new(move |state, reason| {
        sink.lock().unwrap().push((state, reason.to_string()));
    }));
    let (held, rx) = hold_aware_receiver(&transport);
    transport.connect().expect("connect");

    held.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(send_until_refused(&transport), "send into a closed peer kept succeeding");
    assert_eq!(transport.state(), TransportState::Error);

    assert!(wait_until(Duration::from_secs(3), || transport.is_connected()));
    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
        vec![
            TransportState::Connecting,
            TransportState::Connected,
            TransportState::Error,
            TransportState::Reconnecting,
            TransportState::Connected,
        ]
    );
    assert!(entries[2].1.starts_with("Send failed"), "reason: {}", entries[2].1);

    assert!(transport.send(b"after reset"));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"after reset");
    transport.disconnect();
    assert_eq!(peer.join().unwrap(), Some(b"after reset".to_vec()));
}

#[test]
fn state_callback_may_disconnect_after_send_failure() {
    let (listener, port) = listener();
    let peer = hang_up_after_hold(listener, false);

    let transport = Arc::new(StreamTransport::new(config(port)));
    let log: StateLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let owner = Arc::downgrade(&transport);
    transport.set_state_callback(Box::new(move |state, reason| {
        sink.lock().unwrap().push((state, reason.to_string()));
        if state == TransportState::Error {
            // let the receive thread finish `hold` and hit the lost
            // connection while this thread is still delivering
            thread::sleep(Duration::from_millis(600));
            if let Some(t) = owner.upgrade() {
                t.disconnect();
            }
        }
    }));
    let (held, _rx) = hold_aware_receiver(&transport);
    transport.connect().expect("connect");
    held.recv_timeout(Duration::from_secs(2)).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let sender = Arc::clone(&transport);
    thread::spawn(move || {
        let _ = done_tx.send(send_until_refused(&sender));
    });
    let refused = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("send() never returned");
    assert!(refused);

    assert_eq!(transport.state(), TransportState::Disconnected);
    let states = states(&log);
    assert_eq!(
        states[..3],
        [
            TransportState::Connecting,
            TransportState::Connected,
            TransportState::Error,
        ]
    );
    assert_eq!(states.last(), Some(&TransportState::Disconnected));
    assert_eq!(
        states.iter().filter(|s| **s == TransportState::Error).count(),
        1,
        "{:?}",
        states
    );
    peer.join().unwrap();
}

#[test]
fn disconnect_is_final_while_sends_are_failing() {
    let (listener, port) = listener();
    let peer = hang_up_after_hold(listener, false);

    let transport = Arc::new(StreamTransport::new(config(port)));
    let log: StateLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    transport.set_state_callback(Box::new(move |state, reason| {
        sink.lock().unwrap().push((state, reason.to_string()));
    }));
    let (held, _rx) = hold_aware_receiver(&transport);
    transport.connect().expect("connect");
    held.recv_timeout(Duration::from_secs(2)).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let sender = {
        let transport = Arc::clone(&transport);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                transport.send(b"x");
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    transport.disconnect();
    let seen = log.lock().unwrap().len();
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert_eq!(states(&log).last(), Some(&TransportState::Disconnected));

    // the sender keeps hammering a closed link
    thread::sleep(Duration::from_millis(200));
    stop.store(true, Ordering::SeqCst);
    sender.join().unwrap();

    assert_eq!(log.lock().unwrap().len(), seen, "callback fired after disconnect()");
    assert_eq!(transport.state(), TransportState::Disconnected);
    peer.join().unwrap();
}

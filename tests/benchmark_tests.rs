//! Performance benchmarks for the relay hot paths

use server::config::ServerConfig;
use server::limiter::{AbuseLimiter, ManualClock};
use server::registry::{ClientId, Connection};
use server::relay::Relay;
use shared::{format_chat_line, Framer, Framing};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Benchmarks line framing over reads that split lines at odd offsets
#[test]
fn benchmark_line_framing() {
    let payload: Vec<u8> = (0..10_000)
        .flat_map(|i| format!("message number {i}\n").into_bytes())
        .collect();

    let start = Instant::now();
    let mut framer = Framer::new(Framing::Lines, 2048);
    let mut messages = 0;
    for chunk in payload.chunks(37) {
        messages += framer.push(chunk).len();
    }
    let duration = start.elapsed();

    println!(
        "Line framing: {} messages from {} bytes in {:?}",
        messages,
        payload.len(),
        duration
    );

    assert_eq!(messages, 10_000);
    assert_eq!(framer.pending_len(), 0);
    assert!(duration.as_millis() < 500);
}

/// Benchmarks limiter checks across many clients
#[test]
fn benchmark_limiter_checks() {
    let clock = ManualClock::new();
    let mut limiter = AbuseLimiter::new(10, Duration::from_secs(1), Arc::new(clock.clone()));

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let id = ClientId::new(i % 1000);
        let addr = IpAddr::from([10, 0, (i % 250) as u8, 1]);
        let _ = limiter.check(id, addr);
        if i % 1000 == 999 {
            clock.advance(Duration::from_secs(1));
        }
    }

    let duration = start.elapsed();
    println!(
        "Limiter: {} checks in {:?} ({:.2} ns/check)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(limiter.tracked_clients(), 1000);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks chat line formatting
#[test]
fn benchmark_chat_line_formatting() {
    let iterations = 100_000;
    let start = Instant::now();

    let mut total = 0;
    for i in 0..iterations {
        total += format_chat_line("alice", &format!("hello {i}\r\n")).len();
    }

    let duration = start.elapsed();
    println!("Formatting: {} lines in {:?}", iterations, duration);

    assert!(total > 0);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks broadcast fan-out to many clients
#[test]
fn benchmark_broadcast_fan_out() {
    let config = ServerConfig::default();
    let mut relay = Relay::new(&config, Arc::new(ManualClock::new()));

    let clients = 200;
    let per_tick = 50;
    let mut receivers = Vec::new();
    for i in 0..clients {
        let (tx, rx) = mpsc::channel(per_tick * 2 + clients);
        let id = relay.allocate_id();
        let addr = format!("10.0.{}.{}:4000", i / 250, i % 250 + 1).parse().unwrap();
        relay
            .admit(id, format!("client{i}"), addr, Connection::new(tx))
            .unwrap();
        receivers.push(rx);
    }
    relay.broadcast();

    let start = Instant::now();
    for i in 0..per_tick {
        relay.enqueue(format!("client0: line {i}"));
    }
    let delivered = relay.broadcast();
    let duration = start.elapsed();

    println!(
        "Broadcast: {} deliveries to {} clients in {:?}",
        delivered, clients, duration
    );

    assert_eq!(delivered, clients * per_tick);
    assert!(duration.as_millis() < 1000);
}

//! Many simultaneous clients against one server.
//!
//! The stress variant is ignored by default; run it with
//! `cargo test -- --ignored` and size it with `SIMPLE_WS_STRESS_CLIENTS`.

mod harness;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use harness::{Metrics, TestServer, local_config, spawn_client, wait_until};
use simple_ws::{Client, Server};

struct Outcome {
    echoed: usize,
    mismatched: usize,
    client_closes: usize,
}

fn run_clients(server: &TestServer, clients: usize) -> Outcome {
    let echoed = Arc::new(AtomicUsize::new(0));
    let mismatched = Arc::new(AtomicUsize::new(0));
    let client_closes = Arc::new(AtomicUsize::new(0));

    let runners: Vec<_> = (0..clients)
        .map(|id| {
            let mut client = Client::new(&server.url("/echo")).unwrap();
            let payload = format!("Hello {id}");
            let expected = payload.clone();
            let (ok, wrong, closed) = (
                Arc::clone(&echoed),
                Arc::clone(&mismatched),
                Arc::clone(&client_closes),
            );
            client
                .on_open(move |conn| conn.send(payload.as_str()))
                .on_message(move |conn, msg| {
                    if msg.string() == expected {
                        ok.fetch_add(1, Ordering::SeqCst);
                    } else {
                        wrong.fetch_add(1, Ordering::SeqCst);
                    }
                    conn.send_close(1000, "");
                })
                .on_close(move |_, code, _| {
                    if code == 1000 {
                        closed.fetch_add(1, Ordering::SeqCst);
                    }
                });
            spawn_client(client)
        })
        .collect();

    for (_, runner) in runners {
        runner.join().unwrap().unwrap();
    }

    Outcome {
        echoed: echoed.load(Ordering::SeqCst),
        mismatched: mismatched.load(Ordering::SeqCst),
        client_closes: client_closes.load(Ordering::SeqCst),
    }
}

#[test]
fn test_concurrent_clients_each_get_their_echo() {
    const CLIENTS: usize = 400;

    let metrics = Metrics::new();
    let mut server = Server::new(local_config(8));
    metrics.echo(server.endpoint("/echo").unwrap());
    let server = TestServer::spawn(server);

    let outcome = run_clients(&server, CLIENTS);

    assert_eq!(outcome.echoed, CLIENTS);
    assert_eq!(outcome.mismatched, 0);
    assert_eq!(outcome.client_closes, CLIENTS);
    assert!(wait_until(Duration::from_secs(10), || metrics.callbacks() == 3 * CLIENTS));
    assert_eq!(metrics.opens(), CLIENTS);
    assert_eq!(metrics.messages(), CLIENTS);
    assert_eq!(metrics.closes(), CLIENTS);
    assert_eq!(metrics.errors(), 0);
    assert!(server.server().connections().is_empty());
    server.shutdown().unwrap();
}

#[test]
fn test_single_worker_serves_many_connections() {
    const CLIENTS: usize = 32;

    let metrics = Metrics::new();
    let mut server = Server::new(local_config(1));
    metrics.echo(server.endpoint("/echo").unwrap());
    let server = TestServer::spawn(server);

    let outcome = run_clients(&server, CLIENTS);
    assert_eq!(outcome.echoed, CLIENTS);
    assert!(wait_until(Duration::from_secs(5), || metrics.callbacks() == 3 * CLIENTS));
    server.shutdown().unwrap();
}

#[test]
#[ignore]
fn test_stress_connections() {
    let clients = std::env::var("SIMPLE_WS_STRESS_CLIENTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    println!("Stress test: {clients} clients");

    let metrics = Metrics::new();
    let mut server = Server::new(local_config(8));
    metrics.echo(server.endpoint("/echo").unwrap());
    let server = TestServer::spawn(server);

    let start = Instant::now();
    let outcome = run_clients(&server, clients);
    let elapsed = start.elapsed();

    println!(
        "{} echoed, {} mismatched in {:?} ({:.0} conn/s)",
        outcome.echoed,
        outcome.mismatched,
        elapsed,
        clients as f64 / elapsed.as_secs_f64()
    );
    assert_eq!(outcome.echoed, clients);
    assert!(wait_until(Duration::from_secs(30), || metrics.callbacks() == 3 * clients));
    server.shutdown().unwrap();
}

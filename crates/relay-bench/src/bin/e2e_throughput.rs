//! End-to-end throughput benchmark for Relay.
//!
//! This benchmark measures actual WebSocket message throughput with real network I/O.

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{codec, Frame};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:8080/ws";
const CHANNEL: &str = "benchmark";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("Relay end-to-end throughput benchmark");
    println!("Make sure the server is running: cargo run --release");
    println!();

    run_pubsub_benchmark(num_clients).await;
}

async fn run_pubsub_benchmark(num_clients: usize) {
    println!("Pub/Sub benchmark: {} clients", num_clients);
    println!("  Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let msg_count = Arc::clone(&message_count);
        let barrier = Arc::clone(&barrier);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_client(msg_count, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        });
        handles.push(handle);
    }

    // Wait for all clients to subscribe
    barrier.wait().await;
    println!("All {} clients subscribed", num_clients);

    println!("Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);

    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results");
    println!("  Clients:        {:>12}", num_clients);
    println!("  Duration:       {:>12.2}s", elapsed.as_secs_f64());
    println!("  Delivered:      {:>12}", total_messages);
    println!("  Throughput:     {:>12.0} msg/s", msgs_per_sec);
    println!(
        "  Per-Client:     {:>12.0} msg/s",
        msgs_per_sec / num_clients as f64
    );

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (ws, _) = connect_async(SERVER_URL).await?;
    let (mut sender, mut receiver) = ws.split();

    // Connected frame
    receiver.next().await;

    let subscribe = Frame::emit_with_ack(1, "subscribe", json!({ "channels": CHANNEL }));
    sender
        .send(Message::Binary(codec::encode(&subscribe)?.to_vec()))
        .await?;

    // Subscribe ack
    receiver.next().await;

    barrier.wait().await;

    // Fire-and-forget broadcasts: no id, so no ack comes back
    let broadcast = Frame::emit(
        "broadcast",
        json!({ "channels": format!("{}::tick", CHANNEL), "payload": { "data": "x".repeat(64) } }),
    );
    let broadcast_msg = Message::Binary(codec::encode(&broadcast)?.to_vec());

    let recv_task = tokio::spawn(async move {
        let mut recv_buf = BytesMut::with_capacity(65536);

        while let Some(result) = receiver.next().await {
            if let Ok(Message::Binary(data)) = result {
                recv_buf.extend_from_slice(&data);
                while let Ok(Some(frame)) = codec::decode_from(&mut recv_buf) {
                    if matches!(frame, Frame::Emit { .. }) {
                        message_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    });

    loop {
        if sender.send(broadcast_msg.clone()).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}

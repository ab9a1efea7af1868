//! Long-poll load test against a running `martd`.
//!
//! Each round parks N concurrent `/sub` requests on one channel, then
//! publishes a single message and counts how the polls come back.
//!
//! ```bash
//! longpoll [clients] [rounds]
//! MART_URL=http://127.0.0.1:8080 longpoll 256 20
//! ```

use anyhow::{bail, Context, Result};
use futures_util::future::join_all;
use mart_protocol::{decode, PubResponse, SubResponse};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

const DEFAULT_URL: &str = "http://127.0.0.1:54321";
const CHANNEL: &str = "longpoll";
/// Time given to the polls to park before publishing.
const SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    ok: u64,
    non_200: u64,
    errors: u64,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.ok += other.ok;
        self.non_200 += other.non_200;
        self.errors += other.errors;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let clients: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(64);
    let rounds: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
    let base = std::env::var("MART_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║             mart Long-Poll Load Test                         ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --bin martd      ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("📊 {} clients x {} rounds against {}", clients, rounds, base);

    let client = Client::builder()
        .pool_max_idle_per_host(clients)
        .build()
        .context("Failed to build HTTP client")?;

    let mut tally = Tally::default();
    let start = Instant::now();

    for round in 0..rounds {
        let marker = publish(&client, &base, format!("seed-{round}")).await?;
        let polls: Vec<_> = (0..clients)
            .map(|_| tokio::spawn(poll(client.clone(), base.clone(), marker.clone())))
            .collect();

        tokio::time::sleep(SETTLE).await;
        publish(&client, &base, format!("round-{round}")).await?;

        for result in join_all(polls).await {
            match result {
                Ok(outcome) => tally.add(outcome),
                Err(_) => tally.errors += 1,
            }
        }
    }

    let elapsed = start.elapsed();
    let total = tally.ok + tally.non_200 + tally.errors;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Polls:                {:>10}                           ║", total);
    println!("║  OK:                   {:>10}                           ║", tally.ok);
    println!("║  Non-200:              {:>10}                           ║", tally.non_200);
    println!("║  Transport errors:     {:>10}                           ║", tally.errors);
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    Ok(())
}

/// Publish `payload` and return the new etag.
async fn publish(client: &Client, base: &str, payload: String) -> Result<String> {
    let response = client
        .post(format!("{base}/pub"))
        .query(&[("channel", CHANNEL), ("size", "16")])
        .body(payload)
        .send()
        .await
        .context("Publish failed")?;

    if response.status() != StatusCode::OK {
        bail!("Publish returned {}", response.status());
    }
    let body = response.bytes().await?;
    let reply: PubResponse = decode(&body)?;
    Ok(reply.etag)
}

/// One long-poll; a 200 only counts when the body carries the channel.
async fn poll(client: Client, base: String, marker: String) -> Tally {
    let mut tally = Tally::default();
    let response = match client
        .get(format!("{base}/sub"))
        .query(&[(CHANNEL, marker.as_str())])
        .send()
        .await
    {
        Ok(response) => response,
        Err(_) => {
            tally.errors += 1;
            return tally;
        }
    };

    if response.status() != StatusCode::OK {
        tally.non_200 += 1;
        return tally;
    }

    match response.bytes().await {
        Ok(body) => match decode::<SubResponse>(&body) {
            Ok(reply) if reply.channels.contains_key(CHANNEL) => tally.ok += 1,
            Ok(_) => tally.non_200 += 1,
            Err(_) => tally.errors += 1,
        },
        Err(_) => tally.errors += 1,
    }
    tally
}

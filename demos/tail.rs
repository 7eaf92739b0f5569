//! Tail - print every change on a set of partitions.
//!
//! This example demonstrates:
//! - Opening a feed with `FeedBuilder`
//! - Fetching failover logs to pick each partition's epoch
//! - Consuming events until every stream has ended
//!
//! # Running
//!
//! ```text
//! cargo run --example tail -- 127.0.0.1:11210 0 1 2
//! ```

use upr_client::{FeedBuilder, Opcode, StreamRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:11210".to_string());
    let partitions: Vec<u16> = args.map(|p| p.parse()).collect::<Result<_, _>>()?;
    let partitions = if partitions.is_empty() { vec![0] } else { partitions };

    let mut feed = FeedBuilder::new()
        .name("tail")
        .buffer_size(20 * 1024 * 1024)
        .connect(addr.as_str())
        .await?;

    // Stream each partition from the start of its current branch
    let logs = feed.get_failover_logs(&partitions).await?;
    for &partition in &partitions {
        let epoch = logs[&partition].latest()?.epoch;
        feed.request_stream(StreamRequest::new(partition, epoch, 0, u64::MAX))
            .await?;
    }

    let mut handle = feed.start();
    while let Some(event) = handle.recv().await {
        if let Some(err) = &event.error {
            eprintln!("partition {}: {}", event.partition, err);
            continue;
        }
        match event.opcode {
            Opcode::Mutation | Opcode::Deletion | Opcode::Expiration => println!(
                "[{}] {} seqno={} key={}",
                event.partition,
                event,
                event.seqno,
                String::from_utf8_lossy(&event.key)
            ),
            Opcode::SnapshotMarker => println!(
                "[{}] snapshot {}..{}",
                event.partition, event.snapshot_start, event.snapshot_end
            ),
            _ => println!("[{}] {}", event.partition, event),
        }
    }

    let stats = handle.wait().await?;
    println!(
        "{} events, {} mutations, {} rollbacks",
        stats.events, stats.mutations, stats.rollbacks
    );
    Ok(())
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic event-sync usage example.
//!
//! Demonstrates:
//! 1. Cold start against a flaky snapshot source (one failure, then data)
//! 2. Live INSERT / UPDATE / DELETE changes over an in-process channel hub
//! 3. A manual background refetch
//! 4. Warm restart from the file-backed snapshot cache (no spinner)
//! 5. Displaying metrics
//!
//! No external services are needed.
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=event_sync=debug cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use event_sync::{
    DataSource, EventRecord, FetchError, FileStore, LocalChannelHub, RawChange, Snapshot,
    SnapshotFetcher, SyncConfig, SyncEngine, SyncPhase,
};

/// Stands in for the dashboard API: the first request fails, later ones
/// return a slowly growing list of events.
struct FlakySource {
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotFetcher for FlakySource {
    async fn fetch(&self, limit: usize) -> Result<Snapshot, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        if call == 0 {
            return Err(FetchError::Status(503));
        }

        let events = (0..(5 + call).min(limit))
            .map(|i| {
                EventRecord::from_row(json!({
                    "id": format!("evt-{i}"),
                    "timestamp": 1_760_000_000_000i64 + i as i64 * 60_000,
                    "weight_score": (i * 7 % 10) as f64,
                    "title": format!("Event #{i}"),
                }))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(Snapshot {
            events,
            source: DataSource::Primary,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("event_sync=info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             event-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the engine (cold)
    // ─────────────────────────────────────────────────────────────────────────
    let cache_dir = std::env::temp_dir().join("event-sync-demo");
    let _ = tokio::fs::remove_dir_all(&cache_dir).await;

    let config = SyncConfig {
        limit: 20,
        base_delay_ms: 200,
        max_delay_ms: 1000,
        ..Default::default()
    };
    let fetcher = Arc::new(FlakySource { calls: AtomicUsize::new(0) });
    let store = Arc::new(FileStore::open(&cache_dir).await?);
    let hub = Arc::new(LocalChannelHub::new());

    println!("📦 Cache directory: {}", cache_dir.display());
    println!("\n🚀 Cold start (first request will fail and be retried)...");

    let handle = SyncEngine::new(config.clone(), fetcher.clone(), store.clone(), Some(hub.clone()))
        .start()
        .await;
    let s = handle.state();
    println!("   └─ phase={} loading={} events={}", s.phase, s.loading, s.collection.len());

    let s = handle.wait_for(|s| s.phase == SyncPhase::Ready).await?;
    println!(
        "   ✅ Ready: {} events from {} (realtime attached: {})",
        s.collection.len(),
        s.data_source,
        s.realtime_attached
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Live changes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📡 Publishing live changes...");
    hub.publish(
        &config.realtime_channel,
        RawChange::insert(json!({"id": "breaking", "timestamp": 1_760_000_999_000i64, "weight_score": 9.5, "title": "Breaking"})),
    );
    hub.publish(
        &config.realtime_channel,
        RawChange::update(json!({"id": "evt-1", "timestamp": 1_760_000_060_000i64, "weight_score": 7.0, "title": "Event #1 (edited)"})),
    );
    hub.publish(&config.realtime_channel, RawChange::delete("evt-2"));
    hub.publish(&config.realtime_channel, RawChange::delete("never-existed"));

    let s = handle
        .wait_for(|s| s.collection.contains("breaking") && !s.collection.contains("evt-2"))
        .await?;
    for record in s.collection.iter().take(5) {
        println!(
            "   └─ {:<10} weight={:<4} {}",
            record.id(),
            record.weight_score(),
            record.payload()["title"]
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Manual refetch (silent, data stays on screen)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 Manual refetch...");
    let outcome = handle.refetch().await?;
    println!("   └─ {:?}", outcome);
    let s = handle.wait_for(|s| !s.in_flight).await?;
    println!("   ✅ {} events, loading was never raised: {}", s.collection.len(), !s.loading);

    println!("\n🛑 Stopping...");
    handle.stop().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Warm restart from the cache
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n♻️  Warm restart...");
    let handle = SyncEngine::new(config, fetcher.clone(), store, Some(hub)).start().await;
    let s = handle.state();
    println!(
        "   ✅ phase={} loading={} events={} (served from cache, fetches so far: {})",
        s.phase,
        s.loading,
        s.collection.len(),
        fetcher.calls.load(Ordering::SeqCst)
    );
    handle.stop().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    let _ = tokio::fs::remove_dir_all(&cache_dir).await;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, value) in &counters {
            println!("   │  └─ {} = {}", name, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, value) in &gauges {
            println!("   │  └─ {} = {:.2}", name, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, count, sum) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("      └─ {} count={} avg={:.4}s", name, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}

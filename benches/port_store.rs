//! Port store benchmark suite.
//!
//! Benchmarks the per-frame and per-tick paths of the port store:
//! - Frame ingest with and without device identification
//! - Send queue flush for growing queue sizes
//! - Readable port churn
//!
//! Run with: cargo bench --bench port_store
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hardware_bridge::{
    DeviceRegistry, NullSink, Outbound, OutboundMessage, PortDataStore, PortFrame, Result,
    StaticCatalog,
};
use serde_json::{Map, Value, json};

// ============================================================================
// Fixtures
// ============================================================================

const QUEUE_SIZES: &[u32] = &[4, 16, 64];

/// Transport that only encodes.
struct Sink;

impl Outbound for Sink {
    fn mode(&self) -> Option<u64> {
        Some(1)
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        black_box(message.to_frame()?);
        Ok(())
    }
}

fn frame(ports: u32) -> PortFrame {
    let mut map = Map::new();
    map.insert("company".into(), json!(10));
    map.insert("model".into(), json!(2));
    for port in 0..ports {
        map.insert(port.to_string(), json!(port % 2));
        map.insert(format!("a{port}"), json!(port * 8));
    }
    PortFrame::from_value(Value::Object(map))
}

// ============================================================================
// Benchmark: Ingest
// ============================================================================

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    let snapshot = frame(20);

    group.bench_function("store_only", |b| {
        let mut store = PortDataStore::new();
        b.iter(|| store.ingest(black_box(snapshot.clone()), None));
    });

    group.bench_function("identify_and_store", |b| {
        let mut store = PortDataStore::new();
        let mut registry = DeviceRegistry::new(Arc::new(StaticCatalog::new()), Arc::new(NullSink));
        b.iter(|| {
            registry.identify(black_box(&snapshot));
            store.ingest(snapshot.clone(), None);
        });
    });

    group.finish();
}

// ============================================================================
// Benchmark: Flush
// ============================================================================

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for &size in QUEUE_SIZES {
        let mut store = PortDataStore::new();
        store.set_connected(true);
        for port in 0..size {
            store.set_digital_port_value(port, port % 256);
            store.set_port_readable(port + size);
        }

        group.bench_with_input(BenchmarkId::new("queue", size), &store, |b, store| {
            b.iter(|| store.flush(Some(&Sink), None));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Readable Ports
// ============================================================================

fn bench_readable_churn(c: &mut Criterion) {
    c.bench_function("readable_churn", |b| {
        let mut store = PortDataStore::new();
        store.set_connected(true);
        b.iter(|| {
            for port in 0..32 {
                black_box(store.get_digital_port_value(port));
            }
            for port in (0..32).step_by(2) {
                store.set_digital_port_value(port, 1);
            }
        });
    });
}

criterion_group!(benches, bench_ingest, bench_flush, bench_readable_churn);
criterion_main!(benches);

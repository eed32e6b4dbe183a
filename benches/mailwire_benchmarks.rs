//! Performance benchmarks for the hot paths of sending and receiving.
//!
//! Covers message validation and wire serialization on the send side, and
//! signature verification and event parsing on the webhook side.

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use mailwire_client::{ClientConfig, EmailClient, RetryPolicy};
use mailwire_core::{Message, TestClock};
use mailwire_testing::{
    batch_payload, invalid_message, valid_message, EventPayloadBuilder, ScriptedTransport,
};
use mailwire_webhook::{generate_signature, verify_signature, EventKind, WebhookHandler};
use tokio::runtime::Runtime;

const SECRET: &str = "whsec_bench";

/// Benchmarks validation of well-formed and malformed messages.
fn bench_message_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    let valid = valid_message(0);
    let invalid = invalid_message(0);

    group.bench_function("valid_message", |b| b.iter(|| black_box(&valid).validate()));
    group.bench_function("invalid_message", |b| b.iter(|| black_box(&invalid).validate()));
    group.bench_function("to_wire", |b| b.iter(|| black_box(&valid).to_wire()));

    group.finish();
}

/// Benchmarks HMAC signing and verification across payload sizes.
fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");

    for size in [256, 4 * 1024, 64 * 1024] {
        let payload = vec![b'x'; size];
        let signature = generate_signature(&payload, SECRET).unwrap_or_default();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("verify", size), &payload, |b, payload| {
            b.iter(|| verify_signature(black_box(payload), &signature, SECRET));
        });
    }

    group.finish();
}

/// Benchmarks parsing webhook payloads into typed events.
fn bench_event_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("webhook_parse");
    let handler = WebhookHandler::with_secret(SECRET);

    for batch_size in [1, 10, 100] {
        let payload = batch_payload((0..batch_size).map(|n| {
            let kind = EventKind::ALL[n % EventKind::ALL.len()];
            EventPayloadBuilder::new(kind).field("message_id", format!("msg-{n}")).build()
        }));

        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch_size), &payload, |b, payload| {
            b.iter(|| handler.parse(black_box(payload)));
        });
    }

    group.finish();
}

/// Benchmarks the full send path against an in-memory transport.
fn bench_send_batch(c: &mut Criterion) {
    let Ok(rt) = Runtime::new() else {
        return;
    };
    let mut group = c.benchmark_group("send_batch");

    for batch_size in [1, 50, 500] {
        let messages: Vec<Message> = (0..batch_size).map(valid_message).collect();

        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::new("accepted", batch_size), &messages, |b, messages| {
            b.iter_batched(
                || {
                    let config = ClientConfig {
                        retry: RetryPolicy::no_retries(),
                        ..ClientConfig::new("mw_bench_token")
                    };
                    EmailClient::with_transport(
                        config,
                        Arc::new(ScriptedTransport::new()),
                        Arc::new(TestClock::new()),
                    )
                },
                |client| {
                    rt.block_on(async {
                        if let Ok(client) = client {
                            black_box(client.send_batch(messages).await).ok();
                        }
                    });
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_message_validation,
    bench_signatures,
    bench_event_parsing,
    bench_send_batch
);
criterion_main!(benches);

use chatroom_core::proto::ChatMessage;
use chatroom_server::server::{
    broadcast::BroadcastEngine,
    registry::{SessionRegistry, SessionSink},
};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::runtime::Builder;

#[derive(Clone, Copy, Debug)]
struct FanoutBenchParams {
    recipients: usize,
    messages: usize,
    buffer: usize,
}

/// Registers `recipients` sinks whose receivers are drained by background
/// tasks, the way connected clients would.
fn room(params: FanoutBenchParams) -> Arc<SessionRegistry> {
    let registry = Arc::new(SessionRegistry::new());
    for i in 0..params.recipients {
        let (sink, mut rx) = SessionSink::channel(params.buffer);
        registry.register(&format!("user-{i}"), sink);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                black_box(message).ok();
            }
        });
    }
    registry
}

fn fanout_bench(c: &mut Criterion) {
    let recipient_cases = [1, 10, 100, 1_000];
    let message_cases = [1, 100];
    let buffer_cases = [1, 64];

    let mut cases = Vec::new();
    for &recipients in &recipient_cases {
        for &messages in &message_cases {
            for &buffer in &buffer_cases {
                cases.push(FanoutBenchParams {
                    recipients,
                    messages,
                    buffer,
                });
            }
        }
    }
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    for params in cases {
        let mut group = c.benchmark_group("broadcast/fanout");
        group.throughput(Throughput::Elements(
            (params.recipients * params.messages) as u64,
        ));

        let registry = rt.block_on(async { room(params) });
        let engine = BroadcastEngine::new(registry, Duration::from_millis(250));

        group.bench_function(
            format!(
                "recipients/{}/messages/{}/buffer/{}",
                params.recipients, params.messages, params.buffer
            ),
            |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let engine = &engine;
                    async move {
                        let start = Instant::now();
                        for _ in 0..iters {
                            for i in 0..params.messages {
                                let report = engine
                                    .broadcast(ChatMessage {
                                        username: "bench".to_string(),
                                        content: i.to_string(),
                                        timestamp: 0,
                                    })
                                    .await;
                                black_box(report);
                            }
                        }
                        start.elapsed()
                    }
                });
            },
        );

        group.finish();
    }
}

criterion_group!(benches, fanout_bench);
criterion_main!(benches);

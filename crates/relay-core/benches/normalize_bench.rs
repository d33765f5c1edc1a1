//! Criterion benchmarks for event normalization.
//!
//! Run with:
//! ```bash
//! cargo bench --package relay-core --bench normalize_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relay_core::event::queqiao;
use serde_json::json;

fn bench_normalize(c: &mut Criterion) {
    let normalizer = queqiao::normalizer();
    let chat = json!({
        "timestamp": 1700000000,
        "post_type": "message",
        "event_name": "PlayerChatEvent",
        "server_name": "Survival",
        "server_version": "1.20.4",
        "server_type": "paper",
        "sub_type": "player_chat",
        "message_id": "m-1",
        "raw_message": "hello",
        "message": "hello",
        "player": {
            "nickname": "Steve", "uuid": "069a79f4-44e9-4726-a5be-fca90e38aaf5",
            "is_op": false, "address": "127.0.0.1", "health": 20.0,
            "experience_level": 3, "experience_progress": 0.5, "total_experience": 30,
            "walk_speed": 0.2, "x": 1.0, "y": 64.0, "z": -3.5
        }
    });
    let unknown = json!({"sub_type": "server_tick", "tps": 20});

    let mut group = c.benchmark_group("normalize");
    group.bench_function("player_chat", |b| b.iter(|| normalizer.normalize(black_box(&chat))));
    group.bench_function("unknown_sub_type", |b| {
        b.iter(|| normalizer.normalize(black_box(&unknown)))
    });
    group.finish();
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);

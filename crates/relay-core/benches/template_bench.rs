//! Criterion benchmarks for template rendering.
//!
//! Every outbound game-server message goes through `TemplateRegistry::render`,
//! so rendering plus serialization sits on the relay's hot path.
//!
//! Run with:
//! ```bash
//! cargo bench --package relay-core --bench template_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_core::protocol::queqiao::{self, ACTIONBAR, BROADCAST, PRIVATE_MESSAGE, RCON, TITLE};
use relay_core::{Params, WireShape};
use serde_json::{json, Value};

// ── Parameter fixtures ────────────────────────────────────────────────────────

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

fn fixtures() -> Vec<(&'static str, Params)> {
    vec![
        (
            BROADCAST,
            params(json!({"group": "测试群", "sender": "alice", "content": "hello from chat"})),
        ),
        (
            PRIVATE_MESSAGE,
            params(json!({"uuid": "", "nickname": "Steve", "sender": "bob", "content": "hi"})),
        ),
        (
            TITLE,
            params(json!({
                "title": "服务器公告", "subtitle": "即将维护",
                "fade_in": 20, "stay": 80, "fade_out": 20
            })),
        ),
        (ACTIONBAR, params(json!({"content": "welcome"}))),
        (RCON, params(json!({"command": "list"}))),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_render(c: &mut Criterion) {
    let registry = queqiao::registry(false).expect("built-in templates compile");
    let mut group = c.benchmark_group("render");
    for (kind, p) in fixtures() {
        group.bench_with_input(BenchmarkId::new("kind", kind), &p, |b, p| {
            b.iter(|| registry.render(black_box(kind), black_box(p), None))
        });
    }
    group.finish();
}

fn bench_render_to_text(c: &mut Criterion) {
    let registry = queqiao::registry(true).expect("built-in templates compile");
    let p = params(json!({"group": "g", "sender": "s", "content": "a fairly ordinary chat line"}));
    c.bench_function("render_broadcast_to_text_with_echo", |b| {
        b.iter(|| {
            registry
                .render(BROADCAST, black_box(&p), Some("5b1f0c1e-7f5e-4a57-9a57-0d1c9e0b7a11"))
                .map(|m| m.to_text(WireShape::QUEQIAO))
        })
    });
}

criterion_group!(benches, bench_render, bench_render_to_text);
criterion_main!(benches);

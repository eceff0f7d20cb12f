//! Benchmarks for line parsing, serialization and splitting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use echohub_proto::{colors, split_message, Message};

const SIMPLE_MESSAGE: &str = "PING :echohub";

const PREFIX_MESSAGE: &str = ":alice!alice@echohub PRIVMSG #general :Hello, world!";

const REGISTRATION: &str = "USER alice 0 * :Alice Liddell";

const ART_ROW: &str = "{F:FF0000}####{B:000000}{F:FFFF00}  ..  {X}{F:00FF00}####{X}";

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Message Parsing");

    for (name, line) in [
        ("simple_ping", SIMPLE_MESSAGE),
        ("with_prefix", PREFIX_MESSAGE),
        ("registration", REGISTRATION),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let msg: Message = black_box(line).parse().unwrap();
                black_box(msg)
            })
        });
    }

    group.finish();
}

fn benchmark_serialization(c: &mut Criterion) {
    let msg: Message = PREFIX_MESSAGE.parse().unwrap();
    c.bench_function("serialize_privmsg", |b| b.iter(|| black_box(&msg).to_string()));
}

fn benchmark_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("Split");
    let text = "lorem ipsum dolor sit amet consectetur ".repeat(50);

    for limit in [100usize, 400] {
        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, &limit| {
            b.iter(|| split_message(black_box(&text), limit))
        });
    }

    group.finish();
}

fn benchmark_colors(c: &mut Criterion) {
    c.bench_function("markup_to_irc", |b| {
        b.iter(|| colors::markup_to_irc(black_box(ART_ROW)))
    });
}

criterion_group!(
    benches,
    benchmark_parsing,
    benchmark_serialization,
    benchmark_split,
    benchmark_colors
);
criterion_main!(benches);

//! Pipeline Performance Benchmark
//!
//! Measures downmix throughput and the per-block cost of the stream handoff
//! and the callback bridge copy.
//!
//! **Goal:** One 1024-frame block (21 ms of audio at 48 kHz) should cost a
//! few microseconds at most.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use monosink::bridge::{BlockSource, BridgeStats, CallbackBridge, SliceQueue};
use monosink::dsp::downmix::downmix;
use monosink::dsp::{StereoFrame, Stream};
use monosink::server::StreamFormat;
use std::sync::Arc;

fn bench_downmix(c: &mut Criterion) {
    let mut group = c.benchmark_group("downmix");

    group.bench_function("downmix_1024", |b| {
        let input: Vec<StereoFrame> = (0..1024)
            .map(|i| StereoFrame::from_stereo(i as f32 * 1e-3, -(i as f32) * 1e-3))
            .collect();
        let mut output = vec![0.0f32; 1024];

        b.iter(|| {
            let n = downmix(black_box(&input), &mut output);
            black_box(n);
        });
    });

    group.finish();
}

fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream");

    group.bench_function("write_read_flush_1024", |b| {
        let stream = Stream::<f32>::new(1024);
        let block = vec![0.5f32; 1024];

        b.iter(|| {
            stream.write(black_box(&block));
            let read = stream.read().unwrap();
            black_box(read.len());
            read.flush();
        });
    });

    group.bench_function("bridge_process_1024", |b| {
        let stream = Arc::new(Stream::<f32>::new(1024));
        let source: Arc<dyn BlockSource> = stream.clone();
        let bridge = CallbackBridge::new(
            source,
            &StreamFormat::MONO_F32_48K,
            Arc::new(BridgeStats::default()),
        );
        let block = vec![0.5f32; 1024];
        let mut server_buffer = vec![0.0f32; 1024];

        b.iter(|| {
            stream.write(&block);
            let mut queue = SliceQueue::new(&mut server_buffer[..]);
            black_box(bridge.process(&mut queue));
            black_box(queue.finish());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_downmix, bench_stream);
criterion_main!(benches);

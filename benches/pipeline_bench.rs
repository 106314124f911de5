//! Benchmarks for the per-request text path and per-segment audio path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use supertonic_tts::audio::{apply_gain, time_scale, AudioOutput};
use supertonic_tts::text::{normalize, Language, NormalizedText, Segmenter, SegmenterConfig};

/// Benchmark text normalization
fn bench_normalization(c: &mut Criterion) {
    let texts = [
        ("en", "Hello world.", Language::En),
        ("en_abbr", "Dr. Smith went to see Mr. Jones at 5 p.m. on Main St. yesterday, etc.", Language::En),
        ("fr_abbr", "M. Dupont et Mme Martin sont nés en 52 av. J.-C. Voilà.", Language::Fr),
        (
            "en_long",
            "The quick brown fox jumps over the lazy dog. This is a longer sentence with more words to process. \
             Dr. Who arrived at 7 a.m. and left at 9 p.m. sharp!",
            Language::En,
        ),
    ];

    let mut group = c.benchmark_group("normalization");
    for (name, text, language) in texts {
        group.bench_with_input(BenchmarkId::new("normalize", name), &text, |b, text| {
            b.iter(|| normalize(black_box(text), language))
        });
    }
    group.finish();
}

/// Benchmark segmentation at several segment limits
fn bench_segmentation(c: &mut Criterion) {
    let text = NormalizedText::new(
        "Hello world. This is a test. The quick brown fox jumps over the lazy dog. \
         How are you doing today? I hope everything is going well, and that the weather, \
         which has been rather unpredictable lately, stays pleasant for the rest of the week. \
         This is a longer piece of text that should be segmented into multiple parts."
            .repeat(4),
        Language::En,
    );

    let mut group = c.benchmark_group("segmentation");
    for max_chars in [50, 100, 200] {
        let segmenter = Segmenter::new(SegmenterConfig {
            max_chars,
            min_clause_chars: 20,
        });
        group.bench_with_input(BenchmarkId::new("segment", max_chars), &text, |b, text| {
            b.iter(|| segmenter.segment(black_box(text), Uuid::nil()))
        });
    }
    group.finish();
}

fn tone(seconds: f32, sample_rate: u32) -> Vec<f32> {
    (0..(seconds * sample_rate as f32) as usize)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Benchmark per-segment post-processing
fn bench_post_processing(c: &mut Criterion) {
    let samples = tone(2.0, 44100);

    let mut group = c.benchmark_group("post_processing");
    for speed in [0.75f32, 1.5] {
        group.bench_with_input(BenchmarkId::new("time_scale", speed), &speed, |b, &speed| {
            b.iter(|| time_scale(black_box(&samples), speed))
        });
    }
    group.bench_function("apply_gain", |b| {
        b.iter(|| {
            let mut buf = samples.clone();
            apply_gain(black_box(&mut buf), 2.0);
            buf
        })
    });
    group.bench_function("to_pcm16_le", |b| b.iter(|| AudioOutput::to_pcm16_le(black_box(&samples))));
    group.bench_function("to_wav_bytes", |b| {
        b.iter(|| AudioOutput::to_wav_bytes(black_box(&samples), 44100))
    });
    group.finish();
}

criterion_group!(benches, bench_normalization, bench_segmentation, bench_post_processing);
criterion_main!(benches);

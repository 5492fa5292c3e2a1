//! Throughput of the candidate-slab transformations at vocabulary scale.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use kiln::native::CandidateBuffer;
use kiln::{RepetitionPenalty, Temperature, TokenId, TopK, TopP};

const VOCAB: usize = 32_000;

fn synthetic_row(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| ((i as u64).wrapping_mul(2_654_435_761) % 1000) as f32 / 37.0)
        .collect()
}

fn bench_transforms(c: &mut Criterion) {
    let row = synthetic_row(VOCAB);
    let recent: Vec<TokenId> = (0..64).map(|i| TokenId(i * 31)).collect();

    let mut group = c.benchmark_group("sampler_transforms");
    group.throughput(Throughput::Elements(VOCAB as u64));

    group.bench_function("temperature", |b| {
        let sampler = Temperature::new(0.8);
        let mut candidates = CandidateBuffer::new(VOCAB);
        b.iter(|| {
            candidates.load(&row);
            sampler.apply(&mut candidates);
            black_box(candidates.len())
        });
    });

    group.bench_function("top_k_40", |b| {
        let sampler = TopK::new(40);
        let mut candidates = CandidateBuffer::new(VOCAB);
        b.iter(|| {
            candidates.load(&row);
            sampler.apply(&mut candidates);
            black_box(candidates.len())
        });
    });

    group.bench_function("top_p_095", |b| {
        let sampler = TopP::new(0.95);
        let mut candidates = CandidateBuffer::new(VOCAB);
        b.iter(|| {
            candidates.load(&row);
            sampler.apply(&mut candidates);
            black_box(candidates.len())
        });
    });

    group.bench_function("repetition_penalty", |b| {
        let sampler = RepetitionPenalty::new(1.1, 64);
        let mut candidates = CandidateBuffer::new(VOCAB);
        b.iter(|| {
            candidates.load(&row);
            sampler.apply(&mut candidates, &recent);
            black_box(candidates.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_transforms);
criterion_main!(benches);

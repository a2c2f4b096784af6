use criterion::{criterion_group, criterion_main, Criterion, black_box};
use qconv::kernels::quant::requantize;
use qconv::QuantizedMultiplier;

fn bench_requantize(c: &mut Criterion) {
    let q = QuantizedMultiplier::from_scale(0.0123);
    let accs: Vec<i32> = (0..4096).map(|i| (i * 7919) % 200_000 - 100_000).collect();
    c.bench_function("requantize_4096", |b| {
        b.iter(|| {
            let mut sum = 0i32;
            for &acc in black_box(&accs) {
                sum = sum.wrapping_add(requantize(acc, q.multiplier, q.shift, -3, -128, 127));
            }
            black_box(sum)
        })
    });
}

criterion_group!(benches, bench_requantize);
criterion_main!(benches);

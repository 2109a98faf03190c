use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use quotient_filter::QuotientFilter;

fn bench_insert(c: &mut Criterion) {
    let mut initial_items = 0;
    while initial_items < 1024 - 32 {
        c.bench_function(&format!("bench insert {}", initial_items), |b| {
            b.iter_batched_ref(
                || {
                    let mut filter = QuotientFilter::<u32>::from_fpp(1024, 0.01).unwrap();
                    for i in 0..initial_items {
                        filter.insert(&i).unwrap();
                    }
                    filter
                },
                |filter| filter.insert(&0xDEAD_BEEF).unwrap(),
                BatchSize::PerIteration,
            )
        });
        initial_items += 32;
    }
}

fn bench_contains(c: &mut Criterion) {
    let mut filter = QuotientFilter::<u32>::from_fpp(1024, 0.01).unwrap();
    for i in 0..1024 {
        filter.insert(&i).unwrap();
    }

    c.bench_function("bench contains hit", |b| b.iter(|| filter.contains(&512)));
    c.bench_function("bench contains miss", |b| {
        b.iter(|| filter.contains(&0xDEAD_BEEF))
    });
}

fn bench_remove(c: &mut Criterion) {
    c.bench_function("bench remove", |b| {
        b.iter_batched_ref(
            || {
                let mut filter = QuotientFilter::<u32>::from_fpp(1024, 0.01).unwrap();
                for i in 0..1024 {
                    filter.insert(&i).unwrap();
                }
                filter
            },
            |filter| filter.remove(&512),
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, bench_insert, bench_contains, bench_remove);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main};

mod stages;
use stages::*;

criterion_group!(benches_stages, bench_grid_search, bench_least_squares, bench_mcmc);
criterion_main!(benches_stages);

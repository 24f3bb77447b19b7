use criterion::{black_box, criterion_group, criterion_main, Criterion};

use forest_amr::prelude::*;

/// Deterministic pseudo-random linear ids (no RNG dependency needed).
fn ids(count: usize, bits: u32) -> Vec<u64> {
    let mask = (1u64 << bits) - 1;
    let mut state = 0x2545F4914F6CDD1Du64;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state & mask
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let ids2 = ids(4096, 16);
    let quads: Vec<Quadrant> = ids2.iter().map(|&id| Quadrant::from_morton(8, id)).collect();
    let ids3 = ids(4096, 24);
    let octs: Vec<Octant3> = ids3.iter().map(|&id| Octant3::from_morton(8, id)).collect();

    c.bench_function("from_morton_2d", |b| {
        b.iter(|| {
            for &id in &ids2 {
                black_box(Quadrant::from_morton(8, id));
            }
        })
    });

    c.bench_function("morton_index_3d", |b| {
        b.iter(|| {
            for q in &octs {
                black_box(q.morton_index());
            }
        })
    });

    c.bench_function("cmp_morton_2d", |b| {
        b.iter(|| {
            for pair in quads.windows(2) {
                black_box(pair[0].cmp_morton(&pair[1]));
            }
        })
    });

    c.bench_function("face_neighbors_3d", |b| {
        b.iter(|| {
            for q in &octs {
                for f in 0..6 {
                    black_box(q.face_neighbor(f));
                }
            }
        })
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracking::search::{locate, SearchMode};
use tracking::{leaderboard_at, snapshot_at, SnapshotConfig, TimeSeriesIndex};
use types::ids::EntityId;
use types::sample::{Position, Sample};

/// 40 entities, one sample a minute for five days.
fn race_index() -> TimeSeriesIndex {
    let mut samples = Vec::new();
    for e in 0..40 {
        let entity_id = EntityId::new(format!("Team{e:02}"));
        for minute in 0..(5 * 24 * 60) {
            let progress = minute as f64 * 0.001 * (1.0 + e as f64 / 40.0);
            samples.push(Sample {
                entity_id: entity_id.clone(),
                timestamp: minute * 60_000,
                position: Position::new(-12.46 - progress, 130.84 + progress / 4.0),
            });
        }
    }
    TimeSeriesIndex::from_samples(samples)
}

fn bench_queries(c: &mut Criterion) {
    let index = race_index();
    let (first, last) = index.bounds().unwrap_or((0, 0));
    let mid = first + (last - first) / 2;
    let times: Vec<i64> = (0..100_000).map(|i| i * 1_000).collect();

    c.bench_function("locate_nearest_100k", |b| {
        b.iter(|| locate(black_box(&times), black_box(50_000_500), SearchMode::Nearest))
    });

    c.bench_function("snapshot_40_entities", |b| {
        b.iter(|| snapshot_at(black_box(&index), black_box(mid), &SnapshotConfig::default()))
    });

    c.bench_function("leaderboard_40_entities", |b| {
        b.iter(|| leaderboard_at(black_box(&index), black_box(mid), 10))
    });
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);

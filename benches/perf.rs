use criterion::{Criterion, criterion_group, criterion_main};
use std::collections::HashMap;
use std::hint::black_box;

use cfb_power::consensus::consensus_lines;
use cfb_power::features::{TeamFeatureInputs, resolve_team_features};
use cfb_power::mftr::{MftrConfig, build_mftr};
use cfb_power::normalize::NormalizationTable;
use cfb_power::ratings::compute_ratings;
use cfb_power::scenarios::WeightScenario;
use cfb_power::synthetic::{self, SyntheticConfig, SyntheticSeason};

fn slate() -> SyntheticSeason {
    synthetic::generate(SyntheticConfig {
        teams: 130,
        weeks: 14,
        games_per_week: 60,
        ..SyntheticConfig::default()
    })
}

fn bench_consensus_build(c: &mut Criterion) {
    let season = slate();
    c.bench_function("consensus_build", |b| {
        b.iter(|| {
            let lines = consensus_lines(black_box(&season.quotes));
            black_box(lines.len());
        })
    });
}

fn bench_mftr_solve(c: &mut Criterion) {
    let season = slate();
    let lines = consensus_lines(&season.quotes);
    let cfg = MftrConfig::default();
    c.bench_function("mftr_solve", |b| {
        b.iter(|| {
            let solution =
                build_mftr(2024, black_box(&season.games), black_box(&lines), &cfg).unwrap();
            black_box(solution.hfa_constant);
        })
    });
}

fn bench_ratings_compute(c: &mut Criterion) {
    let season = slate();
    let scenario = WeightScenario::by_version("v3_balanced").unwrap();

    // Resolve feature vectors once; the bench targets the rating math.
    let mut inputs_by_team: HashMap<u32, TeamFeatureInputs> = HashMap::new();
    for row in &season.game_stats {
        inputs_by_team
            .entry(row.team_id)
            .or_default()
            .game_rows
            .push(row.clone());
    }
    let vectors: Vec<_> = inputs_by_team
        .iter()
        .map(|(team_id, inputs)| resolve_team_features(*team_id, 2024, inputs))
        .collect();
    let table = NormalizationTable::for_population(&vectors);

    c.bench_function("ratings_compute", |b| {
        b.iter(|| {
            let ratings =
                compute_ratings(black_box(&vectors), black_box(&scenario), black_box(&table));
            black_box(ratings.len());
        })
    });
}

criterion_group!(perf, bench_consensus_build, bench_mftr_solve, bench_ratings_compute);
criterion_main!(perf);

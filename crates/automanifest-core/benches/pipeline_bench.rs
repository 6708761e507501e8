use automanifest_core::{
    build_plan, derive_saved_state, expand, select_mode, ActivitySummary, DerivationParams,
    PlanMode, Seed, EXPANSION_LEN, SEED_LEN,
};
use criterion::{criterion_group, criterion_main, Criterion};
use time::OffsetDateTime;

fn mk_summary(index: u32) -> ActivitySummary {
    ActivitySummary::new(OffsetDateTime::UNIX_EPOCH, index % 9, index % 4, index % 5, index % 7)
}

fn bench_expand(c: &mut Criterion) {
    let seed = Seed::from_bytes([7_u8; SEED_LEN]);
    let summary = mk_summary(3);

    c.bench_function("expand_20k", |b| {
        b.iter(|| {
            let bytes = expand(&seed, &summary, EXPANSION_LEN);
            assert!(bytes.is_ok());
        });
    });
}

fn bench_plan(c: &mut Criterion) {
    let seed = Seed::from_bytes([7_u8; SEED_LEN]);
    let bytes = match expand(&seed, &mk_summary(3), EXPANSION_LEN) {
        Ok(bytes) => bytes,
        Err(err) => panic!("bench expansion failed: {err}"),
    };

    c.bench_function("build_plan_full_catalog", |b| {
        b.iter(|| {
            let steps = build_plan(&bytes, "Ship iOS app milestone", PlanMode::WaveAligned, 6);
            assert!(steps.is_ok());
        });
    });
}

fn bench_derivation(c: &mut Criterion) {
    let seed = Seed::from_bytes([7_u8; SEED_LEN]);
    let summaries = (0..32).map(mk_summary).collect::<Vec<_>>();

    c.bench_function("derive_saved_state_x32", |b| {
        b.iter(|| {
            for summary in &summaries {
                let _mode = select_mode(summary);
                let state = derive_saved_state(
                    summary.clone(),
                    &seed,
                    "Ship iOS app milestone",
                    DerivationParams::default(),
                );
                assert!(state.is_ok());
            }
        });
    });
}

criterion_group!(benches, bench_expand, bench_plan, bench_derivation);
criterion_main!(benches);

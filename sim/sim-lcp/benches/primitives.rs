//! Benchmarks for the solver inner-loop primitives.
//!
//! Run with: cargo bench -p sim-lcp
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p sim-lcp -- --save-baseline main
//! 2. After changes: cargo bench -p sim-lcp -- --baseline main

#![allow(missing_docs, clippy::unwrap_used, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::Vector3;
use sim_lcp::{
    Constraint, ConstraintBatches, LcpConfig, ParallelConfig, SystemDescriptor, TwoBodyConstraint,
    Variables,
};
use sim_types::MassProperties;

// =============================================================================
// Scene Generation
// =============================================================================

/// A pendulum chain of `n` boxes hanging from a fixed ground, three
/// constraint rows per joint.
fn chain(n: usize, config: LcpConfig) -> SystemDescriptor {
    let mut system = SystemDescriptor::with_config(config).unwrap();
    let ground = system.add_variables(Variables::for_body(&MassProperties::fixed()).unwrap());
    let props = MassProperties::box_shape(1.0, Vector3::new(0.5, 0.1, 0.1));

    let mut prev = ground;
    for i in 0..n {
        let body = system.add_variables(Variables::for_body(&props).unwrap());
        for axis in 0..3 {
            let mut c = TwoBodyConstraint::new(system.variables(), prev, body).unwrap();
            c.jacobian_a_mut()[axis] = 1.0;
            c.jacobian_a_mut()[3 + (axis + 1) % 3] = 0.5;
            c.jacobian_b_mut()[axis] = -1.0;
            c.jacobian_b_mut()[3 + (axis + 2) % 3] = 0.5;
            c.set_rhs(0.01 * i as f64);
            system.add_constraint(c);
        }
        prev = body;
    }
    system.update_auxiliary();
    system
}

fn pgs(c: &TwoBodyConstraint, cq_v: f64) -> f64 {
    let state = c.state();
    -(cq_v + state.rhs + state.cfm * state.multiplier) / state.schur_diagonal
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_velocity_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("VelocityPrimitives");

    for &n in &[16_usize, 256] {
        let mut system = chain(n, LcpConfig::default());
        group.throughput(Throughput::Elements(system.constraints().len() as u64));

        group.bench_with_input(
            BenchmarkId::new("compute_jacobian_dot_velocity", n),
            &n,
            |b, _| {
                b.iter(|| {
                    let arena = system.variables();
                    system
                        .constraints()
                        .iter()
                        .map(|c| c.compute_jacobian_dot_velocity(black_box(arena)))
                        .sum::<f64>()
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("increment_velocity", n), &n, |b, _| {
            b.iter(|| {
                let (arena, constraints) = system.split_mut();
                for c in constraints.iter() {
                    c.increment_velocity(arena, black_box(1e-6));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("update_auxiliary", n), &n, |b, _| {
            b.iter(|| system.update_auxiliary());
        });
    }

    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("Assembly");
    group.sample_size(20);

    for &n in &[16_usize, 256] {
        let mut system = chain(n, LcpConfig::default());
        system.begin_session();
        group.throughput(Throughput::Elements(system.constraints().len() as u64));

        group.bench_with_input(BenchmarkId::new("build_cq", n), &n, |b, _| {
            b.iter(|| black_box(system.build_cq().unwrap().to_csr()));
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sweep");
    group.sample_size(20);

    let n = 1024;
    for (label, parallel) in [
        ("sequential", ParallelConfig::default()),
        (
            "parallel",
            ParallelConfig {
                enabled: true,
                min_batch_size: 32,
            },
        ),
    ] {
        let mut system = chain(n, LcpConfig::default().with_parallel(parallel));
        let batches: ConstraintBatches = system.batches();
        group.throughput(Throughput::Elements(system.constraints().len() as u64));

        group.bench_function(label, |b| {
            b.iter(|| system.sweep(&batches, pgs).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_velocity_primitives, bench_assembly, bench_sweep);
criterion_main!(benches);

// Health gate and pending-table benchmarks for the Umbra vault.
//
// Covers encrypted collateral valuation, the full borrow gate
// (value, health check, select) and pending-table registration at
// various table sizes.

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use umbra_protocol::config::{HealthPolicy, EXCHANGE_RATE_SCALE};
use umbra_protocol::fhe::clear::ClearBackend;
use umbra_protocol::fhe::Evaluator;
use umbra_protocol::vault::{HealthGate, OperationKind, PendingTable};
use umbra_protocol::Address;

fn evaluator() -> Evaluator {
    Evaluator::new(Arc::new(ClearBackend::new()), Address::from("vault"))
}

fn bench_collateral_value(c: &mut Criterion) {
    let fhe = evaluator();
    let policy = HealthPolicy::default();
    let gate = HealthGate::new(&fhe, &policy);
    let shares = fhe.constant(5);

    c.bench_function("gate/collateral_value", |b| {
        b.iter(|| gate.collateral_value(&shares, EXCHANGE_RATE_SCALE).unwrap());
    });
}

fn bench_borrow_gate(c: &mut Criterion) {
    let fhe = evaluator();
    let policy = HealthPolicy::default();
    let gate = HealthGate::new(&fhe, &policy);
    let collateral = fhe.constant(5);
    let debt = fhe.constant(100);
    let requested = fhe.constant(400);

    c.bench_function("gate/borrow", |b| {
        b.iter(|| {
            let value = gate.collateral_value(&collateral, EXCHANGE_RATE_SCALE).unwrap();
            let debt_after = fhe.add(&debt, &requested).unwrap();
            let healthy = gate.user_is_healthy(&value, &debt_after).unwrap();
            gate.gate(&healthy, &requested).unwrap()
        });
    });
}

fn bench_pending_register(c: &mut Criterion) {
    let fhe = evaluator();
    let amount = fhe.constant(1);
    let mut group = c.benchmark_group("pending/register_take");

    for size in [10, 1_000, 10_000] {
        let mut table = PendingTable::new();
        let now = Utc::now();
        for i in 0..size {
            table.register(
                Address::new(format!("participant-{i}")),
                OperationKind::Borrow,
                amount.clone(),
                None,
                now,
                now + Duration::hours(1),
            );
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let id = table.register(
                    Address::from("bench"),
                    OperationKind::Repay,
                    amount.clone(),
                    Some(1),
                    now,
                    now + Duration::hours(1),
                );
                table.take(&id).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_collateral_value,
    bench_borrow_gate,
    bench_pending_register,
);
criterion_main!(benches);

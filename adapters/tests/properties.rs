//! Ledger-wide properties that must hold after any sequence of settlements.

mod common;

use common::*;
use umbra_adapters::Deployment;
use umbra_protocol::collaborators::{FungibleToken, LiquidityPool};
use umbra_protocol::config::HealthPolicy;
use umbra_protocol::vault::{check_vault_healthy, OperationKind};
use umbra_protocol::{Address, Settlement, VaultError};

/// Aggregates equal the sum of what each participant can decrypt.
fn assert_conserved(d: &Deployment, participants: &[Address]) {
    let ledger = d.vault.aggregate();
    let collateral: u64 = participants.iter().map(|p| d.collateral_of(p)).sum();
    let debt: u64 = participants.iter().map(|p| d.debt_of(p)).sum();
    assert_eq!(ledger.total_collateral, collateral, "collateral conservation");
    assert_eq!(ledger.total_debt, debt, "debt conservation");
}

fn assert_vault_healthy(d: &Deployment) {
    let ledger = d.vault.aggregate();
    check_vault_healthy(
        &d.vault.config().policy,
        ledger.total_collateral,
        ledger.total_debt,
        d.pool.exchange_rate(),
    )
    .expect("vault invariant");
}

#[test]
fn conservation_across_mixed_operations() {
    let d = deployment();
    let carol = Address::from("carol");
    let everyone = [alice(), bob(), carol.clone()];

    deposit(&d, &alice(), 5);
    deposit(&d, &bob(), 3);
    deposit(&d, &carol, 2);
    assert_conserved(&d, &everyone);

    borrow(&d, &alice(), 4_000);
    borrow(&d, &bob(), 2_500);
    assert_conserved(&d, &everyone);
    assert_vault_healthy(&d);

    d.vault
        .request_withdraw(&carol, &d.encrypt(&carol, 2))
        .unwrap();
    d.repay_for(&alice(), 1_000).unwrap();
    d.vault
        .request_withdraw(&bob(), &d.encrypt(&bob(), 1))
        .unwrap();
    d.relay();
    assert_conserved(&d, &everyone);
    assert_vault_healthy(&d);

    assert_eq!(d.collateral_of(&carol), 0);
    assert_eq!(d.debt_of(&alice()), 3_000);
    assert_eq!(d.collateral_of(&bob()), 2);
}

#[test]
fn aggregates_match_external_positions() {
    let d = deployment();
    deposit(&d, &alice(), 5);
    deposit(&d, &bob(), 4);
    borrow(&d, &alice(), 1_000);
    borrow(&d, &bob(), 700);

    let vault = Address::from("vault");
    let ledger = d.vault.aggregate();
    assert_eq!(ledger.total_collateral, d.pool.share_balance_of(&vault));
    assert_eq!(ledger.total_debt, d.pool.borrow_balance_of(&vault));
    // The vault only passes assets through; it never keeps any.
    assert_eq!(d.debt.balance_of(&vault), 0);
    assert_eq!(d.collateral.balance_of(&vault), 0);
}

#[test]
fn repay_never_burns_more_than_owed() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 300);
    d.debt.mint(&alice, 10_000).unwrap();

    for declared in [1_000, 50, 10_000] {
        let before = d.debt_of(&alice);
        d.repay_for(&alice, declared).unwrap();
        d.relay();
        let after = d.debt_of(&alice);
        assert!(after <= before);
        assert_eq!(before - after, declared.min(before));
    }
    assert_eq!(d.debt_of(&alice), 0);
    assert_eq!(d.vault.aggregate().total_debt, 0);
}

#[test]
fn unhealthy_borrow_settles_to_exactly_zero() {
    let d = deployment();
    let alice = alice();
    // One unit is worth 3000.
    deposit(&d, &alice, 1);
    let ledger = d.vault.aggregate();

    let id = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 3_001))
        .unwrap();
    let report = d.relay();

    assert_eq!(
        report.settlements,
        vec![Settlement::Rejected {
            correlation_id: id,
            kind: umbra_protocol::vault::OperationKind::Borrow,
            participant: alice.clone(),
        }]
    );
    assert_eq!(d.vault.aggregate(), ledger);
    assert_eq!(d.debt_of(&alice), 0);
    assert_eq!(d.debt.balance_of(&alice), 0);
}

#[test]
fn gate_ceiling_is_inclusive() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 1);
    // Exactly the per-participant ceiling, and within the vault LTV once
    // Bob's collateral is in.
    deposit(&d, &bob(), 10);
    borrow(&d, &alice, 3_000);
    assert_eq!(d.debt_of(&alice), 3_000);
    assert_vault_healthy(&d);
}

#[test]
fn replayed_callback_changes_nothing() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    let id = borrow(&d, &alice, 100);
    let ledger = d.vault.aggregate();
    let wallet = d.debt.balance_of(&alice);

    for _ in 0..3 {
        let outcome = d.vault.resolve(&oracle(), id, 100).unwrap();
        assert_eq!(outcome, Settlement::Unknown { correlation_id: id });
    }
    assert_eq!(d.vault.aggregate(), ledger);
    assert_eq!(d.debt.balance_of(&alice), wallet);
    assert_eq!(d.debt_of(&alice), 100);
}

#[test]
fn stale_gate_is_backstopped_by_vault_check() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);

    // Both requests are gated against zero debt, so both pass the gate.
    let first = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 8_000))
        .unwrap();
    let second = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 8_000))
        .unwrap();
    assert_eq!(d.vault.pending_for(&alice).len(), 2);

    let report = d.relay();
    assert_eq!(report.settled(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].correlation_id, second);
    assert!(d.vault.pending_operation(&first).is_none());
    assert!(d.vault.pending_operation(&second).is_some());

    assert_eq!(d.debt_of(&alice), 8_000);
    assert_vault_healthy(&d);
}

#[test]
fn owner_alone_can_read_their_balances() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 100);

    let debt = d.vault.encrypted_debt_of(&alice).unwrap();
    let fhe = d.vault.evaluator();
    assert_eq!(fhe.decrypt_as(&alice, &debt).unwrap(), 100);
    assert!(fhe.decrypt_as(&bob(), &debt).is_err());
    assert!(fhe.decrypt_as(&oracle(), &debt).is_err());

    let collateral = d.vault.encrypted_collateral_of(&alice).unwrap();
    assert_eq!(fhe.decrypt_as(&alice, &collateral).unwrap(), 5);
    assert!(fhe.decrypt_as(&bob(), &collateral).is_err());

    assert!(d.vault.encrypted_debt_of(&bob()).is_none());
}

#[test]
fn pending_withdrawals_cannot_spend_the_same_shares() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    deposit(&d, &bob(), 5);

    let first = d
        .vault
        .request_withdraw(&alice, &d.encrypt(&alice, 5))
        .unwrap();
    let second = d
        .vault
        .request_withdraw(&alice, &d.encrypt(&alice, 5))
        .unwrap();
    let report = d.relay();

    assert!(report.failures.is_empty());
    assert_eq!(report.settled(), 1);
    assert_eq!(
        report.settlements[1],
        Settlement::Rejected {
            correlation_id: second,
            kind: OperationKind::Withdraw,
            participant: alice.clone(),
        }
    );
    assert!(d.vault.pending_operation(&first).is_none());
    assert_eq!(d.collateral_of(&alice), 0);
    assert_eq!(d.collateral_of(&bob()), 5);
    assert_eq!(d.collateral.balance_of(&alice), 5);
    assert_eq!(d.vault.aggregate().total_collateral, 5);
    assert_conserved(&d, &[alice.clone(), bob()]);

    // The earmark is released at settlement.
    deposit(&d, &alice, 2);
    d.vault
        .request_withdraw(&alice, &d.encrypt(&alice, 2))
        .unwrap();
    assert_eq!(d.relay().settled(), 1);
    assert_eq!(d.collateral_of(&alice), 0);
}

#[test]
fn pending_repayments_cannot_burn_the_same_debt() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    deposit(&d, &bob(), 5);
    borrow(&d, &alice, 500);
    borrow(&d, &bob(), 500);
    d.debt.mint(&alice, 500).unwrap();

    d.repay_for(&alice, 500).unwrap();
    d.repay_for(&alice, 500).unwrap();
    let report = d.relay();

    assert!(report.failures.is_empty());
    assert_eq!(report.settled(), 1);
    assert_eq!(report.rejected(), 1);
    assert_eq!(d.debt_of(&alice), 0);
    assert_eq!(d.debt_of(&bob()), 500);
    assert_eq!(d.vault.aggregate().total_debt, 500);
    assert_eq!(d.debt.balance_of(&alice), 500);
    assert_conserved(&d, &[alice.clone(), bob()]);
}

#[test]
fn pending_withdrawal_counts_against_borrow_headroom() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    deposit(&d, &bob(), 20);

    d.vault
        .request_withdraw(&alice, &d.encrypt(&alice, 4))
        .unwrap();
    // One share left once the withdrawal lands: 3000 is the ceiling.
    d.vault
        .request_borrow(&alice, &d.encrypt(&alice, 3_001))
        .unwrap();
    let report = d.relay();

    assert_eq!(report.settled(), 1);
    assert_eq!(report.rejected(), 1);
    assert_eq!(d.collateral_of(&alice), 1);
    assert_eq!(d.debt_of(&alice), 0);
}

#[test]
fn gate_values_high_decimal_collateral() {
    let policy = HealthPolicy::default().with_units(1_000_000_000_000_000_000, 1_000_000);
    let d = deployment_with(config().with_policy(policy));
    d.seed_liquidity(10_000_000_000).unwrap();
    let alice = alice();
    // One whole unit is worth 3000 * 10^6 debt units.
    deposit(&d, &alice, 1_000_000_000_000_000_000);

    borrow(&d, &alice, 2_000_000_000);
    assert_eq!(d.debt_of(&alice), 2_000_000_000);

    let id = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 1_000_000_001))
        .unwrap();
    let report = d.relay();
    assert_eq!(
        report.settlements,
        vec![Settlement::Rejected {
            correlation_id: id,
            kind: OperationKind::Borrow,
            participant: alice.clone(),
        }]
    );
    assert_eq!(d.debt_of(&alice), 2_000_000_000);
    assert_vault_healthy(&d);
}

#[test]
fn deposits_beyond_the_valuation_range_are_refused() {
    // A single share is worth 10^15: the encrypted gate can value one.
    let policy = HealthPolicy::default().with_collateral_price(1_000_000_000_000_000);
    let d = deployment_with(config().with_policy(policy));
    let alice = alice();
    deposit(&d, &alice, 1);

    d.collateral.mint(&alice, 1).unwrap();
    let err = d.deposit_for(&alice, 1).unwrap_err();
    assert!(matches!(
        err,
        VaultError::CapacityExceeded {
            total: 2,
            capacity: 1
        }
    ));
    assert_eq!(d.vault.aggregate().total_collateral, 1);
    assert_eq!(d.collateral.balance_of(&alice), 1);
    assert_eq!(d.collateral_of(&alice), 1);
    assert_eq!(d.market.open_savepoints(), 0);
}

#[test]
fn compaction_frees_only_dead_ciphertexts() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 1_000);
    d.repay_for(&alice, 400).unwrap();
    d.relay();
    let before = d.backend.ciphertext_count();

    // The first pass only sets the mark.
    assert_eq!(d.compact(), 0);
    let dropped = d.compact();
    assert!(dropped > 0);
    assert_eq!(d.backend.ciphertext_count(), before - dropped);

    assert_eq!(d.collateral_of(&alice), 5);
    assert_eq!(d.debt_of(&alice), 600);
    borrow(&d, &alice, 100);
    assert_eq!(d.debt_of(&alice), 700);
    assert_conserved(&d, &[alice.clone()]);
}

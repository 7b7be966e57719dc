//! End-to-end lending scenarios.
//!
//! Each test drives the vault through the in-memory collaborators exactly as
//! a client and an oracle would: request, relay, inspect.

mod common;

use common::*;
use umbra_protocol::collaborators::{FungibleToken, LiquidityPool};
use umbra_protocol::config::EXCHANGE_RATE_SCALE;
use umbra_protocol::vault::{AggregateLedger, OperationKind, VaultEvent};
use umbra_protocol::{Settlement, VaultError};

// ---------------------------------------------------------------------------
// Scenario A: deposit, borrow, receive
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_borrow_against_deposit() {
    let d = deployment();
    let alice = alice();

    assert_eq!(deposit(&d, &alice, 5), 5);
    let id = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 100))
        .unwrap();

    // Nothing moves until the oracle answers.
    assert_eq!(d.debt.balance_of(&alice), 0);
    assert_eq!(d.vault.pending_count(), 1);

    let report = d.relay();
    assert_eq!(report.settled(), 1);
    assert_eq!(
        report.settlements[0],
        Settlement::Settled {
            correlation_id: id,
            kind: OperationKind::Borrow,
            participant: alice.clone(),
            amount: 100,
        }
    );

    assert_eq!(
        d.vault.aggregate(),
        AggregateLedger {
            total_collateral: 5,
            total_debt: 100
        }
    );
    assert_eq!(d.debt_of(&alice), 100);
    assert_eq!(d.debt.balance_of(&alice), 100);
    assert_eq!(d.pool.borrow_balance_of(&"vault".into()), 100);
    assert_eq!(d.vault.pending_count(), 0);
}

#[test]
fn scenario_a_event_trail() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    let id = borrow(&d, &alice, 100);

    let names: Vec<_> = events(&d).iter().map(|e| e.name()).collect();
    assert_eq!(names, ["deposited", "borrow_requested", "borrowed"]);

    // Drained means drained.
    assert!(events(&d).is_empty());
    assert!(d.vault.pending_operation(&id).is_none());
}

// ---------------------------------------------------------------------------
// Scenario B: over-repayment
// ---------------------------------------------------------------------------

#[test]
fn scenario_b_over_repayment_is_clamped() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 500);
    assert_eq!(d.debt_of(&alice), 500);

    // Alice holds 600 so the full declared amount is payable.
    d.debt.mint(&alice, 100).unwrap();
    assert_eq!(d.debt.balance_of(&alice), 600);
    events(&d);

    let id = d.repay_for(&alice, 600).unwrap();
    let report = d.relay();
    assert_eq!(report.settled(), 1);

    let repaid = events(&d)
        .into_iter()
        .find(|e| matches!(e, VaultEvent::Repaid { .. }))
        .expect("repaid event");
    match repaid {
        VaultEvent::Repaid {
            correlation_id,
            burned,
            excess_returned,
            ..
        } => {
            assert_eq!(correlation_id, id);
            assert_eq!(burned, 500);
            assert_eq!(excess_returned, 100);
        }
        _ => unreachable!(),
    }

    assert_eq!(d.debt_of(&alice), 0);
    assert_eq!(d.vault.aggregate().total_debt, 0);
    // Exactly the burned amount left Alice's wallet; the excess stayed.
    assert_eq!(d.debt.balance_of(&alice), 100);
    assert_eq!(d.debt.allowance(&alice, &"vault".into()), 100);
    assert_eq!(d.pool.borrow_balance_of(&"vault".into()), 0);
}

// ---------------------------------------------------------------------------
// Scenario C: vault LTV is the final authority
// ---------------------------------------------------------------------------

#[test]
fn scenario_c_borrow_past_vault_ltv_aborts() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);

    // 5 units at 3000 is 15_000; 80% of that is exactly 12_000.
    borrow(&d, &alice, 12_000);
    assert_eq!(d.vault.aggregate().total_debt, 12_000);
    let wallet_before = d.debt.balance_of(&alice);

    let id = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 1))
        .unwrap();
    let report = d.relay();

    assert_eq!(report.settled(), 0);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.correlation_id, id);
    assert!(matches!(
        failure.error,
        VaultError::SolvencyViolation {
            collateral_value: 15_000,
            debt: 12_001
        }
    ));

    assert_eq!(d.vault.aggregate().total_debt, 12_000);
    assert_eq!(d.debt_of(&alice), 12_000);
    assert_eq!(d.debt.balance_of(&alice), wallet_before);
    assert_eq!(d.pool.borrow_balance_of(&"vault".into()), 12_000);
    // Still pending, still queued for a retry.
    assert!(d.vault.pending_operation(&id).is_some());
    assert_eq!(d.oracle.queued(), 1);
}

#[test]
fn scenario_c_resolves_once_collateral_arrives() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 12_000);
    let id = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 1))
        .unwrap();
    assert_eq!(d.relay().failures.len(), 1);

    deposit(&d, &bob(), 1);
    let report = d.relay();
    assert_eq!(report.settled(), 1);
    assert!(d.vault.pending_operation(&id).is_none());
    assert_eq!(d.vault.aggregate().total_debt, 12_001);
}

// ---------------------------------------------------------------------------
// Scenario D: zero settles as a no-op
// ---------------------------------------------------------------------------

#[test]
fn scenario_d_zero_amounts_touch_nothing() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    events(&d);

    let ledger_before = d.vault.aggregate();
    let weth_before = d.collateral.balance_of(&alice);
    let usdc_before = d.debt.balance_of(&alice);
    let pool_liquidity = d.debt.balance_of(&d.pool.address());
    let pool_shares = d.pool.total_shares();

    let borrow_id = d
        .vault
        .request_borrow(&alice, &d.encrypt(&alice, 0))
        .unwrap();
    let withdraw_id = d
        .vault
        .request_withdraw(&alice, &d.encrypt(&alice, 0))
        .unwrap();
    // Nothing owed, so a positive repay clamps to zero.
    let repay_id = d.repay_for(&alice, 50).unwrap();

    let report = d.relay();
    assert_eq!(report.rejected(), 3);
    assert!(report.failures.is_empty());
    for id in [borrow_id, withdraw_id, repay_id] {
        assert!(report.settlements.iter().any(|s| matches!(
            s,
            Settlement::Rejected { correlation_id, .. } if *correlation_id == id
        )));
    }

    assert_eq!(d.vault.aggregate(), ledger_before);
    assert_eq!(d.collateral.balance_of(&alice), weth_before);
    assert_eq!(d.debt.balance_of(&alice), usdc_before);
    assert_eq!(d.debt.balance_of(&d.pool.address()), pool_liquidity);
    assert_eq!(d.pool.total_shares(), pool_shares);
    assert_eq!(d.collateral_of(&alice), 5);
    assert_eq!(d.debt_of(&alice), 0);

    // Only the three request events; rejections emit nothing.
    let names: Vec<_> = events(&d).iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        ["borrow_requested", "withdraw_requested", "repay_requested"]
    );
}

// ---------------------------------------------------------------------------
// Withdraw
// ---------------------------------------------------------------------------

#[test]
fn withdraw_pays_out_measured_underlying() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);

    // Yield accrues: each share is now worth two units.
    d.pool.set_exchange_rate(2 * EXCHANGE_RATE_SCALE).unwrap();

    d.vault
        .request_withdraw(&alice, &d.encrypt(&alice, 2))
        .unwrap();
    assert_eq!(d.relay().settled(), 1);

    assert_eq!(d.collateral_of(&alice), 3);
    assert_eq!(d.vault.aggregate().total_collateral, 3);
    assert_eq!(d.collateral.balance_of(&alice), 4);
    assert!(events(&d).iter().any(|e| matches!(
        e,
        VaultEvent::Withdrawn {
            shares: 2,
            underlying: 4,
            ..
        }
    )));
}

#[test]
fn withdraw_more_than_held_settles_to_zero() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);

    d.vault
        .request_withdraw(&alice, &d.encrypt(&alice, 6))
        .unwrap();
    let report = d.relay();
    assert_eq!(report.rejected(), 1);
    assert_eq!(d.collateral_of(&alice), 5);
    assert_eq!(d.collateral.balance_of(&alice), 0);
}

#[test]
fn withdraw_that_breaks_vault_ltv_aborts() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 12_000);

    // Four units still cover 12_000 at a 1.0 health factor, so the gate
    // approves. At 80% vault LTV they do not.
    d.vault
        .request_withdraw(&alice, &d.encrypt(&alice, 1))
        .unwrap();
    let report = d.relay();
    assert!(matches!(
        report.failures[0].error,
        VaultError::SolvencyViolation { .. }
    ));
    assert_eq!(d.collateral_of(&alice), 5);
    assert_eq!(d.vault.aggregate().total_collateral, 5);
    assert_eq!(d.collateral.balance_of(&alice), 0);
}

// ---------------------------------------------------------------------------
// Repay
// ---------------------------------------------------------------------------

#[test]
fn partial_repayment() {
    let d = deployment();
    let alice = alice();
    deposit(&d, &alice, 5);
    borrow(&d, &alice, 500);

    d.repay_for(&alice, 200).unwrap();
    assert_eq!(d.relay().settled(), 1);

    assert_eq!(d.debt_of(&alice), 300);
    assert_eq!(d.vault.aggregate().total_debt, 300);
    assert_eq!(d.debt.balance_of(&alice), 300);
    assert!(events(&d).iter().any(|e| matches!(
        e,
        VaultEvent::Repaid {
            burned: 200,
            excess_returned: 0,
            ..
        }
    )));
}

#[test]
fn deposit_credits_measured_shares() {
    let d = deployment();
    let alice = alice();
    d.pool.set_exchange_rate(2 * EXCHANGE_RATE_SCALE).unwrap();

    // Ten units at two units per share mint five shares.
    assert_eq!(deposit(&d, &alice, 10), 5);
    assert_eq!(d.collateral_of(&alice), 5);
    assert_eq!(d.vault.aggregate().total_collateral, 5);
    assert_eq!(d.pool.share_balance_of(&"vault".into()), 5);
}

#[test]
fn dust_deposit_that_mints_nothing_is_refused() {
    let d = deployment();
    let alice = alice();
    d.pool.set_exchange_rate(2 * EXCHANGE_RATE_SCALE).unwrap();
    d.collateral.mint(&alice, 1).unwrap();

    let err = d.deposit_for(&alice, 1).unwrap_err();
    assert!(matches!(err, VaultError::NothingMinted { amount: 1 }));
    assert_eq!(d.collateral.balance_of(&alice), 1);
    assert_eq!(d.vault.aggregate().total_collateral, 0);
}

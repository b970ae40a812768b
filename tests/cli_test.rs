use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn reconcile(report: &str) -> Command {
    let mut cmd = Command::new(cargo_bin!("order-reconciler"));
    cmd.arg("tests/fixtures/events.jsonl")
        .arg("--seed")
        .arg("tests/fixtures/seed.json")
        .arg("--report")
        .arg(report)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_orders_report() -> Result<(), Box<dyn std::error::Error>> {
    reconcile("orders")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "order,status,payment_ref,total,currency,inventory_committed",
        ))
        // Checkout applied once despite the redelivery
        .stdout(predicate::str::contains("O1,PAID,PI1,230.00,ZAR,true"))
        // Foreign session is not applied and is left for redelivery
        .stdout(predicate::str::contains("O2,PENDING,,99.50,ZAR,false"))
        .stdout(predicate::str::contains("O3,CANCELLED,PI3,40.00,ZAR,false"))
        .stdout(predicate::str::contains("O4,CANCELLED,PI4,10.00,ZAR,false"))
        .stdout(predicate::str::contains("O5,PAID,PI5,75.00,ZAR,true"));

    Ok(())
}

#[test]
fn test_cli_inventory_report() {
    reconcile("inventory")
        .assert()
        .success()
        .stdout(predicate::str::contains("product,quantity,reserved"))
        .stdout(predicate::str::contains("P1,8,3"))
        // Oversold: quantity goes negative, reserved clamps at zero
        .stdout(predicate::str::contains("P2,-2,0"));
}

#[test]
fn test_cli_payments_report() {
    let output = reconcile("payments").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let rows: Vec<&str> = stdout.lines().collect();
    assert_eq!(rows[0], "order,payment_ref,status,amount,currency,method");
    assert_eq!(rows.len(), 3, "one ledger row per settled order: {stdout}");
    assert!(rows.contains(&"O1,PI1,COMPLETED,230.00,ZAR,STRIPE_CHECKOUT"));
    assert!(rows.contains(&"O5,PI5,COMPLETED,75.00,ZAR,STRIPE_CHECKOUT"));
}

#[test]
fn test_cli_reports_bad_events_and_continues() {
    reconcile("orders")
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "line 3: Checkout session does not match order: O2 (retryable)",
        ))
        .stderr(predicate::str::contains("Error processing event on line 8"))
        .stderr(predicate::str::contains("Error processing event on line 9"))
        .stderr(predicate::str::contains("line 10: Order not found").and(
            predicate::str::contains("(retryable)"),
        ));
}

#[test]
fn test_cli_custom_payment_method() {
    reconcile("payments")
        .arg("--payment-method")
        .arg("CARD")
        .assert()
        .success()
        .stdout(predicate::str::contains("O1,PI1,COMPLETED,230.00,ZAR,CARD"));
}

#[test]
fn test_cli_missing_events_file_fails() {
    let mut cmd = Command::new(cargo_bin!("order-reconciler"));
    cmd.arg("tests/fixtures/does-not-exist.jsonl");
    cmd.assert().failure();
}

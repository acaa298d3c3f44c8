//! End-to-end billing cycle over the in-memory stores.
//!
//! Tests: batch create → manual edits → mark sent → preview → payment → deletion
//!
//! Verifies after every step that `lastBilling` mirrors the max-period record.

use tenantbill_billing::{BillingPeriod, InvoiceStatus, LineItem, Plan, TenantProfile};
use tenantbill_core::TenantId;

use crate::config::BillingConfig;
use crate::services::{BillingServices, ReconcileOutcome};

fn period(s: &str) -> BillingPeriod {
    s.parse().unwrap()
}

async fn register(services: &BillingServices, name: &str, plan: Option<Plan>) -> TenantId {
    services
        .tenants
        .register(TenantProfile {
            name: name.to_string(),
            plan,
            billing_email: format!("{}@venues.test", name.to_lowercase()),
        })
        .await
        .unwrap()
        .id_typed()
}

async fn summary(services: &BillingServices, tenant_id: TenantId) -> Option<(String, InvoiceStatus)> {
    services
        .tenants
        .get(tenant_id)
        .await
        .unwrap()
        .last_billing()
        .map(|lb| (lb.period.to_string(), lb.status))
}

#[tokio::test]
async fn two_month_billing_cycle() {
    let services = BillingServices::in_memory(BillingConfig::default());
    let hall = register(&services, "Hall", Some(Plan::Pro)).await;
    let club = register(&services, "Club", Some(Plan::Standard)).await;
    let trial = register(&services, "Trial", Some(Plan::Free)).await;

    // January: batch create, send, pay.
    let jan = period("2026-01");
    let created = services.batch.create_for_period(&jan).await.unwrap();
    assert_eq!((created.eligible, created.succeeded), (2, 2));

    let sent = services.batch.mark_sent_for_period(&jan).await.unwrap();
    assert_eq!(sent.succeeded, 2);

    for tenant in [hall, club] {
        let jan_record = services.lifecycle.list_invoices(tenant).await.unwrap()[0].clone();
        services
            .lifecycle
            .transition_status(jan_record.id_typed(), InvoiceStatus::Paid)
            .await
            .unwrap();
        assert_eq!(
            summary(&services, tenant).await,
            Some(("2026-01".to_string(), InvoiceStatus::Paid))
        );
    }

    // February: batch create, then a manual line-item edit for one tenant.
    let feb = period("2026-02");
    services.batch.create_for_period(&feb).await.unwrap();
    let hall_feb = services.lifecycle.list_invoices(hall).await.unwrap()[0].clone();
    assert_eq!(hall_feb.period(), &feb);

    services
        .lifecycle
        .update_line_items(
            hall_feb.id_typed(),
            vec![LineItem::new("Seats", 1000, 2), LineItem::new("Support", 500, 1)],
        )
        .await
        .unwrap();

    let preview = services.batch.preview(&feb).await.unwrap();
    let names: Vec<&str> = preview.iter().map(|e| e.tenant.name()).collect();
    assert_eq!(names, ["Club", "Hall"]);
    let hall_entry = preview.iter().find(|e| e.tenant.id_typed() == hall).unwrap();
    assert_eq!(hall_entry.amounts.amount, 2750);
    assert_eq!(hall_entry.amounts.tax, 250);

    // Hall's February invoice is withdrawn: summary falls back to January.
    services
        .lifecycle
        .delete_invoice(hall_feb.id_typed())
        .await
        .unwrap();
    assert_eq!(
        summary(&services, hall).await,
        Some(("2026-01".to_string(), InvoiceStatus::Paid))
    );
    assert_eq!(
        summary(&services, club).await,
        Some(("2026-02".to_string(), InvoiceStatus::Unbilled))
    );

    // Mark-sent for February touches Club only.
    let sent = services.batch.mark_sent_for_period(&feb).await.unwrap();
    assert_eq!((sent.eligible, sent.succeeded), (1, 1));

    // Free tenant was never billed.
    assert!(services.lifecycle.list_invoices(trial).await.unwrap().is_empty());
    assert_eq!(summary(&services, trial).await, None);

    // Everything is consistent: a sweep has nothing to do.
    let sweep = services.reconciliation.resync_all().await.unwrap();
    assert_eq!(sweep.tenants, 3);
    assert_eq!(sweep.unchanged, 3);
}

#[tokio::test]
async fn plan_removal_keeps_history_but_stops_batch_billing() {
    let services = BillingServices::in_memory(BillingConfig::default());
    let venue = register(&services, "Venue", Some(Plan::Pro)).await;

    services
        .batch
        .create_for_period(&period("2026-01"))
        .await
        .unwrap();
    services
        .tenants
        .update_profile(
            venue,
            TenantProfile {
                name: "Venue".to_string(),
                plan: None,
                billing_email: "venue@venues.test".to_string(),
            },
        )
        .await
        .unwrap();

    let report = services
        .batch
        .create_for_period(&period("2026-02"))
        .await
        .unwrap();
    assert_eq!(report.eligible, 0);
    assert_eq!(
        summary(&services, venue).await,
        Some(("2026-01".to_string(), InvoiceStatus::Unbilled))
    );
    assert_eq!(
        services.reconciliation.resync(venue).await.unwrap(),
        ReconcileOutcome::Unchanged
    );
}

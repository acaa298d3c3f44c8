//! Pure selection rules behind the `lastBilling` summary and the batch filters.
//!
//! Stores hand over the full invoice set of one tenant; these functions decide
//! which record the summary reflects and which tenants a batch pass touches.

use crate::invoice::{InvoiceRecord, InvoiceStatus};
use crate::period::BillingPeriod;
use crate::tenant::Tenant;

/// The record `lastBilling` must mirror: maximum period, ties broken by the most
/// recently created record.
pub fn latest_billing(records: &[InvoiceRecord]) -> Option<&InvoiceRecord> {
    records.iter().max_by(|a, b| a.recency_key().cmp(&b.recency_key()))
}

/// The record for `period`; with duplicates, the most recently created one.
pub fn record_for_period<'a>(
    records: &'a [InvoiceRecord],
    period: &BillingPeriod,
) -> Option<&'a InvoiceRecord> {
    records
        .iter()
        .filter(|r| r.period() == period)
        .max_by(|a, b| a.recency_key().cmp(&b.recency_key()))
}

/// Batch creation filter: billable plan and no summary for `period` yet.
pub fn eligible_for_creation(tenant: &Tenant, period: &BillingPeriod) -> bool {
    let billable = tenant.plan().is_some_and(|p| p.is_billable());
    let already_billed = tenant
        .last_billing()
        .is_some_and(|lb| &lb.period == period);
    billable && !already_billed
}

/// Batch "mark sent" filter: summary says `{period, unbilled}`.
pub fn eligible_for_mark_sent(tenant: &Tenant, period: &BillingPeriod) -> bool {
    tenant
        .last_billing()
        .is_some_and(|lb| &lb.period == period && lb.status == InvoiceStatus::Unbilled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use tenantbill_core::{InvoiceId, TenantId};

    use crate::line_item::LineItem;
    use crate::plan::{Plan, TaxRule};
    use crate::tenant::{LastBilling, TenantProfile};

    fn record(tenant_id: TenantId, period: &str, created_offset_secs: i64) -> InvoiceRecord {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        InvoiceRecord::issue(
            InvoiceId::new(),
            tenant_id,
            period.parse().unwrap(),
            vec![LineItem::new("Plan", 1000, 1)],
            TaxRule::default(),
            base + Duration::seconds(created_offset_secs),
        )
        .unwrap()
    }

    fn tenant(plan: Option<Plan>, last: Option<(&str, InvoiceStatus)>) -> Tenant {
        let mut t = Tenant::new(
            TenantId::new(),
            TenantProfile {
                name: "T".to_string(),
                plan,
                billing_email: "t@t.test".to_string(),
            },
        );
        if let Some((period, status)) = last {
            t.set_last_billing(LastBilling {
                period: period.parse().unwrap(),
                status,
                updated_at: Utc::now(),
            });
        }
        t
    }

    #[test]
    fn latest_billing_of_empty_set_is_none() {
        assert!(latest_billing(&[]).is_none());
    }

    #[test]
    fn latest_billing_picks_max_period_not_newest_record() {
        let t = TenantId::new();
        let newer_but_older_period = record(t, "2026-01", 100);
        let latest_period = record(t, "2026-02", 0);
        let records = vec![newer_but_older_period, latest_period.clone()];

        assert_eq!(latest_billing(&records), Some(&latest_period));
    }

    #[test]
    fn duplicates_resolve_to_most_recently_created() {
        let t = TenantId::new();
        let first = record(t, "2026-02", 0);
        let second = record(t, "2026-02", 60);
        let records = vec![second.clone(), first];

        let period = "2026-02".parse().unwrap();
        assert_eq!(record_for_period(&records, &period), Some(&second));
        assert_eq!(latest_billing(&records), Some(&second));
    }

    #[test]
    fn creation_filter() {
        let p: BillingPeriod = "2026-02".parse().unwrap();
        assert!(eligible_for_creation(&tenant(Some(Plan::Standard), None), &p));
        assert!(eligible_for_creation(
            &tenant(Some(Plan::Pro), Some(("2026-01", InvoiceStatus::Paid))),
            &p
        ));
        assert!(!eligible_for_creation(
            &tenant(Some(Plan::Pro), Some(("2026-02", InvoiceStatus::Unbilled))),
            &p
        ));
        assert!(!eligible_for_creation(&tenant(Some(Plan::Free), None), &p));
        assert!(!eligible_for_creation(&tenant(None, None), &p));
    }

    #[test]
    fn mark_sent_filter() {
        let p: BillingPeriod = "2026-02".parse().unwrap();
        assert!(eligible_for_mark_sent(
            &tenant(Some(Plan::Pro), Some(("2026-02", InvoiceStatus::Unbilled))),
            &p
        ));
        assert!(!eligible_for_mark_sent(
            &tenant(Some(Plan::Pro), Some(("2026-02", InvoiceStatus::Billed))),
            &p
        ));
        assert!(!eligible_for_mark_sent(
            &tenant(Some(Plan::Pro), Some(("2026-02", InvoiceStatus::Paid))),
            &p
        ));
        assert!(!eligible_for_mark_sent(
            &tenant(Some(Plan::Pro), Some(("2026-01", InvoiceStatus::Unbilled))),
            &p
        ));
        assert!(!eligible_for_mark_sent(&tenant(Some(Plan::Pro), None), &p));
    }

    proptest! {
        #[test]
        fn latest_billing_period_is_the_maximum(
            months in proptest::collection::vec((2020i32..2030, 1u32..=12), 1..30)
        ) {
            let t = TenantId::new();
            let records: Vec<InvoiceRecord> = months
                .iter()
                .enumerate()
                .map(|(i, (y, m))| record(t, BillingPeriod::new(*y, *m).unwrap().as_str(), i as i64))
                .collect();

            let latest = latest_billing(&records).unwrap();
            let max_period = records.iter().map(|r| r.period()).max().unwrap();
            prop_assert_eq!(latest.period(), max_period);
        }
    }
}

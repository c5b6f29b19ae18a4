//! Per-student balance computation for one cycle.
//!
//! Nothing here is persisted: the summary is recomputed from the calendar,
//! the price history, the payments and the allocations on every read, so two
//! reads with no intervening writes always agree.

use chrono::NaiveDate;
use shared::{
    AdvanceSummary, Concept, PaymentKind, PeriodBalance, SummaryResponse,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{BillingError, Result};
use super::pricing_service::PricingService;
use super::util::{month_start, round2};
use crate::backend::storage::{AllocationStore, CycleStore, PaymentStore};

pub const STATUS_BEHIND: &str = "Pendiente";
pub const STATUS_CURRENT: &str = "Al corriente";

#[derive(Clone)]
pub struct SummaryService {
    cycles: Arc<dyn CycleStore>,
    payments: Arc<dyn PaymentStore>,
    allocations: Arc<dyn AllocationStore>,
    pricing: PricingService,
}

impl SummaryService {
    pub fn new(
        cycles: Arc<dyn CycleStore>,
        payments: Arc<dyn PaymentStore>,
        allocations: Arc<dyn AllocationStore>,
        pricing: PricingService,
    ) -> Self {
        Self {
            cycles,
            payments,
            allocations,
            pricing,
        }
    }

    pub async fn compute_summary(
        &self,
        student_id: &str,
        cycle_label: &str,
        today: NaiveDate,
    ) -> Result<SummaryResponse> {
        let cycle = self
            .cycles
            .get_cycle(cycle_label)
            .await?
            .ok_or_else(|| BillingError::InvalidCycle(cycle_label.to_string()))?;
        let calendar = self.cycles.list_periods(cycle.id).await?;

        let tuition = self.pricing.resolve_tuition(student_id, today).await?;
        // Enrollment fees are often configured before the cycle begins, so
        // the price is resolved against the cycle's end rather than today.
        let enrollment_price = self
            .pricing
            .resolve_enrollment(student_id, cycle.end_date)
            .await?;
        let cutoff = self
            .pricing
            .billing_start(student_id, cycle.start_date)
            .await?;

        let allocations = self
            .allocations
            .list_for_student(student_id, cycle.id)
            .await?;
        let mut paid_by_period: HashMap<String, f64> = HashMap::new();
        for allocation in &allocations {
            *paid_by_period.entry(allocation.period.clone()).or_insert(0.0) += allocation.amount;
        }

        // Enrollment paid is the cycle-wide sum of enrollment-typed
        // receipts; it is never tied to a calendar row.
        let enrollment_paid = if enrollment_price > 0.0 {
            let payments = self
                .payments
                .list_payments(student_id, cycle.id, None)
                .await?;
            round2(
                payments
                    .iter()
                    .filter(|p| p.kind == PaymentKind::Enrollment)
                    .map(|p| p.amount)
                    .sum(),
            )
        } else {
            0.0
        };

        // Split the calendar at the billing-start cutoff. Enrollment rows
        // are always billed; tuition rows due before the cutoff are not,
        // but any allocations parked on them may carry forward as credit.
        let mut detail: Vec<PeriodBalance> = Vec::new();
        let mut credit = 0.0;
        for period in &calendar {
            let concept = period.concept();
            if concept == Concept::Tuition {
                let Some(due) = period.due_date else {
                    continue;
                };
                if due < cutoff {
                    let charged = round2(tuition * period.multiplier);
                    let paid = round2(paid_by_period.get(&period.label).copied().unwrap_or(0.0));
                    credit = round2(credit + (paid - charged).max(0.0));
                    continue;
                }
            }

            let (charged, paid, due_date) = match concept {
                Concept::Enrollment => (
                    round2(enrollment_price),
                    round2(enrollment_paid),
                    period.due_date.or(Some(cycle.start_date)),
                ),
                Concept::Tuition => (
                    round2(tuition * period.multiplier),
                    round2(paid_by_period.get(&period.label).copied().unwrap_or(0.0)),
                    period.due_date,
                ),
            };
            detail.push(PeriodBalance {
                period: period.label.clone(),
                kind: concept,
                multiplier: period.multiplier,
                due_date,
                charged,
                paid,
                owed: round2((charged - paid).max(0.0)),
            });
        }

        // Carry the pre-cutoff credit into the earliest underpaid tuition
        // periods, in calendar order, until it runs out.
        if credit > 0.0 {
            for row in detail.iter_mut() {
                if credit <= 0.0 {
                    break;
                }
                if row.kind != Concept::Tuition || row.owed <= 0.0 {
                    continue;
                }
                let consumed = credit.min(row.owed);
                row.owed = round2(row.owed - consumed);
                credit = round2(credit - consumed);
            }
        }

        // Only what is already due counts as debt.
        let total_owed = round2(
            detail
                .iter()
                .filter(|d| d.due_date.map_or(false, |due| due <= today))
                .map(|d| d.owed)
                .sum(),
        );
        let status = if total_owed > 0.0 {
            STATUS_BEHIND
        } else {
            STATUS_CURRENT
        };

        let advance = compute_advance(&detail, today);

        // Rows worth showing: overdue, due this month, or already touched
        // by a payment.
        let current_month = month_start(today);
        let mut visible: Vec<PeriodBalance> = detail
            .into_iter()
            .filter(|d| match d.due_date {
                Some(due) => due <= today || month_start(due) == current_month || d.paid > 0.0,
                None => false,
            })
            .collect();
        visible.sort_by_key(|d| d.due_date);

        Ok(SummaryResponse {
            status: status.to_string(),
            total_owed,
            detail: visible,
            advance,
        })
    }
}

/// Prepaid amounts on tuition periods not yet due: the covered portion of
/// each adds to the advance, and fully covered periods are counted.
fn compute_advance(detail: &[PeriodBalance], today: NaiveDate) -> AdvanceSummary {
    let mut amount = 0.0;
    let mut periods = 0;
    for row in detail {
        if row.kind != Concept::Tuition || row.paid <= 0.0 {
            continue;
        }
        let future = row.due_date.map_or(false, |due| due > today);
        if !future {
            continue;
        }
        if row.paid >= row.charged {
            periods += 1;
        }
        amount = round2(amount + row.paid.min(row.charged));
    }
    AdvanceSummary { amount, periods }
}

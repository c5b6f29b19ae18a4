//! Cross-student aggregation: debtor lists, cycle-wide debt rollups and
//! revenue series.
//!
//! Each aggregation fetches the full result sets it needs and computes in a
//! single pass. Any storage failure aborts the whole computation — a partial
//! aggregate would be misleading in a financial report.

use chrono::NaiveDate;
use shared::{
    AmountByLabel, Concept, DebtorRow, DebtorsResponse, Level, OverviewResponse, Payment,
    PaymentKind, PriceRecord, RevenueResponse,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{BillingError, Result};
use super::pricing_service::{
    billing_start_from, current_amount, PARAM_BASE_PRESCHOOL, PARAM_BASE_PRIMARY,
};
use super::util::{month_key, month_sequence, norm, round2, title_case};
use crate::backend::storage::{
    AllocationStore, CycleStore, ParamStore, PaymentStore, PriceStore, StudentStore,
};

/// Parameter listing the canonical staff receiver names, comma separated.
pub const PARAM_STAFF_RECEIVERS: &str = "staff_receivers";

/// Bucket for receipts whose receiver or method matches no known name.
const OTHER_BUCKET: &str = "Otros";

/// Label under which enrollment debt is aggregated.
const ENROLLMENT_LABEL: &str = "INS";

#[derive(Clone)]
pub struct FinanceService {
    students: Arc<dyn StudentStore>,
    prices: Arc<dyn PriceStore>,
    cycles: Arc<dyn CycleStore>,
    payments: Arc<dyn PaymentStore>,
    allocations: Arc<dyn AllocationStore>,
    params: Arc<dyn ParamStore>,
}

/// Shared result of the per-student overdue walk.
struct DebtTotals {
    overdue_labels: Vec<String>,
    calendar_order: Vec<String>,
    rows: Vec<DebtorRow>,
    total_debt: f64,
    by_level: HashMap<String, f64>,
    by_period: HashMap<String, f64>,
    students_with_debt: usize,
}

impl FinanceService {
    pub fn new(
        students: Arc<dyn StudentStore>,
        prices: Arc<dyn PriceStore>,
        cycles: Arc<dyn CycleStore>,
        payments: Arc<dyn PaymentStore>,
        allocations: Arc<dyn AllocationStore>,
        params: Arc<dyn ParamStore>,
    ) -> Self {
        Self {
            students,
            prices,
            cycles,
            payments,
            allocations,
            params,
        }
    }

    /// Students with overdue balances, largest debt first.
    pub async fn debtors(&self, cycle_label: &str, today: NaiveDate) -> Result<DebtorsResponse> {
        let totals = self.debt_totals(cycle_label, today).await?;
        Ok(DebtorsResponse {
            cutoff: today,
            overdue_periods: totals.overdue_labels,
            total: totals.rows.len(),
            debtors: totals.rows,
        })
    }

    /// Cycle-wide debt rolled up by level and by period.
    pub async fn overview(&self, cycle_label: &str, today: NaiveDate) -> Result<OverviewResponse> {
        let totals = self.debt_totals(cycle_label, today).await?;

        let mut by_level: Vec<AmountByLabel> = totals
            .by_level
            .into_iter()
            .map(|(label, amount)| AmountByLabel {
                label,
                amount: round2(amount),
            })
            .collect();
        by_level.sort_by(|a, b| a.label.cmp(&b.label));

        // Periods come out in calendar order, skipping the debt-free ones.
        let by_period: Vec<AmountByLabel> = totals
            .calendar_order
            .iter()
            .filter_map(|label| {
                totals.by_period.get(label).map(|amount| AmountByLabel {
                    label: label.clone(),
                    amount: round2(*amount),
                })
            })
            .collect();

        Ok(OverviewResponse {
            cutoff: today,
            overdue_periods: totals.overdue_labels,
            total_debt: totals.total_debt,
            students_with_debt: totals.students_with_debt,
            by_level,
            by_period,
        })
    }

    async fn debt_totals(&self, cycle_label: &str, today: NaiveDate) -> Result<DebtTotals> {
        let cycle = self
            .cycles
            .get_cycle(cycle_label)
            .await?
            .ok_or_else(|| BillingError::InvalidCycle(cycle_label.to_string()))?;
        let calendar = self.cycles.list_periods(cycle.id).await?;
        let overdue: Vec<_> = calendar
            .iter()
            .filter(|p| p.due_date.map_or(false, |due| due <= today))
            .collect();
        let has_overdue_enrollment = overdue.iter().any(|p| p.concept() == Concept::Enrollment);

        let students = self.students.list_students().await?;

        // Price histories grouped per student, keeping the store's
        // newest-first ordering.
        let mut tuition_prices: HashMap<String, Vec<PriceRecord>> = HashMap::new();
        let mut enrollment_prices: HashMap<String, Vec<PriceRecord>> = HashMap::new();
        for record in self.prices.list_all_prices().await? {
            let map = match record.concept {
                Concept::Tuition => &mut tuition_prices,
                Concept::Enrollment => &mut enrollment_prices,
            };
            map.entry(record.student_id.clone()).or_default().push(record);
        }

        let (base_preschool, base_primary) = self.level_defaults().await?;

        let mut enrollment_paid: HashMap<String, f64> = HashMap::new();
        for payment in self.payments.list_cycle_payments(cycle.id).await? {
            if payment.kind == PaymentKind::Enrollment {
                *enrollment_paid.entry(payment.student_id).or_insert(0.0) += payment.amount;
            }
        }

        // Keyed by (student, period) rather than a joined string.
        let mut paid_by_period: HashMap<(String, String), f64> = HashMap::new();
        for allocation in self.allocations.list_for_cycle(cycle.id).await? {
            *paid_by_period
                .entry((allocation.student_id, allocation.period))
                .or_insert(0.0) += allocation.amount;
        }

        let mut totals = DebtTotals {
            overdue_labels: overdue.iter().map(|p| p.label.clone()).collect(),
            calendar_order: calendar.iter().map(|p| p.label.clone()).collect(),
            rows: Vec::new(),
            total_debt: 0.0,
            by_level: HashMap::new(),
            by_period: HashMap::new(),
            students_with_debt: 0,
        };

        for student in &students {
            let tuition_records = tuition_prices
                .get(&student.id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let tuition = match current_amount(tuition_records, today) {
                Some(amount) => amount,
                None => match student.level {
                    Level::Preschool => base_preschool,
                    Level::Primary => base_primary,
                    Level::Other => 0.0,
                },
            };
            let enrollment_records = enrollment_prices
                .get(&student.id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let enrollment_price = current_amount(enrollment_records, today).unwrap_or(0.0);

            let mut effective_dates: Vec<NaiveDate> =
                tuition_records.iter().map(|r| r.effective_from).collect();
            effective_dates.sort();
            let billing_start = billing_start_from(&effective_dates, cycle.start_date);

            let mut debt = 0.0;
            let mut concepts: Vec<String> = Vec::new();

            // Enrollment is settled against the cumulative enrollment
            // receipts, not against period allocations.
            if has_overdue_enrollment && enrollment_price > 0.0 {
                let paid = enrollment_paid.get(&student.id).copied().unwrap_or(0.0);
                let owed = round2(enrollment_price - paid).max(0.0);
                if owed > 0.0 {
                    debt = round2(debt + owed);
                    concepts.push(ENROLLMENT_LABEL.to_string());
                    accumulate(&mut totals.by_level, student.level.as_str(), owed);
                    accumulate(&mut totals.by_period, ENROLLMENT_LABEL, owed);
                }
            }

            for period in &overdue {
                if period.concept() != Concept::Tuition {
                    continue;
                }
                // A student enrolled mid-cycle is not billed for earlier
                // periods.
                let due = match period.due_date {
                    Some(due) => due,
                    None => continue,
                };
                if due < billing_start {
                    continue;
                }
                let expected = tuition * period.multiplier;
                let key = (student.id.clone(), period.label.clone());
                let paid = paid_by_period.get(&key).copied().unwrap_or(0.0);
                let owed = round2(expected - paid).max(0.0);
                if owed > 0.0 {
                    debt = round2(debt + owed);
                    concepts.push(period.label.clone());
                    accumulate(&mut totals.by_level, student.level.as_str(), owed);
                    accumulate(&mut totals.by_period, &period.label, owed);
                }
            }

            if debt > 0.0 {
                totals.total_debt = round2(totals.total_debt + debt);
                totals.students_with_debt += 1;
                totals.rows.push(DebtorRow {
                    student_id: student.id.clone(),
                    full_name: student.full_name.clone(),
                    level: student.level,
                    grade: student.grade,
                    concepts: concepts.join(", "),
                    amount: round2(debt),
                });
            }
        }

        totals
            .rows
            .sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(Ordering::Equal));
        Ok(totals)
    }

    async fn level_defaults(&self) -> Result<(f64, f64)> {
        let keys = vec![
            PARAM_BASE_PRESCHOOL.to_string(),
            PARAM_BASE_PRIMARY.to_string(),
        ];
        let params = self.params.get_params(&keys).await?;
        let parse = |key: &str| {
            params
                .get(key)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        Ok((parse(PARAM_BASE_PRESCHOOL), parse(PARAM_BASE_PRIMARY)))
    }

    /// Tuition receipts of the cycle bucketed by day, month, receiver and
    /// method. Receipts dated before the cycle start are totalled apart.
    pub async fn revenue(&self, cycle_label: &str, today: NaiveDate) -> Result<RevenueResponse> {
        let cycle = self
            .cycles
            .get_cycle(cycle_label)
            .await?
            .ok_or_else(|| BillingError::InvalidCycle(cycle_label.to_string()))?;
        let payments = self.payments.list_cycle_payments(cycle.id).await?;

        let aliases: Vec<String> = self
            .params
            .get_param(PARAM_STAFF_RECEIVERS)
            .await?
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut pre_cycle_total = 0.0;
        let mut in_cycle: Vec<&Payment> = Vec::new();
        for payment in payments.iter().filter(|p| p.kind == PaymentKind::Tuition) {
            if payment.paid_on < cycle.start_date {
                pre_cycle_total = round2(pre_cycle_total + payment.amount);
            } else {
                in_cycle.push(payment);
            }
        }

        let mut in_cycle_total = 0.0;
        let mut by_day: HashMap<NaiveDate, f64> = HashMap::new();
        let mut by_month: HashMap<String, f64> = HashMap::new();
        let mut by_receiver: HashMap<String, f64> = HashMap::new();
        let mut by_method: HashMap<String, f64> = HashMap::new();

        for payment in &in_cycle {
            in_cycle_total = round2(in_cycle_total + payment.amount);

            let day = by_day.entry(payment.paid_on).or_insert(0.0);
            *day = round2(*day + payment.amount);

            accumulate(&mut by_month, &month_key(payment.paid_on), payment.amount);

            let receiver = payment
                .received_by
                .as_deref()
                .and_then(|name| aliases.iter().find(|alias| norm(alias) == norm(name)))
                .cloned()
                .unwrap_or_else(|| OTHER_BUCKET.to_string());
            accumulate(&mut by_receiver, &receiver, payment.amount);

            let method = payment
                .method
                .as_deref()
                .map(title_case)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Otro".to_string());
            accumulate(&mut by_method, &method, payment.amount);
        }

        // Contiguous month series from the cycle start through the later of
        // the last receipt and today, zero-filled.
        let last_paid = in_cycle
            .iter()
            .map(|p| p.paid_on)
            .max()
            .unwrap_or(cycle.start_date);
        let by_month: Vec<AmountByLabel> = month_sequence(cycle.start_date, last_paid.max(today))
            .into_iter()
            .map(|key| AmountByLabel {
                amount: round2(by_month.get(&key).copied().unwrap_or(0.0)),
                label: key,
            })
            .collect();

        let mut by_day: Vec<AmountByLabel> = by_day
            .into_iter()
            .map(|(date, amount)| AmountByLabel {
                label: date.to_string(),
                amount: round2(amount),
            })
            .collect();
        by_day.sort_by(|a, b| a.label.cmp(&b.label));

        Ok(RevenueResponse {
            cutoff: today,
            pre_cycle_total,
            in_cycle_total,
            by_day,
            by_month,
            by_receiver: sorted_buckets(by_receiver),
            by_method: sorted_buckets(by_method),
        })
    }
}

fn accumulate(map: &mut HashMap<String, f64>, key: &str, amount: f64) {
    let entry = map.entry(key.to_string()).or_insert(0.0);
    *entry = round2(*entry + amount);
}

/// Largest bucket first; ties resolved by name for stable output.
fn sorted_buckets(map: HashMap<String, f64>) -> Vec<AmountByLabel> {
    let mut buckets: Vec<AmountByLabel> = map
        .into_iter()
        .map(|(label, amount)| AmountByLabel {
            label,
            amount: round2(amount),
        })
        .collect();
    buckets.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::sqlite::{
        AllocationRepository, CycleRepository, DbConnection, ParamRepository, PaymentRepository,
        PriceRepository, StudentRepository,
    };
    use shared::{Allocation, Cycle, Period, Student};
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Fixture {
        service: FinanceService,
        students: Arc<dyn StudentStore>,
        prices: Arc<dyn PriceStore>,
        payments: Arc<dyn PaymentStore>,
        allocations: Arc<dyn AllocationStore>,
        params: Arc<dyn ParamStore>,
        cycle_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = DbConnection::init_test().await.unwrap();
        let students: Arc<dyn StudentStore> = Arc::new(StudentRepository::new(db.clone()));
        let prices: Arc<dyn PriceStore> = Arc::new(PriceRepository::new(db.clone()));
        let params: Arc<dyn ParamStore> = Arc::new(ParamRepository::new(db.clone()));
        let cycles: Arc<dyn CycleStore> = Arc::new(CycleRepository::new(db.clone()));
        let payments: Arc<dyn PaymentStore> = Arc::new(PaymentRepository::new(db.clone()));
        let allocations: Arc<dyn AllocationStore> = Arc::new(AllocationRepository::new(db.clone()));

        let cycle_id = cycles
            .insert_cycle(&Cycle {
                id: 0,
                label: "2024-2025".to_string(),
                start_date: d(2024, 8, 1),
                end_date: d(2025, 7, 31),
            })
            .await
            .unwrap();
        let periods = [
            ("INS", Concept::Enrollment, d(2024, 8, 1), 0),
            ("SEP", Concept::Tuition, d(2024, 9, 5), 1),
            ("OCT", Concept::Tuition, d(2024, 10, 5), 2),
        ];
        for (label, kind, due, position) in periods {
            cycles
                .insert_period(&Period {
                    cycle_id,
                    label: label.to_string(),
                    kind,
                    multiplier: 1.0,
                    due_date: Some(due),
                    position,
                })
                .await
                .unwrap();
        }

        let service = FinanceService::new(
            students.clone(),
            prices.clone(),
            cycles,
            payments.clone(),
            allocations.clone(),
            params.clone(),
        );

        Fixture {
            service,
            students,
            prices,
            payments,
            allocations,
            params,
            cycle_id,
        }
    }

    async fn seed_student(fx: &Fixture, id: &str, name: &str, level: Level, grade: i32) {
        fx.students
            .insert_student(&Student {
                id: id.to_string(),
                code: None,
                full_name: name.to_string(),
                sex: "H".to_string(),
                level,
                grade,
                status: "Activo".to_string(),
                official: false,
            })
            .await
            .unwrap();
    }

    async fn seed_price(
        fx: &Fixture,
        student_id: &str,
        concept: Concept,
        effective_from: NaiveDate,
        amount: f64,
    ) {
        fx.prices
            .insert_price(&PriceRecord {
                id: 0,
                student_id: student_id.to_string(),
                concept,
                effective_from,
                base_amount: amount,
                notes: None,
            })
            .await
            .unwrap();
    }

    async fn seed_payment(
        fx: &Fixture,
        student_id: &str,
        kind: PaymentKind,
        amount: f64,
        paid_on: NaiveDate,
        received_by: Option<&str>,
        method: Option<&str>,
    ) {
        fx.payments
            .insert_payment(&Payment {
                id: Uuid::new_v4().to_string(),
                student_id: student_id.to_string(),
                cycle_id: fx.cycle_id,
                paid_on,
                amount,
                kind,
                method: method.map(str::to_string),
                received_by: received_by.map(str::to_string),
                notes: None,
                origin: "UI".to_string(),
            })
            .await
            .unwrap();
    }

    async fn seed_allocation(fx: &Fixture, student_id: &str, period: &str, amount: f64) {
        fx.allocations
            .insert_allocations(&[Allocation {
                id: 0,
                payment_id: Uuid::new_v4().to_string(),
                student_id: student_id.to_string(),
                cycle_id: fx.cycle_id,
                period: period.to_string(),
                amount,
            }])
            .await
            .unwrap();
    }

    /// Two students: one fully billed from the cycle start, one enrolled
    /// mid-cycle whose September is out of scope.
    async fn debt_fixture() -> Fixture {
        let fx = fixture().await;
        seed_student(&fx, "s1", "Ana Pérez", Level::Preschool, 2).await;
        seed_student(&fx, "s2", "Bruno Díaz", Level::Primary, 4).await;

        seed_price(&fx, "s1", Concept::Tuition, d(2024, 8, 1), 1000.0).await;
        seed_price(&fx, "s1", Concept::Enrollment, d(2024, 8, 1), 500.0).await;
        seed_price(&fx, "s2", Concept::Tuition, d(2024, 10, 17), 1200.0).await;

        // s1 settled enrollment and September.
        seed_payment(
            &fx,
            "s1",
            PaymentKind::Enrollment,
            500.0,
            d(2024, 8, 10),
            None,
            None,
        )
        .await;
        seed_allocation(&fx, "s1", "SEP", 1000.0).await;
        fx
    }

    #[tokio::test]
    async fn debtors_filters_by_billing_start_and_sorts_by_amount() {
        let fx = debt_fixture().await;
        let response = fx.service.debtors("2024-2025", d(2024, 10, 6)).await.unwrap();

        assert_eq!(response.total, 2);
        assert_eq!(response.overdue_periods, vec!["INS", "SEP", "OCT"]);

        // s2 owes only October (1200): September is before its billing
        // start and it has no enrollment price.
        assert_eq!(response.debtors[0].student_id, "s2");
        assert_eq!(response.debtors[0].amount, 1200.0);
        assert_eq!(response.debtors[0].concepts, "OCT");

        assert_eq!(response.debtors[1].student_id, "s1");
        assert_eq!(response.debtors[1].amount, 1000.0);
        assert_eq!(response.debtors[1].concepts, "OCT");
    }

    #[tokio::test]
    async fn overview_rolls_up_by_level_and_period() {
        let fx = debt_fixture().await;
        let response = fx.service.overview("2024-2025", d(2024, 10, 6)).await.unwrap();

        assert_eq!(response.total_debt, 2200.0);
        assert_eq!(response.students_with_debt, 2);
        assert_eq!(
            response.by_level,
            vec![
                AmountByLabel {
                    label: "Preescolar".to_string(),
                    amount: 1000.0
                },
                AmountByLabel {
                    label: "Primaria".to_string(),
                    amount: 1200.0
                },
            ]
        );
        assert_eq!(
            response.by_period,
            vec![AmountByLabel {
                label: "OCT".to_string(),
                amount: 2200.0
            }]
        );
    }

    #[tokio::test]
    async fn unpaid_enrollment_counts_when_ins_is_overdue() {
        let fx = fixture().await;
        seed_student(&fx, "s1", "Ana Pérez", Level::Preschool, 2).await;
        seed_price(&fx, "s1", Concept::Tuition, d(2024, 8, 1), 1000.0).await;
        seed_price(&fx, "s1", Concept::Enrollment, d(2024, 8, 1), 500.0).await;
        seed_allocation(&fx, "s1", "SEP", 1000.0).await;
        seed_allocation(&fx, "s1", "OCT", 1000.0).await;

        let response = fx.service.debtors("2024-2025", d(2024, 10, 6)).await.unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.debtors[0].concepts, "INS");
        assert_eq!(response.debtors[0].amount, 500.0);
    }

    #[tokio::test]
    async fn students_without_prices_fall_back_to_level_base() {
        let fx = fixture().await;
        seed_student(&fx, "s1", "Caro Luna", Level::Primary, 1).await;
        fx.params
            .set_param(PARAM_BASE_PRIMARY, "950")
            .await
            .unwrap();

        let response = fx.service.debtors("2024-2025", d(2024, 9, 10)).await.unwrap();
        // SEP overdue at 950; no enrollment price means no INS debt.
        assert_eq!(response.total, 1);
        assert_eq!(response.debtors[0].amount, 950.0);
        assert_eq!(response.debtors[0].concepts, "SEP");
    }

    #[tokio::test]
    async fn revenue_partitions_and_buckets_tuition_receipts() {
        let fx = fixture().await;
        fx.params
            .set_param(PARAM_STAFF_RECEIVERS, "Laura, Miguel")
            .await
            .unwrap();

        // Pre-cycle receipt stays out of the series.
        seed_payment(
            &fx,
            "s1",
            PaymentKind::Tuition,
            1000.0,
            d(2024, 7, 20),
            Some("Laura"),
            Some("efectivo"),
        )
        .await;
        seed_payment(
            &fx,
            "s1",
            PaymentKind::Tuition,
            1000.0,
            d(2024, 9, 1),
            Some("Laura"),
            Some("efectivo"),
        )
        .await;
        seed_payment(
            &fx,
            "s1",
            PaymentKind::Tuition,
            400.0,
            d(2024, 9, 15),
            Some("  laura"),
            Some("EFECTIVO"),
        )
        .await;
        seed_payment(
            &fx,
            "s2",
            PaymentKind::Tuition,
            200.0,
            d(2024, 10, 2),
            Some("Pedro"),
            Some("transferencia"),
        )
        .await;
        // Enrollment receipts never enter the tuition series.
        seed_payment(
            &fx,
            "s1",
            PaymentKind::Enrollment,
            500.0,
            d(2024, 9, 3),
            Some("Laura"),
            None,
        )
        .await;

        let response = fx.service.revenue("2024-2025", d(2024, 10, 6)).await.unwrap();

        assert_eq!(response.pre_cycle_total, 1000.0);
        assert_eq!(response.in_cycle_total, 1600.0);

        let months: Vec<(&str, f64)> = response
            .by_month
            .iter()
            .map(|m| (m.label.as_str(), m.amount))
            .collect();
        assert_eq!(
            months,
            vec![("2024-08", 0.0), ("2024-09", 1400.0), ("2024-10", 200.0)]
        );

        assert_eq!(response.by_day.len(), 3);
        assert_eq!(response.by_day[0].label, "2024-09-01");

        assert_eq!(
            response.by_receiver,
            vec![
                AmountByLabel {
                    label: "Laura".to_string(),
                    amount: 1400.0
                },
                AmountByLabel {
                    label: "Otros".to_string(),
                    amount: 200.0
                },
            ]
        );
        assert_eq!(
            response.by_method,
            vec![
                AmountByLabel {
                    label: "Efectivo".to_string(),
                    amount: 1400.0
                },
                AmountByLabel {
                    label: "Transferencia".to_string(),
                    amount: 200.0
                },
            ]
        );
    }

    #[tokio::test]
    async fn aggregations_reject_unknown_cycles() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service.debtors("1999-2000", d(2024, 10, 6)).await,
            Err(BillingError::InvalidCycle(_))
        ));
        assert!(matches!(
            fx.service.revenue("1999-2000", d(2024, 10, 6)).await,
            Err(BillingError::InvalidCycle(_))
        ));
    }
}

//! Payment registration and allocation.
//!
//! A receipt is validated in full before anything is written. The write
//! sequence is payment row first, then its allocation rows; there is no
//! cross-table transaction in the store contract, so a failed allocation
//! insert is compensated by deleting the just-created payment. If the
//! compensating delete itself fails the orphaned payment is logged and the
//! original error surfaced — no further rollback is attempted.

use chrono::NaiveDate;
use shared::{
    Allocation, AllocationHistoryEntry, AllocationMode, Concept, Cycle, ManualSplit, Payment,
    PaymentHistoryEntry, PaymentKind, Period, RegisterPaymentRequest, RegisterPaymentResponse,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{BillingError, Result};
use super::pricing_service::PricingService;
use super::util::{parse_payment_kind, round2};
use crate::backend::storage::{AllocationStore, CycleStore, PaymentStore};

#[derive(Clone)]
pub struct PaymentService {
    cycles: Arc<dyn CycleStore>,
    payments: Arc<dyn PaymentStore>,
    allocations: Arc<dyn AllocationStore>,
    pricing: PricingService,
}

impl PaymentService {
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

    /// Register a receipt and distribute it across calendar periods.
    ///
    /// `today` is the reference date for FIFO price resolution.
    pub async fn register_payment(
        &self,
        request: RegisterPaymentRequest,
        today: NaiveDate,
    ) -> Result<RegisterPaymentResponse> {
        let amount = request.amount;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(BillingError::InvalidAmount(amount));
        }
        let paid_on = parse_paid_on(&request.paid_on)?;
        let cycle = self
            .cycles
            .get_cycle(&request.cycle)
            .await?
            .ok_or_else(|| BillingError::InvalidCycle(request.cycle.clone()))?;
        let calendar = self.cycles.list_periods(cycle.id).await?;

        let kind = request
            .kind
            .as_deref()
            .map(parse_payment_kind)
            .unwrap_or(PaymentKind::Other);

        // Enrollment receipts are tracked by payment type alone; everything
        // else gets its allocation plan decided before any write.
        let planned = if kind == PaymentKind::Enrollment {
            Vec::new()
        } else {
            match request.mode {
                AllocationMode::Manual => plan_manual(&request, &calendar, amount)?,
                AllocationMode::Fifo => {
                    self.plan_fifo(&request.student_id, &cycle, &calendar, amount, today)
                        .await?
                }
            }
        };

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            student_id: request.student_id.clone(),
            cycle_id: cycle.id,
            paid_on,
            amount,
            kind,
            method: request.method.clone(),
            received_by: request.received_by.clone(),
            notes: request.notes.clone(),
            origin: request.origin.clone().unwrap_or_else(|| "UI".to_string()),
        };
        self.payments.insert_payment(&payment).await?;
        info!(
            "registered payment {} for student {} ({} {:.2})",
            payment.id,
            payment.student_id,
            payment.kind.as_str(),
            amount
        );

        if !planned.is_empty() {
            let rows: Vec<Allocation> = planned
                .iter()
                .map(|split| Allocation {
                    id: 0,
                    payment_id: payment.id.clone(),
                    student_id: request.student_id.clone(),
                    cycle_id: cycle.id,
                    period: split.period.clone(),
                    amount: split.amount,
                })
                .collect();

            if let Err(err) = self.allocations.insert_allocations(&rows).await {
                warn!(
                    "allocation insert failed for payment {}, rolling back",
                    payment.id
                );
                if let Err(delete_err) = self.payments.delete_payment(&payment.id).await {
                    error!(
                        "compensating delete of payment {} failed, orphaned payment left behind: {delete_err:#}",
                        payment.id
                    );
                }
                return Err(BillingError::Storage(err));
            }
        }

        Ok(RegisterPaymentResponse {
            payment_id: payment.id,
            allocations: planned,
        })
    }

    /// FIFO plan: walk tuition periods in calendar order and fill each
    /// period's outstanding balance until the amount runs out. A remainder
    /// that fits nowhere stays unallocated.
    async fn plan_fifo(
        &self,
        student_id: &str,
        cycle: &Cycle,
        calendar: &[Period],
        total: f64,
        today: NaiveDate,
    ) -> Result<Vec<ManualSplit>> {
        let tuition = self.pricing.resolve_tuition(student_id, today).await?;
        let prior = self.allocations.list_for_student(student_id, cycle.id).await?;

        let mut paid: HashMap<String, f64> = HashMap::new();
        for allocation in &prior {
            *paid.entry(allocation.period.clone()).or_insert(0.0) += allocation.amount;
        }

        let mut remaining = total;
        let mut plan = Vec::new();
        for period in calendar {
            if remaining <= 0.0 {
                break;
            }
            if period.concept() != Concept::Tuition {
                continue;
            }
            let charged = tuition * period.multiplier;
            let already = paid.get(&period.label).copied().unwrap_or(0.0);
            let outstanding = round2(charged - already).max(0.0);
            if outstanding <= 0.0 {
                continue;
            }
            let apply = round2(remaining.min(outstanding));
            plan.push(ManualSplit {
                period: period.label.clone(),
                amount: apply,
            });
            remaining = round2(remaining - apply);
        }
        Ok(plan)
    }

    /// Payments of one student in one cycle, newest first (capped at 200).
    pub async fn payment_history(
        &self,
        student_id: &str,
        cycle_label: &str,
    ) -> Result<Vec<PaymentHistoryEntry>> {
        let cycle = self
            .cycles
            .get_cycle(cycle_label)
            .await?
            .ok_or_else(|| BillingError::InvalidCycle(cycle_label.to_string()))?;
        let payments = self
            .payments
            .list_payments(student_id, cycle.id, Some(200))
            .await?;
        Ok(payments
            .into_iter()
            .map(|p| PaymentHistoryEntry {
                paid_on: p.paid_on,
                amount: p.amount,
                kind: p.kind,
                method: p.method,
                received_by: p.received_by,
                notes: p.notes,
            })
            .collect())
    }

    /// Allocation rows with their payment's date and method, newest first.
    pub async fn allocation_history(
        &self,
        student_id: &str,
        cycle_label: &str,
    ) -> Result<Vec<AllocationHistoryEntry>> {
        let cycle = self
            .cycles
            .get_cycle(cycle_label)
            .await?
            .ok_or_else(|| BillingError::InvalidCycle(cycle_label.to_string()))?;
        Ok(self.allocations.list_history(student_id, cycle.id).await?)
    }
}

/// Manual plan: either the whole amount on one period, or an itemized list
/// whose cleaned entries must sum to the declared total.
fn plan_manual(
    request: &RegisterPaymentRequest,
    calendar: &[Period],
    total: f64,
) -> Result<Vec<ManualSplit>> {
    let known: HashSet<&str> = calendar.iter().map(|p| p.label.as_str()).collect();

    if let Some(period) = &request.single_period {
        if !known.contains(period.as_str()) {
            return Err(BillingError::InvalidPeriod(period.clone()));
        }
        return Ok(vec![ManualSplit {
            period: period.clone(),
            amount: total,
        }]);
    }

    let cleaned: Vec<ManualSplit> = request
        .splits
        .iter()
        .filter(|s| s.amount > 0.0 && !s.period.is_empty())
        .cloned()
        .collect();
    for split in &cleaned {
        if !known.contains(split.period.as_str()) {
            return Err(BillingError::InvalidPeriod(split.period.clone()));
        }
    }
    let allocated: f64 = cleaned.iter().map(|s| s.amount).sum();
    if round2(allocated) != round2(total) {
        return Err(BillingError::AmountMismatch {
            declared: round2(total),
            allocated: round2(allocated),
        });
    }
    Ok(cleaned)
}

/// Accepts `YYYY-MM-DD`, tolerating a trailing time component.
fn parse_paid_on(raw: &str) -> Result<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|_| BillingError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::domain::pricing_service::PricingService;
    use crate::backend::storage::sqlite::{
        AllocationRepository, CycleRepository, DbConnection, ParamRepository, PaymentRepository,
        PriceRepository, StudentRepository,
    };
    use crate::backend::storage::{
        AllocationStore, CycleStore, ParamStore, PaymentStore, PriceStore, StudentStore,
    };
    use anyhow::anyhow;
    use async_trait::async_trait;
    use shared::PriceRecord;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Fixture {
        service: PaymentService,
        payments: Arc<dyn PaymentStore>,
        allocations: Arc<dyn AllocationStore>,
        cycles: Arc<dyn CycleStore>,
        prices: Arc<dyn PriceStore>,
        db: DbConnection,
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
            .insert_cycle(&shared::Cycle {
                id: 0,
                label: "2024-2025".to_string(),
                start_date: d(2024, 8, 1),
                end_date: d(2025, 7, 31),
            })
            .await
            .unwrap();
        seed_calendar(&cycles, cycle_id).await;

        prices
            .insert_price(&PriceRecord {
                id: 0,
                student_id: "s1".to_string(),
                concept: Concept::Tuition,
                effective_from: d(2024, 8, 1),
                base_amount: 1000.0,
                notes: None,
            })
            .await
            .unwrap();

        let pricing = PricingService::new(prices.clone(), students, params);
        let service = PaymentService::new(
            cycles.clone(),
            payments.clone(),
            allocations.clone(),
            pricing,
        );

        Fixture {
            service,
            payments,
            allocations,
            cycles,
            prices,
            db,
            cycle_id,
        }
    }

    async fn seed_calendar(cycles: &Arc<dyn CycleStore>, cycle_id: i64) {
        let periods = [
            ("INS", Concept::Enrollment, Some(d(2024, 8, 1)), 0),
            ("SEP", Concept::Tuition, Some(d(2024, 9, 5)), 1),
            ("OCT", Concept::Tuition, Some(d(2024, 10, 5)), 2),
        ];
        for (label, kind, due_date, position) in periods {
            cycles
                .insert_period(&Period {
                    cycle_id,
                    label: label.to_string(),
                    kind,
                    multiplier: 1.0,
                    due_date,
                    position,
                })
                .await
                .unwrap();
        }
    }

    fn request(amount: f64) -> RegisterPaymentRequest {
        RegisterPaymentRequest {
            student_id: "s1".to_string(),
            cycle: "2024-2025".to_string(),
            paid_on: "2024-09-01".to_string(),
            amount,
            kind: Some("Colegiatura".to_string()),
            method: Some("Efectivo".to_string()),
            received_by: None,
            notes: None,
            origin: None,
            mode: AllocationMode::Fifo,
            single_period: None,
            splits: Vec::new(),
        }
    }

    #[tokio::test]
    async fn fifo_fills_earliest_period_first() {
        let fx = fixture().await;
        let response = fx
            .service
            .register_payment(request(1500.0), d(2024, 9, 1))
            .await
            .unwrap();

        assert_eq!(response.allocations.len(), 2);
        assert_eq!(response.allocations[0].period, "SEP");
        assert_eq!(response.allocations[0].amount, 1000.0);
        assert_eq!(response.allocations[1].period, "OCT");
        assert_eq!(response.allocations[1].amount, 500.0);

        let total: f64 = response.allocations.iter().map(|a| a.amount).sum();
        assert!((total - 1500.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn fifo_skips_periods_already_covered() {
        let fx = fixture().await;
        fx.service
            .register_payment(request(1000.0), d(2024, 9, 1))
            .await
            .unwrap();

        let response = fx
            .service
            .register_payment(request(400.0), d(2024, 9, 15))
            .await
            .unwrap();
        assert_eq!(response.allocations.len(), 1);
        assert_eq!(response.allocations[0].period, "OCT");
        assert_eq!(response.allocations[0].amount, 400.0);
    }

    #[tokio::test]
    async fn fifo_leaves_overflow_unallocated() {
        let fx = fixture().await;
        let response = fx
            .service
            .register_payment(request(2500.0), d(2024, 9, 1))
            .await
            .unwrap();

        let total: f64 = response.allocations.iter().map(|a| a.amount).sum();
        assert_eq!(total, 2000.0);
    }

    #[tokio::test]
    async fn enrollment_payment_produces_no_allocations() {
        let fx = fixture().await;
        let mut req = request(500.0);
        req.kind = Some("Inscripción".to_string());
        let response = fx
            .service
            .register_payment(req, d(2024, 8, 10))
            .await
            .unwrap();

        assert!(response.allocations.is_empty());
        let stored = fx.allocations.list_for_student("s1", fx.cycle_id).await.unwrap();
        assert!(stored.is_empty());
        let payments = fx
            .payments
            .list_payments("s1", fx.cycle_id, None)
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
    }

    #[tokio::test]
    async fn manual_single_period_takes_whole_amount() {
        let fx = fixture().await;
        let mut req = request(600.0);
        req.mode = AllocationMode::Manual;
        req.single_period = Some("OCT".to_string());
        let response = fx
            .service
            .register_payment(req, d(2024, 9, 1))
            .await
            .unwrap();
        assert_eq!(response.allocations.len(), 1);
        assert_eq!(response.allocations[0].period, "OCT");
        assert_eq!(response.allocations[0].amount, 600.0);
    }

    #[tokio::test]
    async fn manual_itemized_splits_persist() {
        let fx = fixture().await;
        let mut req = request(1000.0);
        req.mode = AllocationMode::Manual;
        req.splits = vec![
            ManualSplit {
                period: "SEP".to_string(),
                amount: 600.0,
            },
            ManualSplit {
                period: "OCT".to_string(),
                amount: 400.0,
            },
        ];
        let response = fx
            .service
            .register_payment(req, d(2024, 9, 1))
            .await
            .unwrap();
        assert_eq!(response.allocations.len(), 2);

        let stored = fx.allocations.list_for_student("s1", fx.cycle_id).await.unwrap();
        let mut amounts: Vec<f64> = stored.iter().map(|a| a.amount).collect();
        amounts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(amounts, vec![400.0, 600.0]);
    }

    #[tokio::test]
    async fn manual_mismatched_sum_persists_nothing() {
        let fx = fixture().await;
        let mut req = request(1000.0);
        req.mode = AllocationMode::Manual;
        req.splits = vec![
            ManualSplit {
                period: "SEP".to_string(),
                amount: 600.0,
            },
            ManualSplit {
                period: "OCT".to_string(),
                amount: 300.0,
            },
        ];
        let err = fx
            .service
            .register_payment(req, d(2024, 9, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::AmountMismatch { .. }));

        let payments = fx
            .payments
            .list_payments("s1", fx.cycle_id, None)
            .await
            .unwrap();
        assert!(payments.is_empty());
    }

    #[tokio::test]
    async fn manual_unknown_period_is_rejected() {
        let fx = fixture().await;
        let mut req = request(500.0);
        req.mode = AllocationMode::Manual;
        req.single_period = Some("DIC".to_string());
        let err = fx
            .service
            .register_payment(req, d(2024, 9, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidPeriod(p) if p == "DIC"));
    }

    #[tokio::test]
    async fn validation_rejects_bad_amount_date_and_cycle() {
        let fx = fixture().await;

        let mut req = request(0.0);
        req.amount = 0.0;
        assert!(matches!(
            fx.service.register_payment(req, d(2024, 9, 1)).await,
            Err(BillingError::InvalidAmount(_))
        ));

        let mut req = request(100.0);
        req.paid_on = "01/09/2024".to_string();
        assert!(matches!(
            fx.service.register_payment(req, d(2024, 9, 1)).await,
            Err(BillingError::InvalidDate(_))
        ));

        let mut req = request(100.0);
        req.cycle = "1999-2000".to_string();
        assert!(matches!(
            fx.service.register_payment(req, d(2024, 9, 1)).await,
            Err(BillingError::InvalidCycle(_))
        ));

        let payments = fx
            .payments
            .list_payments("s1", fx.cycle_id, None)
            .await
            .unwrap();
        assert!(payments.is_empty());
    }

    /// Allocation store that accepts reads but refuses every insert.
    struct FailingAllocationStore;

    #[async_trait]
    impl AllocationStore for FailingAllocationStore {
        async fn insert_allocations(&self, _rows: &[Allocation]) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }

        async fn list_for_student(
            &self,
            _student_id: &str,
            _cycle_id: i64,
        ) -> anyhow::Result<Vec<Allocation>> {
            Ok(Vec::new())
        }

        async fn list_for_cycle(&self, _cycle_id: i64) -> anyhow::Result<Vec<Allocation>> {
            Ok(Vec::new())
        }

        async fn list_history(
            &self,
            _student_id: &str,
            _cycle_id: i64,
        ) -> anyhow::Result<Vec<AllocationHistoryEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_allocation_insert_rolls_back_the_payment() {
        let fx = fixture().await;
        let students: Arc<dyn StudentStore> =
            Arc::new(StudentRepository::new(fx.db.clone()));
        let params: Arc<dyn ParamStore> = Arc::new(ParamRepository::new(fx.db.clone()));
        let pricing = PricingService::new(fx.prices.clone(), students, params);
        let service = PaymentService::new(
            fx.cycles.clone(),
            fx.payments.clone(),
            Arc::new(FailingAllocationStore),
            pricing,
        );

        let err = service
            .register_payment(request(1000.0), d(2024, 9, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));

        let payments = fx
            .payments
            .list_payments("s1", fx.cycle_id, None)
            .await
            .unwrap();
        assert!(payments.is_empty());
    }
}

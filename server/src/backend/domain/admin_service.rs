//! Administrative writes: roster records, price history entries, cycle
//! calendars, guardian links and parameters.
//!
//! Thin glue over the stores. The only rules enforced here are the ones the
//! billing math depends on: price records are append-only and positive, and
//! histories never dangle from a missing student.

use shared::{
    AddPriceRequest, CreateCycleRequest, CreateStudentRequest, Cycle, Period, PriceRecord, Student,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::error::{BillingError, Result};
use crate::backend::storage::{
    CycleStore, GuardianStore, ParamStore, PriceStore, StudentStore,
};

#[derive(Clone)]
pub struct AdminService {
    students: Arc<dyn StudentStore>,
    prices: Arc<dyn PriceStore>,
    cycles: Arc<dyn CycleStore>,
    guardians: Arc<dyn GuardianStore>,
    params: Arc<dyn ParamStore>,
}

impl AdminService {
    pub fn new(
        students: Arc<dyn StudentStore>,
        prices: Arc<dyn PriceStore>,
        cycles: Arc<dyn CycleStore>,
        guardians: Arc<dyn GuardianStore>,
        params: Arc<dyn ParamStore>,
    ) -> Self {
        Self {
            students,
            prices,
            cycles,
            guardians,
            params,
        }
    }

    pub async fn create_student(&self, request: CreateStudentRequest) -> Result<Student> {
        let student = Student {
            id: Uuid::new_v4().to_string(),
            code: request.code,
            full_name: request.full_name,
            sex: request.sex.unwrap_or_else(|| "H".to_string()),
            level: request.level,
            grade: request.grade,
            status: request.status.unwrap_or_else(|| "Activo".to_string()),
            official: request.official,
        };
        self.students.insert_student(&student).await?;
        info!("created student {} ({})", student.id, student.full_name);
        Ok(student)
    }

    /// Append a price record for the student.
    pub async fn add_price(
        &self,
        student_id: &str,
        request: AddPriceRequest,
    ) -> Result<PriceRecord> {
        if !request.base_amount.is_finite() || request.base_amount <= 0.0 {
            return Err(BillingError::InvalidAmount(request.base_amount));
        }
        self.require_student(student_id).await?;

        let record = PriceRecord {
            id: 0,
            student_id: student_id.to_string(),
            concept: request.concept,
            effective_from: request.effective_from,
            base_amount: request.base_amount,
            notes: request.notes,
        };
        self.prices.insert_price(&record).await?;
        info!(
            "appended {} price {:.2} for student {} effective {}",
            record.concept, record.base_amount, student_id, record.effective_from
        );
        Ok(record)
    }

    /// Create a cycle together with its calendar, in the order given.
    pub async fn create_cycle(&self, request: CreateCycleRequest) -> Result<Cycle> {
        let cycle = Cycle {
            id: 0,
            label: request.label,
            start_date: request.start_date,
            end_date: request.end_date,
        };
        let id = self.cycles.insert_cycle(&cycle).await?;
        for (position, period) in request.periods.iter().enumerate() {
            self.cycles
                .insert_period(&Period {
                    cycle_id: id,
                    label: period.label.clone(),
                    kind: period.kind,
                    multiplier: period.multiplier.unwrap_or(1.0),
                    due_date: period.due_date,
                    position: position as i32,
                })
                .await?;
        }
        info!(
            "created cycle {} with {} periods",
            cycle.label,
            request.periods.len()
        );
        Ok(Cycle { id, ..cycle })
    }

    pub async fn link_guardian(&self, student_id: &str, guardian_id: &str) -> Result<()> {
        self.require_student(student_id).await?;
        self.guardians.link(guardian_id, student_id).await?;
        Ok(())
    }

    pub async fn set_param(&self, key: &str, value: &str) -> Result<()> {
        self.params.set_param(key, value).await?;
        Ok(())
    }

    async fn require_student(&self, student_id: &str) -> Result<()> {
        self.students
            .get_student(student_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| BillingError::NotFound(format!("student {student_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::sqlite::{
        CycleRepository, DbConnection, GuardianRepository, ParamRepository, PriceRepository,
        StudentRepository,
    };
    use chrono::NaiveDate;
    use shared::{Concept, CreatePeriodRequest, Level};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn service() -> (AdminService, Arc<dyn CycleStore>, Arc<dyn PriceStore>) {
        let db = DbConnection::init_test().await.unwrap();
        let students: Arc<dyn StudentStore> = Arc::new(StudentRepository::new(db.clone()));
        let prices: Arc<dyn PriceStore> = Arc::new(PriceRepository::new(db.clone()));
        let cycles: Arc<dyn CycleStore> = Arc::new(CycleRepository::new(db.clone()));
        let guardians: Arc<dyn GuardianStore> = Arc::new(GuardianRepository::new(db.clone()));
        let params: Arc<dyn ParamStore> = Arc::new(ParamRepository::new(db));
        (
            AdminService::new(students, prices.clone(), cycles.clone(), guardians, params),
            cycles,
            prices,
        )
    }

    fn student_request() -> CreateStudentRequest {
        CreateStudentRequest {
            code: Some("A-001".to_string()),
            full_name: "Ana Pérez".to_string(),
            sex: None,
            level: Level::Primary,
            grade: 3,
            status: None,
            official: true,
        }
    }

    #[tokio::test]
    async fn create_student_fills_defaults() {
        let (service, _cycles, _prices) = service().await;
        let student = service.create_student(student_request()).await.unwrap();
        assert_eq!(student.sex, "H");
        assert_eq!(student.status, "Activo");
        assert!(!student.id.is_empty());
    }

    #[tokio::test]
    async fn price_records_require_an_existing_student() {
        let (service, _cycles, _prices) = service().await;
        let request = AddPriceRequest {
            concept: Concept::Tuition,
            effective_from: d(2024, 8, 1),
            base_amount: 1000.0,
            notes: None,
        };
        let err = service.add_price("missing", request).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn price_records_require_a_positive_amount() {
        let (service, _cycles, prices) = service().await;
        let student = service.create_student(student_request()).await.unwrap();

        let request = AddPriceRequest {
            concept: Concept::Tuition,
            effective_from: d(2024, 8, 1),
            base_amount: 0.0,
            notes: None,
        };
        let err = service
            .add_price(&student.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));

        let stored = prices.list_prices(&student.id, None).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn create_cycle_preserves_calendar_order() {
        let (service, cycles, _prices) = service().await;
        let cycle = service
            .create_cycle(CreateCycleRequest {
                label: "2024-2025".to_string(),
                start_date: d(2024, 8, 1),
                end_date: d(2025, 7, 31),
                periods: vec![
                    CreatePeriodRequest {
                        label: "INS".to_string(),
                        kind: Concept::Enrollment,
                        multiplier: None,
                        due_date: Some(d(2024, 8, 1)),
                    },
                    CreatePeriodRequest {
                        label: "SEP".to_string(),
                        kind: Concept::Tuition,
                        multiplier: None,
                        due_date: Some(d(2024, 9, 5)),
                    },
                ],
            })
            .await
            .unwrap();

        let periods = cycles.list_periods(cycle.id).await.unwrap();
        let labels: Vec<&str> = periods.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["INS", "SEP"]);
        assert_eq!(periods[1].multiplier, 1.0);
    }
}

//! Price resolution and billing-start logic.
//!
//! Tuition and enrollment prices are versioned per student: the record
//! current as of a reference date is the latest one whose `effective_from`
//! is not in the future. A student whose whole history is still in the
//! future resolves to the oldest record on file — a configured price that
//! has not reached its effective date beats reporting zero. Only when no
//! record exists at all does the level base parameter apply (tuition only;
//! enrollment has no base).

use chrono::NaiveDate;
use shared::{Concept, Level, PriceRecord};
use std::sync::Arc;

use super::error::Result;
use super::util::{month_start, round2};
use crate::backend::storage::{ParamStore, PriceStore, StudentStore};

/// Parameter keys for the level base tuitions.
pub const PARAM_BASE_PRESCHOOL: &str = "colegiatura_base_pre";
pub const PARAM_BASE_PRIMARY: &str = "colegiatura_base_pri";

/// Amount of the record current as of `as_of`.
///
/// `records` must be sorted by `effective_from` descending (store order).
/// Returns `None` only for an empty history.
pub fn current_amount(records: &[PriceRecord], as_of: NaiveDate) -> Option<f64> {
    records
        .iter()
        .find(|r| r.effective_from <= as_of)
        .or_else(|| records.last())
        .map(|r| r.base_amount)
}

/// Billing-start rule over the ascending `effective_from` dates of a
/// student's tuition records: the earliest date at or after the cycle start
/// wins, else the earliest date overall, else the cycle start itself;
/// truncated to the first of its month.
pub fn billing_start_from(dates_asc: &[NaiveDate], cycle_start: NaiveDate) -> NaiveDate {
    let candidate = dates_asc
        .iter()
        .copied()
        .find(|d| *d >= cycle_start)
        .or_else(|| dates_asc.first().copied())
        .unwrap_or(cycle_start);
    month_start(candidate)
}

#[derive(Clone)]
pub struct PricingService {
    prices: Arc<dyn PriceStore>,
    students: Arc<dyn StudentStore>,
    params: Arc<dyn ParamStore>,
}

impl PricingService {
    pub fn new(
        prices: Arc<dyn PriceStore>,
        students: Arc<dyn StudentStore>,
        params: Arc<dyn ParamStore>,
    ) -> Self {
        Self {
            prices,
            students,
            params,
        }
    }

    /// Tuition amount for the student as of `as_of`.
    pub async fn resolve_tuition(&self, student_id: &str, as_of: NaiveDate) -> Result<f64> {
        let records = self
            .prices
            .list_prices(student_id, Some(Concept::Tuition))
            .await?;
        if let Some(amount) = current_amount(&records, as_of) {
            return Ok(round2(amount));
        }
        self.level_default(student_id).await
    }

    /// Enrollment price as of `as_of`; an empty history resolves to zero.
    pub async fn resolve_enrollment(&self, student_id: &str, as_of: NaiveDate) -> Result<f64> {
        let records = self
            .prices
            .list_prices(student_id, Some(Concept::Enrollment))
            .await?;
        Ok(round2(current_amount(&records, as_of).unwrap_or(0.0)))
    }

    /// First month from which the student is billable within a cycle
    /// starting at `cycle_start`.
    pub async fn billing_start(&self, student_id: &str, cycle_start: NaiveDate) -> Result<NaiveDate> {
        let records = self
            .prices
            .list_prices(student_id, Some(Concept::Tuition))
            .await?;
        let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.effective_from).collect();
        dates.sort();
        Ok(billing_start_from(&dates, cycle_start))
    }

    /// Base tuition for the student's level from the parameter table.
    pub async fn level_default(&self, student_id: &str) -> Result<f64> {
        let student = self.students.get_student(student_id).await?;
        let key = match student.map(|s| s.level) {
            Some(Level::Preschool) => PARAM_BASE_PRESCHOOL,
            Some(Level::Primary) => PARAM_BASE_PRIMARY,
            _ => return Ok(0.0),
        };
        let raw = self.params.get_param(key).await?;
        Ok(round2(
            raw.and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0),
        ))
    }
}

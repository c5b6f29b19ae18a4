//! Store traits that keep the domain layer independent of the concrete
//! relational backend.
//!
//! Every method is a single request/response round trip; the domain layer
//! assumes no ordering between concurrent calls beyond what the store itself
//! serializes. Implementations must be cheap to clone behind an `Arc`.

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    Allocation, AllocationHistoryEntry, Concept, Cycle, Payment, Period, PriceRecord, Student,
};
use std::collections::HashMap;

/// Student directory.
#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn insert_student(&self, student: &Student) -> Result<()>;

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>>;

    /// All students ordered by level, grade, name.
    async fn list_students(&self) -> Result<Vec<Student>>;
}

/// Time-versioned price histories.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Append a record; price history is never mutated in place.
    async fn insert_price(&self, record: &PriceRecord) -> Result<()>;

    /// Records of one student, newest `effective_from` first, optionally
    /// restricted to a concept.
    async fn list_prices(
        &self,
        student_id: &str,
        concept: Option<Concept>,
    ) -> Result<Vec<PriceRecord>>;

    /// Every record on file, newest first; used by the cross-student
    /// aggregation pass.
    async fn list_all_prices(&self) -> Result<Vec<PriceRecord>>;
}

/// Cycles and their billing calendars.
#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn insert_cycle(&self, cycle: &Cycle) -> Result<i64>;

    async fn get_cycle(&self, label: &str) -> Result<Option<Cycle>>;

    async fn insert_period(&self, period: &Period) -> Result<()>;

    /// Calendar of a cycle in display order.
    async fn list_periods(&self, cycle_id: i64) -> Result<Vec<Period>>;
}

/// Cash receipts.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    /// Compensating delete for a payment whose allocations failed to insert.
    async fn delete_payment(&self, payment_id: &str) -> Result<()>;

    /// Payments of one student in one cycle, newest first.
    async fn list_payments(
        &self,
        student_id: &str,
        cycle_id: i64,
        limit: Option<u32>,
    ) -> Result<Vec<Payment>>;

    /// Every payment of a cycle; the aggregation engine partitions in memory.
    async fn list_cycle_payments(&self, cycle_id: i64) -> Result<Vec<Payment>>;
}

/// Payment-to-period applications.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Insert every row or fail as a whole; the caller compensates on
    /// failure.
    async fn insert_allocations(&self, rows: &[Allocation]) -> Result<()>;

    async fn list_for_student(&self, student_id: &str, cycle_id: i64) -> Result<Vec<Allocation>>;

    async fn list_for_cycle(&self, cycle_id: i64) -> Result<Vec<Allocation>>;

    /// Allocations joined with their payment's date and method, newest
    /// payment first.
    async fn list_history(
        &self,
        student_id: &str,
        cycle_id: i64,
    ) -> Result<Vec<AllocationHistoryEntry>>;
}

/// System parameters (level base tuitions, current cycle, staff aliases).
#[async_trait]
pub trait ParamStore: Send + Sync {
    async fn set_param(&self, key: &str, value: &str) -> Result<()>;

    async fn get_param(&self, key: &str) -> Result<Option<String>>;

    /// All parameters, restricted to `keys` when non-empty.
    async fn get_params(&self, keys: &[String]) -> Result<HashMap<String, String>>;
}

/// Guardian-to-student links consulted by the authorization gate.
#[async_trait]
pub trait GuardianStore: Send + Sync {
    async fn link(&self, guardian_id: &str, student_id: &str) -> Result<()>;

    async fn is_linked(&self, guardian_id: &str, student_id: &str) -> Result<bool>;
}

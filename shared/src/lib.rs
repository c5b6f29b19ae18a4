//! Shared data types for the tuition billing backend.
//!
//! Everything the REST layer and the domain services exchange lives here as
//! plain serde structs: the persisted entities (students, price records,
//! cycles, calendar periods, payments, allocations) and the request/response
//! shapes consumed by the staff dashboard and the parent portal.
//!
//! Monetary values are `f64` rounded to cents by the domain layer at every
//! aggregation step; calendar dates are day-precision [`NaiveDate`]s, matching
//! the DATE columns of the store. Data values (level names, concept labels,
//! period labels such as `SEP` / `INS`) keep the Spanish vocabulary of the
//! school's database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// School level a student is enrolled in.
///
/// The store keeps the Spanish labels; anything unrecognized folds to
/// `Other`, which carries no base tuition parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Level {
    #[serde(rename = "Preescolar")]
    Preschool,
    #[serde(rename = "Primaria")]
    Primary,
    #[serde(rename = "Otro")]
    Other,
}

impl From<String> for Level {
    fn from(raw: String) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("preescolar") {
            Level::Preschool
        } else if raw.eq_ignore_ascii_case("primaria") {
            Level::Primary
        } else {
            Level::Other
        }
    }
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Preschool => "Preescolar",
            Level::Primary => "Primaria",
            Level::Other => "Otro",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of charge a price record or calendar period refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concept {
    #[serde(rename = "Colegiatura")]
    Tuition,
    #[serde(rename = "Inscripción")]
    Enrollment,
}

impl Concept {
    pub fn as_str(&self) -> &'static str {
        match self {
            Concept::Tuition => "Colegiatura",
            Concept::Enrollment => "Inscripción",
        }
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a cash receipt. Enrollment payments are tracked against
/// the enrollment price alone and never produce period allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum PaymentKind {
    #[serde(rename = "Colegiatura")]
    Tuition,
    #[serde(rename = "Inscripción")]
    Enrollment,
    #[serde(rename = "Otro")]
    Other,
}

impl From<String> for PaymentKind {
    fn from(raw: String) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("colegiatura") {
            PaymentKind::Tuition
        } else if raw.eq_ignore_ascii_case("inscripción") || raw.eq_ignore_ascii_case("inscripcion")
        {
            PaymentKind::Enrollment
        } else {
            PaymentKind::Other
        }
    }
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Tuition => "Colegiatura",
            PaymentKind::Enrollment => "Inscripción",
            PaymentKind::Other => "Otro",
        }
    }
}

/// How a payment is distributed across calendar periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationMode {
    /// Earliest outstanding period first (the default).
    #[default]
    #[serde(rename = "fifo")]
    Fifo,
    /// Caller-specified split, either a single period or an itemized list.
    #[serde(rename = "manual")]
    Manual,
}

/// A student record.
///
/// Students are deactivated through `status`, never hard-deleted, so payment
/// history always has an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    /// Short school-assigned code shown on receipts.
    pub code: Option<String>,
    pub full_name: String,
    /// `H` or `M`, as captured on the enrollment form.
    pub sex: String,
    pub level: Level,
    pub grade: i32,
    pub status: String,
    /// Whether the student is registered with the education authority.
    pub official: bool,
}

/// One entry of a student's time-versioned price history.
///
/// Records are append-only: a price change inserts a new row with a later
/// `effective_from` instead of mutating history, so past statements stay
/// reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: i64,
    pub student_id: String,
    pub concept: Concept,
    pub effective_from: NaiveDate,
    pub base_amount: f64,
    pub notes: Option<String>,
}

/// A school cycle (year or term) owning an ordered billing calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: i64,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One billable entry in a cycle's calendar: a tuition month (possibly a
/// multiple of the base tuition) or the enrollment charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub cycle_id: i64,
    pub label: String,
    pub kind: Concept,
    pub multiplier: f64,
    pub due_date: Option<NaiveDate>,
    /// Display order; listings are sorted by this column.
    pub position: i32,
}

impl Period {
    /// Effective concept of the period. The sentinel `INS` label marks the
    /// enrollment charge even if the row's kind column disagrees.
    pub fn concept(&self) -> Concept {
        if self.label.eq_ignore_ascii_case("INS") {
            Concept::Enrollment
        } else {
            self.kind
        }
    }
}

/// A cash receipt. Immutable once created; the only delete path is the
/// compensating rollback after a failed allocation insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub student_id: String,
    pub cycle_id: i64,
    pub paid_on: NaiveDate,
    pub amount: f64,
    pub kind: PaymentKind,
    pub method: Option<String>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
    /// Where the receipt was captured (`UI`, `import`, ...).
    pub origin: String,
}

/// The portion of a payment applied to one calendar period. The rows of a
/// payment always sum to its total amount. `id` is store-assigned and
/// ignored on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: i64,
    pub payment_id: String,
    pub student_id: String,
    pub cycle_id: i64,
    pub period: String,
    pub amount: f64,
}

/// Role attached to a request by the session layer upstream of this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallerRole {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "SUBADMIN")]
    Subadmin,
    #[serde(rename = "CAJA")]
    Cashier,
    #[serde(rename = "PARENT")]
    Guardian,
}

impl CallerRole {
    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            CallerRole::Admin | CallerRole::Subadmin | CallerRole::Cashier
        )
    }
}

/// The authenticated identity behind a request. Session mechanics live
/// outside this backend; handlers only see the already-resolved role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caller {
    pub role: CallerRole,
    /// Present for guardian callers; used for the student-link check.
    pub guardian_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStudentRequest {
    pub code: Option<String>,
    pub full_name: String,
    /// Defaults to `H` when absent.
    #[serde(default)]
    pub sex: Option<String>,
    pub level: Level,
    pub grade: i32,
    /// Defaults to `Activo`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub official: bool,
}

/// Appends a record to a student's price history; history is never edited
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPriceRequest {
    pub concept: Concept,
    pub effective_from: NaiveDate,
    pub base_amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePeriodRequest {
    pub label: String,
    pub kind: Concept,
    /// Defaults to 1.
    #[serde(default)]
    pub multiplier: Option<f64>,
    pub due_date: Option<NaiveDate>,
}

/// A cycle with its calendar, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCycleRequest {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub periods: Vec<CreatePeriodRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkGuardianRequest {
    pub guardian_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetParamRequest {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Payment registration
// ---------------------------------------------------------------------------

/// Payload for registering a cash receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPaymentRequest {
    pub student_id: String,
    /// Cycle label, e.g. `2024-2025`.
    pub cycle: String,
    /// Payment date as `YYYY-MM-DD`.
    pub paid_on: String,
    pub amount: f64,
    /// Raw payment type as typed at the register (`Colegiatura`,
    /// `Inscripción`, ...); normalized by the domain layer.
    pub kind: Option<String>,
    pub method: Option<String>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub mode: AllocationMode,
    /// Manual mode: apply the whole amount to this one period.
    #[serde(default)]
    pub single_period: Option<String>,
    /// Manual mode: itemized splits; must sum to `amount`.
    #[serde(default)]
    pub splits: Vec<ManualSplit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualSplit {
    pub period: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPaymentResponse {
    pub payment_id: String,
    pub allocations: Vec<ManualSplit>,
}

// ---------------------------------------------------------------------------
// Balance summary
// ---------------------------------------------------------------------------

/// Balance of one calendar period as shown to a guardian or the cashier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBalance {
    pub period: String,
    pub kind: Concept,
    pub multiplier: f64,
    pub due_date: Option<NaiveDate>,
    pub charged: f64,
    pub paid: f64,
    pub owed: f64,
}

/// Credit already applied to tuition periods that are not yet due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceSummary {
    pub amount: f64,
    /// Number of future periods fully covered.
    pub periods: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// `"Pendiente"` when anything overdue is unpaid, `"Al corriente"`
    /// otherwise.
    pub status: String,
    pub total_owed: f64,
    /// Periods that are overdue, due this month, or carry a payment.
    pub detail: Vec<PeriodBalance>,
    pub advance: AdvanceSummary,
}

// ---------------------------------------------------------------------------
// Histories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub paid_on: NaiveDate,
    pub amount: f64,
    pub kind: PaymentKind,
    pub method: Option<String>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
}

/// One allocation row joined with its payment's date and method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationHistoryEntry {
    pub period: String,
    pub amount: f64,
    pub paid_on: NaiveDate,
    pub method: Option<String>,
}

// ---------------------------------------------------------------------------
// Finance reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtorRow {
    pub student_id: String,
    pub full_name: String,
    pub level: Level,
    pub grade: i32,
    /// Comma-joined labels of the concepts in debt (`INS, SEP, OCT`).
    pub concepts: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtorsResponse {
    pub cutoff: NaiveDate,
    pub overdue_periods: Vec<String>,
    pub total: usize,
    pub debtors: Vec<DebtorRow>,
}

/// Generic labelled amount used by the rollup series (periods, levels,
/// days, months, receivers, methods).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountByLabel {
    pub label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewResponse {
    pub cutoff: NaiveDate,
    pub overdue_periods: Vec<String>,
    pub total_debt: f64,
    pub students_with_debt: usize,
    pub by_level: Vec<AmountByLabel>,
    /// Calendar order; only periods that actually carry debt.
    pub by_period: Vec<AmountByLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueResponse {
    pub cutoff: NaiveDate,
    /// Tuition receipts dated before the cycle start, kept out of the
    /// monthly series.
    pub pre_cycle_total: f64,
    pub in_cycle_total: f64,
    pub by_day: Vec<AmountByLabel>,
    /// Contiguous `YYYY-MM` series from the cycle start, zero-filled.
    pub by_month: Vec<AmountByLabel>,
    pub by_receiver: Vec<AmountByLabel>,
    pub by_method: Vec<AmountByLabel>,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRow {
    pub student_id: String,
    pub code: Option<String>,
    pub full_name: String,
    pub sex: String,
    pub level: Level,
    pub grade: i32,
    pub status: String,
    pub official: bool,
    /// Tuition amount currently resolved for the student.
    pub current_tuition: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSummary {
    pub boys: u32,
    pub girls: u32,
    pub boys_official: u32,
    pub girls_official: u32,
    /// Sum of currently resolved tuitions across the roster.
    pub current_income_total: f64,
    pub income_average: f64,
    /// Headcount times the level base tuition.
    pub base_income_expected: f64,
    pub base_income_delta: f64,
    pub base_preschool: f64,
    pub base_primary: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SexCount {
    pub boys: u32,
    pub girls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeCensus {
    pub boys: u32,
    pub girls: u32,
    pub total: u32,
    pub boys_official: u32,
    pub girls_official: u32,
    pub total_official: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelCensus {
    /// Keyed by grade; the fixed grade range of the level is always present
    /// even when empty.
    pub grades: BTreeMap<u32, GradeCensus>,
    pub total: SexCount,
    pub total_official: SexCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterResponse {
    pub students: Vec<RosterRow>,
    pub summary: RosterSummary,
    pub preschool: LevelCensus,
    pub primary: LevelCensus,
}

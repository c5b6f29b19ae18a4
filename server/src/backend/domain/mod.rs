//! Business logic of the tuition billing backend.
//!
//! Everything with billing semantics lives in this module, independent of
//! HTTP and of the concrete store:
//!
//! - **pricing_service**: time-versioned price resolution and the per-student
//!   billing start within a cycle
//! - **payment_service**: payment registration with FIFO or manual
//!   allocation and the compensating rollback
//! - **summary_service**: per-student, per-cycle balance computation
//! - **finance_service**: cross-student debt and revenue rollups
//! - **roster_service**: roster listing with resolved tuitions and census
//! - **admin_service**: record administration (students, prices, calendars)
//! - **authz**: the allow/deny gate consulted before per-student reads
//! - **util**: normalization, rounding and date helpers shared by the above
//!
//! Derived figures (per-period balances, debt totals, revenue series) are
//! never persisted; every read recomputes them from the stored entities.

pub mod admin_service;
pub mod authz;
pub mod error;
pub mod finance_service;
pub mod payment_service;
pub mod pricing_service;
pub mod roster_service;
pub mod summary_service;
pub mod util;

pub use admin_service::AdminService;
pub use authz::{GuardianLinkAccess, StudentAccess};
pub use error::BillingError;
pub use finance_service::FinanceService;
pub use payment_service::PaymentService;
pub use pricing_service::PricingService;
pub use roster_service::RosterService;
pub use summary_service::SummaryService;

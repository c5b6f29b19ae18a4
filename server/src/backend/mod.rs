//! Backend of the tuition billing system.
//!
//! Layered architecture:
//!
//! ```text
//! IO Layer (REST handlers)
//!     ↓
//! Domain Layer (billing services)
//!     ↓
//! Storage Layer (store traits + SQLite)
//! ```
//!
//! This module wires the layers together: it builds the repositories over
//! one shared connection, hands them to the domain services, and assembles
//! the axum router the binary serves. Requests are handled statelessly; the
//! only shared state is the connection pool inside the repositories.

pub mod domain;
pub mod io;
pub mod storage;

use anyhow::Result;
use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use domain::{
    AdminService, FinanceService, GuardianLinkAccess, PaymentService, PricingService,
    RosterService, StudentAccess, SummaryService,
};
use storage::sqlite::{
    AllocationRepository, CycleRepository, GuardianRepository, ParamRepository, PaymentRepository,
    PriceRepository, StudentRepository,
};
use storage::{
    AllocationStore, CycleStore, DbConnection, GuardianStore, ParamStore, PaymentStore, PriceStore,
    StudentStore,
};

/// All services a handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub payment_service: PaymentService,
    pub summary_service: SummaryService,
    pub finance_service: FinanceService,
    pub roster_service: RosterService,
    pub admin_service: AdminService,
    pub params: Arc<dyn ParamStore>,
    pub access: Arc<dyn StudentAccess>,
}

/// Open the production database and build the application state.
pub async fn initialize_backend() -> Result<AppState> {
    info!("setting up database");
    let db = DbConnection::init().await?;

    info!("setting up domain services");
    Ok(build_state(db))
}

/// Wire repositories and services over an existing connection.
pub fn build_state(db: DbConnection) -> AppState {
    let students: Arc<dyn StudentStore> = Arc::new(StudentRepository::new(db.clone()));
    let prices: Arc<dyn PriceStore> = Arc::new(PriceRepository::new(db.clone()));
    let cycles: Arc<dyn CycleStore> = Arc::new(CycleRepository::new(db.clone()));
    let payments: Arc<dyn PaymentStore> = Arc::new(PaymentRepository::new(db.clone()));
    let allocations: Arc<dyn AllocationStore> = Arc::new(AllocationRepository::new(db.clone()));
    let params: Arc<dyn ParamStore> = Arc::new(ParamRepository::new(db.clone()));
    let guardians: Arc<dyn GuardianStore> = Arc::new(GuardianRepository::new(db));

    let pricing = PricingService::new(prices.clone(), students.clone(), params.clone());
    let payment_service = PaymentService::new(
        cycles.clone(),
        payments.clone(),
        allocations.clone(),
        pricing.clone(),
    );
    let summary_service = SummaryService::new(
        cycles.clone(),
        payments.clone(),
        allocations.clone(),
        pricing,
    );
    let finance_service = FinanceService::new(
        students.clone(),
        prices.clone(),
        cycles.clone(),
        payments,
        allocations,
        params.clone(),
    );
    let roster_service = RosterService::new(students.clone(), prices.clone(), params.clone());
    let admin_service = AdminService::new(students, prices, cycles, guardians.clone(), params.clone());
    let access: Arc<dyn StudentAccess> = Arc::new(GuardianLinkAccess::new(guardians));

    AppState {
        payment_service,
        summary_service,
        finance_service,
        roster_service,
        admin_service,
        params,
        access,
    }
}

/// Assemble the axum router with all routes configured.
pub fn create_router(app_state: AppState) -> Router {
    // The dashboards are served from a separate origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/payments", post(io::register_payment))
        .route("/payments/summary", get(io::payment_summary))
        .route("/payments/history", get(io::payment_history))
        .route("/payments/allocations", get(io::allocation_history))
        .route("/finance/debtors", get(io::finance_debtors))
        .route("/finance/overview", get(io::finance_overview))
        .route("/finance/revenue", get(io::finance_revenue))
        .route("/students", get(io::list_students).post(io::create_student))
        .route("/students/:student_id", get(io::get_student))
        .route("/students/:student_id/prices", post(io::add_price))
        .route("/students/:student_id/guardians", post(io::link_guardian))
        .route("/cycles", post(io::create_cycle))
        .route("/params", get(io::get_params).post(io::set_param));

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(app_state)
}

//! One repository per entity, each implementing its store trait over the
//! shared [`DbConnection`](super::connection::DbConnection).

pub mod allocation_repository;
pub mod cycle_repository;
pub mod guardian_repository;
pub mod param_repository;
pub mod payment_repository;
pub mod price_repository;
pub mod student_repository;

pub use allocation_repository::AllocationRepository;
pub use cycle_repository::CycleRepository;
pub use guardian_repository::GuardianRepository;
pub use param_repository::ParamRepository;
pub use payment_repository::PaymentRepository;
pub use price_repository::PriceRepository;
pub use student_repository::StudentRepository;

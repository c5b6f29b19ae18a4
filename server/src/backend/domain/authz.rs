//! Authorization gate for per-student reads.
//!
//! The billing services treat this as an opaque allow/deny collaborator:
//! staff roles always pass, guardians pass only when linked to the target
//! student. Who the caller is was already decided upstream.

use async_trait::async_trait;
use shared::{Caller, CallerRole};
use std::sync::Arc;

use super::error::Result;
use crate::backend::storage::GuardianStore;

#[async_trait]
pub trait StudentAccess: Send + Sync {
    async fn can_view(&self, caller: &Caller, student_id: &str) -> Result<bool>;
}

/// Gate backed by the guardian-to-student link table.
pub struct GuardianLinkAccess {
    guardians: Arc<dyn GuardianStore>,
}

impl GuardianLinkAccess {
    pub fn new(guardians: Arc<dyn GuardianStore>) -> Self {
        Self { guardians }
    }
}

#[async_trait]
impl StudentAccess for GuardianLinkAccess {
    async fn can_view(&self, caller: &Caller, student_id: &str) -> Result<bool> {
        if caller.role.is_staff() {
            return Ok(true);
        }
        match (caller.role, caller.guardian_id.as_deref()) {
            (CallerRole::Guardian, Some(guardian_id)) => {
                Ok(self.guardians.is_linked(guardian_id, student_id).await?)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::sqlite::{DbConnection, GuardianRepository};

    async fn gate() -> (GuardianLinkAccess, Arc<dyn GuardianStore>) {
        let db = DbConnection::init_test().await.unwrap();
        let guardians: Arc<dyn GuardianStore> = Arc::new(GuardianRepository::new(db));
        (GuardianLinkAccess::new(guardians.clone()), guardians)
    }

    #[tokio::test]
    async fn staff_can_view_any_student() {
        let (gate, _guardians) = gate().await;
        let caller = Caller {
            role: CallerRole::Cashier,
            guardian_id: None,
        };
        assert!(gate.can_view(&caller, "s1").await.unwrap());
    }

    #[tokio::test]
    async fn guardian_needs_a_link_to_the_student() {
        let (gate, guardians) = gate().await;
        guardians.link("g1", "s1").await.unwrap();

        let linked = Caller {
            role: CallerRole::Guardian,
            guardian_id: Some("g1".to_string()),
        };
        assert!(gate.can_view(&linked, "s1").await.unwrap());
        assert!(!gate.can_view(&linked, "s2").await.unwrap());

        let anonymous = Caller {
            role: CallerRole::Guardian,
            guardian_id: None,
        };
        assert!(!gate.can_view(&anonymous, "s1").await.unwrap());
    }
}

//! Skill catalog: the read-mostly collection of published offerings.
//!
//! The engine only needs `(skill_id, provider_id, default_capacity)` from a
//! skill; editing and presentation belong to the surrounding application.
//! Retirement is guarded: a skill cannot disappear from under a live
//! booking or session.

use crate::error::EngineError;
use crate::types::{Capacity, DeliveryMode, Skill, SkillId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Published skill offerings, keyed by id.
#[derive(Debug, Default)]
pub struct SkillCatalog {
    inner: RwLock<HashMap<SkillId, Skill>>,
}

impl SkillCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new offering for `provider`.
    pub async fn publish(
        &self,
        provider: UserId,
        default_capacity: Option<Capacity>,
        mode: DeliveryMode,
    ) -> SkillId {
        let skill = Skill {
            id: SkillId::new(),
            provider_id: provider,
            default_capacity,
            mode,
        };
        let id = skill.id;
        self.inner.write().await.insert(id, skill);
        tracing::info!(skill = %id, %provider, "skill published");
        id
    }

    /// Looks up one skill.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SkillNotFound`] for unknown ids.
    pub async fn get(&self, id: SkillId) -> Result<Skill, EngineError> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::SkillNotFound(id))
    }

    /// Removes an offering. The caller has already verified no non-terminal
    /// booking or session references it.
    ///
    /// # Errors
    ///
    /// [`EngineError::SkillNotFound`] for unknown ids;
    /// [`EngineError::NotAuthorized`] unless `by` owns the offering.
    pub async fn retire(&self, id: SkillId, by: UserId) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        let skill = inner.get(&id).ok_or(EngineError::SkillNotFound(id))?;
        if skill.provider_id != by {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "retire this skill",
            });
        }
        inner.remove(&id);
        tracing::info!(skill = %id, "skill retired");
        Ok(())
    }
}

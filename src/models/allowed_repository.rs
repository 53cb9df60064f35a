use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// An allow-list entry gating which repositories may trigger
/// environment creation. Push events are intentionally not filtered
/// by this list; they only touch environments that were created
/// through an allowed pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedRepository {
    pub id: Uuid,
    pub url: String,
    /// Audit field recording who granted access.
    pub allowed_by: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct NewAllowedRepository {
    pub url: String,
    pub allowed_by: String,
}

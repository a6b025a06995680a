use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

/// Reference row for a user owned by the identity service.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
}

use crate::db::models::User;

use sqlx::{Error, PgExecutor};
use uuid::Uuid;

pub struct UserRepository;

impl UserRepository {
    pub async fn get_user_by_id<'e>(
        executor: impl PgExecutor<'e>,
        user_id: Uuid,
    ) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, organization_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}

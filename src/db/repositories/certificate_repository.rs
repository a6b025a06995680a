use crate::db::models::{Certificate, NewCertificate};

use sqlx::{Error, PgExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

const CERTIFICATE_COLUMNS: &str = "c.id, c.certificate_code, c.participant_id, c.session_id, \
     c.training_standard_id, c.issue_date, c.expiry_date, c.revoked_at, c.revocation_reason, c.created_at";

pub struct CertificateRepository;

impl CertificateRepository {
    /// Inserts unless the code is taken or the pair already holds an
    /// unrevoked certificate; `None` in either case.
    pub async fn insert_if_absent<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewCertificate,
    ) -> Result<Option<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            r#"
            INSERT INTO certificates AS c
                (certificate_code, participant_id, session_id, training_standard_id, issue_date, expiry_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        ))
        .bind(&input.certificate_code)
        .bind(input.participant_id)
        .bind(input.session_id)
        .bind(input.training_standard_id)
        .bind(input.issue_date)
        .bind(input.expiry_date)
        .fetch_optional(executor)
        .await
    }

    pub async fn get_certificate_by_id<'e>(
        executor: impl PgExecutor<'e>,
        certificate_id: Uuid,
    ) -> Result<Option<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates c WHERE c.id = $1"
        ))
        .bind(certificate_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn get_certificate_by_code<'e>(
        executor: impl PgExecutor<'e>,
        code: &str,
    ) -> Result<Option<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates c WHERE c.certificate_code = $1"
        ))
        .bind(code)
        .fetch_optional(executor)
        .await
    }

    pub async fn get_active_certificate<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates c \
             WHERE c.session_id = $1 AND c.participant_id = $2 AND c.revoked_at IS NULL"
        ))
        .bind(session_id)
        .bind(participant_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_by_session<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
    ) -> Result<Vec<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates c \
             WHERE c.session_id = $1 ORDER BY c.participant_id, c.created_at"
        ))
        .bind(session_id)
        .fetch_all(executor)
        .await
    }

    pub async fn list_by_participant<'e>(
        executor: impl PgExecutor<'e>,
        participant_id: Uuid,
    ) -> Result<Vec<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates c \
             WHERE c.participant_id = $1 ORDER BY c.expiry_date DESC"
        ))
        .bind(participant_id)
        .fetch_all(executor)
        .await
    }

    /// Certificates held by members of the organization, soonest expiry first.
    pub async fn list_by_organization<'e>(
        executor: impl PgExecutor<'e>,
        organization_id: Uuid,
    ) -> Result<Vec<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            r#"
            SELECT {CERTIFICATE_COLUMNS}
            FROM certificates c
            JOIN users u ON u.id = c.participant_id
            WHERE u.organization_id = $1
            ORDER BY c.expiry_date, c.id
            "#
        ))
        .bind(organization_id)
        .fetch_all(executor)
        .await
    }

    pub async fn revoke<'e>(
        executor: impl PgExecutor<'e>,
        certificate_id: Uuid,
        reason: &str,
        revoked_at: OffsetDateTime,
    ) -> Result<Option<Certificate>, Error> {
        sqlx::query_as::<_, Certificate>(&format!(
            r#"
            UPDATE certificates AS c
            SET revoked_at = $3, revocation_reason = $2
            WHERE c.id = $1 AND c.revoked_at IS NULL
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        ))
        .bind(certificate_id)
        .bind(reason)
        .bind(revoked_at)
        .fetch_optional(executor)
        .await
    }
}

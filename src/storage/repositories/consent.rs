//! Consent ledger repository
//!
//! One versioned row per owner. The version starts at 1 and increases only
//! when the flag value actually changes.

use crate::domain::{ConsentActor, ConsentFlag, OwnerId};
use crate::errors::{CredvaultError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct ConsentRow {
    pub owner_id: String,
    pub allow_team_fallback: bool,
    pub version: i64,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConsentRow> for ConsentFlag {
    type Error = CredvaultError;

    fn try_from(row: ConsentRow) -> Result<Self> {
        let updated_by = ConsentActor::parse(&row.updated_by).ok_or_else(|| {
            CredvaultError::internal(format!("Unknown consent actor '{}'", row.updated_by))
        })?;

        Ok(ConsentFlag {
            owner_id: OwnerId::from_string(row.owner_id),
            allow_team_fallback: row.allow_team_fallback,
            version: row.version,
            updated_by,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConsentRepository {
    pool: DbPool,
}

impl ConsentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the default row for a new owner. Existing rows are untouched.
    ///
    /// Returns true if a row was created.
    #[instrument(skip(self), name = "db_ensure_consent")]
    pub async fn ensure_default(&self, owner_id: &OwnerId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO consent_flags (owner_id, allow_team_fallback, version, updated_by, updated_at) \
             VALUES ($1, $2, 1, $3, $4) ON CONFLICT (owner_id) DO NOTHING",
        )
        .bind(owner_id)
        .bind(ConsentFlag::DEFAULT_ALLOW_TEAM_FALLBACK)
        .bind(ConsentActor::System.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to create default consent"))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), name = "db_find_consent")]
    pub async fn find(&self, owner_id: &OwnerId) -> Result<Option<ConsentFlag>> {
        let row = sqlx::query_as::<_, ConsentRow>(
            "SELECT owner_id, allow_team_fallback, version, updated_by, updated_at FROM consent_flags WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to load consent"))?;

        row.map(ConsentFlag::try_from).transpose()
    }

    /// Current flag, materializing the default row if the owner has none
    pub async fn get_or_default(&self, owner_id: &OwnerId) -> Result<ConsentFlag> {
        if let Some(flag) = self.find(owner_id).await? {
            return Ok(flag);
        }

        self.ensure_default(owner_id).await?;
        self.find(owner_id)
            .await?
            .ok_or_else(|| CredvaultError::internal("Consent row vanished after creation"))
    }

    /// Record a consent decision.
    ///
    /// A value equal to the current one leaves the row (and its version)
    /// unchanged.
    #[instrument(skip(self), fields(actor = actor.as_str()), name = "db_set_consent")]
    pub async fn set(
        &self,
        owner_id: &OwnerId,
        allow_team_fallback: bool,
        actor: ConsentActor,
    ) -> Result<ConsentFlag> {
        let updated = sqlx::query_as::<_, ConsentRow>(
            "INSERT INTO consent_flags (owner_id, allow_team_fallback, version, updated_by, updated_at) \
             VALUES ($1, $2, 1, $3, $4) \
             ON CONFLICT (owner_id) DO UPDATE SET \
                allow_team_fallback = excluded.allow_team_fallback, \
                version = consent_flags.version + 1, \
                updated_by = excluded.updated_by, \
                updated_at = excluded.updated_at \
             WHERE consent_flags.allow_team_fallback <> excluded.allow_team_fallback \
             RETURNING owner_id, allow_team_fallback, version, updated_by, updated_at",
        )
        .bind(owner_id)
        .bind(allow_team_fallback)
        .bind(actor.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to set consent");
            CredvaultError::database(e, "Failed to set consent")
        })?;

        match updated {
            Some(row) => ConsentFlag::try_from(row),
            None => self
                .find(owner_id)
                .await?
                .ok_or_else(|| CredvaultError::internal("Consent row missing after no-op update")),
        }
    }
}

use crate::store::{ConfigStore, StoreError, validate_for_store};
use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::Row as _;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_tools::McpServerConfig;

const MIGRATION_V1: &str = include_str!("../migrations/20260101000000_mcp_configs.sql");

/// Postgres-backed [`ConfigStore`] (table `mcp_configs`).
#[derive(Debug, Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and make sure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or the schema cannot be applied.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to Postgres")?;
        apply_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Apply the `-- migrate:up` section of the bundled dbmate migration.
///
/// Statements are idempotent (`if not exists`), so this is safe on every start.
///
/// # Errors
///
/// Returns an error if the migration file is malformed or a statement fails.
pub async fn apply_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let up = extract_dbmate_up(MIGRATION_V1)?;
    for stmt in up.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt)
            .execute(pool)
            .await
            .with_context(|| format!("execute migration statement: {stmt}"))?;
    }
    Ok(())
}

fn extract_dbmate_up(sql: &str) -> anyhow::Result<&str> {
    let (_, rest) = sql
        .split_once("-- migrate:up")
        .context("missing dbmate marker: -- migrate:up")?;
    let (up, _) = rest
        .split_once("-- migrate:down")
        .context("missing dbmate marker: -- migrate:down")?;
    Ok(up.trim())
}

fn map_sqlx_error(e: sqlx::Error, name: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            name: name.to_string(),
        },
        sqlx::Error::Database(db) if db.is_check_violation() => {
            StoreError::Invalid(db.message().to_string())
        }
        _ => StoreError::Unavailable(e.to_string()),
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn create(
        &self,
        ctx: &CancellationToken,
        config: &McpServerConfig,
    ) -> Result<(), StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        validate_for_store(config)?;

        // Cancellation only ever drops an uncommitted transaction; once the insert succeeded the
        // commit runs to completion, so `Ok` and "row exists" always agree.
        let mut tx = tokio::select! {
            () = ctx.cancelled() => return Err(StoreError::Cancelled),
            res = self.pool.begin() => res.map_err(|e| map_sqlx_error(e, &config.name))?,
        };

        let insert = sqlx::query(
            r"
insert into mcp_configs (name, tenant, prefix, config)
values ($1, $2, $3, $4)
",
        )
        .bind(&config.name)
        .bind(&config.tenant)
        .bind(&config.prefix)
        .bind(Json(config))
        .execute(&mut *tx);

        tokio::select! {
            () = ctx.cancelled() => return Err(StoreError::Cancelled),
            res = insert => res.map_err(|e| map_sqlx_error(e, &config.name))?,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(e, &config.name))
    }

    async fn get(&self, name: &str) -> Result<Option<McpServerConfig>, StoreError> {
        let row = sqlx::query("select config from mcp_configs where name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, name))?;

        row.map(|r| {
            r.try_get::<Json<McpServerConfig>, _>("config")
                .map(|Json(cfg)| cfg)
                .map_err(|e| StoreError::Unavailable(format!("decode config '{name}': {e}")))
        })
        .transpose()
    }

    async fn list(&self) -> Result<Vec<McpServerConfig>, StoreError> {
        let rows = sqlx::query("select name, config from mcp_configs order by name asc")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get("name")
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            match row.try_get::<Json<McpServerConfig>, _>("config") {
                Ok(Json(cfg)) => out.push(cfg),
                Err(e) => {
                    tracing::warn!(server_name = %name, error = %e, "undecodable config in db; skipping");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_the_up_section() {
        let up = extract_dbmate_up(MIGRATION_V1).unwrap();
        assert!(up.contains("create table if not exists mcp_configs"));
        assert!(!up.contains("drop table"));
    }

    #[test]
    fn missing_markers_are_reported() {
        assert!(extract_dbmate_up("create table x ();").is_err());
        assert!(extract_dbmate_up("-- migrate:up\ncreate table x ();").is_err());
    }
}

use crate::notifier::{BroadcastNotifier, ConfigUpdate, NotifyError, UpdateNotifier};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::Row as _;
use sqlx::{PgConnection, PgPool};
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_tools::McpServerConfig;

const UPDATES_CHANNEL: &str = "unrelated_openapi_import_updates_v1";

/// Cross-node [`UpdateNotifier`]: records each update in `mcp_config_events`, then fans it out
/// with `pg_notify`. Every node runs [`Self::start_listener`] to relay remote events into its
/// local [`BroadcastNotifier`].
#[derive(Clone)]
pub struct PgUpdateNotifier {
    pool: PgPool,
    node_id: String,
    local: BroadcastNotifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    origin: String,
    #[serde(flatten)]
    update: ConfigUpdate,
}

impl PgUpdateNotifier {
    #[must_use]
    pub fn new(pool: PgPool, node_id: String, local: BroadcastNotifier) -> Self {
        Self {
            pool,
            node_id,
            local,
        }
    }

    #[must_use]
    pub fn local(&self) -> &BroadcastNotifier {
        &self.local
    }

    /// Relay events published by other nodes into the local broadcast until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener connection or `LISTEN` fails.
    pub async fn start_listener(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .context("connect PgListener")?;
        listener
            .listen(UPDATES_CHANNEL)
            .await
            .with_context(|| format!("LISTEN {UPDATES_CHANNEL}"))?;

        let node_id = self.node_id.clone();
        let local = self.local.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::info!("pg fanout listener shutting down");
                        break;
                    }
                    res = listener.recv() => {
                        let notification = match res {
                            Ok(n) => n,
                            Err(e) => {
                                tracing::warn!(error = %e, "pg fanout recv error");
                                // Exit rather than spin on a broken connection.
                                break;
                            }
                        };

                        let payload = notification.payload();
                        let msg: WireEvent = match serde_json::from_str(payload) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!(error = %e, payload = %payload, "invalid pg fanout payload");
                                continue;
                            }
                        };

                        if msg.origin == node_id {
                            continue;
                        }

                        tracing::debug!(server_name = %msg.update.name, origin = %msg.origin, "relaying remote config update");
                        local.publish(msg.update);
                    }
                }
            }
        });

        Ok(())
    }

    async fn persist(
        &self,
        conn: &mut PgConnection,
        config: &McpServerConfig,
    ) -> anyhow::Result<ConfigUpdate> {
        let config_hash = config.content_hash().context("hash config")?;

        let row = sqlx::query(
            r"
insert into mcp_config_events (name, config_hash)
values ($1, $2)
returning id
",
        )
        .bind(&config.name)
        .bind(&config_hash)
        .fetch_one(&mut *conn)
        .await
        .context("insert config event")?;

        let id: i64 = row.try_get("id")?;
        let event_id: u64 = id
            .try_into()
            .map_err(|_| anyhow::anyhow!("config event id overflow"))?;

        Ok(ConfigUpdate {
            name: config.name.clone(),
            tenant: config.tenant.clone(),
            prefix: config.prefix.clone(),
            config_hash,
            event_id,
        })
    }

    /// Queue the notification on `conn`; inside a transaction it is only delivered on commit.
    async fn publish(&self, conn: &mut PgConnection, update: &ConfigUpdate) -> anyhow::Result<()> {
        let wire = WireEvent {
            origin: self.node_id.clone(),
            update: update.clone(),
        };
        let payload = serde_json::to_string(&wire).context("encode pg fanout payload")?;
        sqlx::query("select pg_notify($1, $2)")
            .bind(UPDATES_CHANNEL)
            .bind(payload)
            .execute(&mut *conn)
            .await
            .context("pg_notify")?;
        Ok(())
    }

    /// Events recorded after `after_event_id`, oldest first.
    ///
    /// Subscribers that missed notifications (restart, lag) use this to catch up.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn replay(
        &self,
        after_event_id: u64,
        limit: i64,
    ) -> anyhow::Result<Vec<ConfigUpdate>> {
        let after: i64 = after_event_id
            .try_into()
            .map_err(|_| anyhow::anyhow!("after_event_id overflow"))?;

        let rows = sqlx::query(
            r"
select e.id, e.name, e.config_hash, c.tenant, c.prefix
from mcp_config_events e
join mcp_configs c on c.name = e.name
where e.id > $1
order by e.id asc
limit $2
",
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("select config events")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let event_id: u64 = id
                .try_into()
                .map_err(|_| anyhow::anyhow!("config event id overflow"))?;
            out.push(ConfigUpdate {
                name: row.try_get("name")?,
                tenant: row.try_get("tenant")?,
                prefix: row.try_get("prefix")?,
                config_hash: row.try_get("config_hash")?,
                event_id,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl UpdateNotifier for PgUpdateNotifier {
    async fn notify_update(
        &self,
        ctx: &CancellationToken,
        config: &McpServerConfig,
    ) -> Result<(), NotifyError> {
        if ctx.is_cancelled() {
            return Err(NotifyError::Cancelled);
        }

        // The event row and its `pg_notify` share one transaction: a cancelled send leaves neither
        // behind, and a committed one is always followed by the local publish.
        let mut tx = tokio::select! {
            () = ctx.cancelled() => return Err(NotifyError::Cancelled),
            res = self.pool.begin() => res.map_err(|e| NotifyError::Unavailable(e.to_string()))?,
        };

        let send = async {
            let update = self.persist(&mut tx, config).await?;
            self.publish(&mut tx, &update).await?;
            anyhow::Ok(update)
        };

        let update = tokio::select! {
            () = ctx.cancelled() => return Err(NotifyError::Cancelled),
            res = send => res.map_err(|e| NotifyError::Unavailable(format!("{e:#}")))?,
        };

        tx.commit()
            .await
            .map_err(|e| NotifyError::Unavailable(format!("commit config event: {e}")))?;

        // The listener skips our own origin, so local subscribers are served directly.
        self.local.publish(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_event_flattens_update_fields() {
        let wire = WireEvent {
            origin: "node-a".to_string(),
            update: ConfigUpdate {
                name: "pets_0123abcd".to_string(),
                tenant: "acme".to_string(),
                prefix: "/v1".to_string(),
                config_hash: "sha256:00".to_string(),
                event_id: 7,
            },
        };
        let v = serde_json::to_value(&wire).unwrap();
        assert_eq!(v["origin"], "node-a");
        assert_eq!(v["name"], "pets_0123abcd");
        assert_eq!(v["configHash"], "sha256:00");
        assert_eq!(v["eventId"], 7);

        let back: WireEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back.update, wire.update);
    }
}

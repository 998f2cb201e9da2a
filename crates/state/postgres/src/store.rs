use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use delta_core::{
    Content, ContentAddress, ContentDeal, ContentDealId, ContentId, ContentStatus,
    DealProposalParameters, LocalCopyRemoval, NewContent, NewContentDeal, NewPieceCommitment,
    PieceCommitment, PieceCommitmentId, RemovalId, TransferId,
};
use delta_state::error::StateError;
use delta_state::store::DealStore;

use crate::config::PostgresConfig;
use crate::migrations;

const CONTENT_COLUMNS: &str = "id, address, name, size, requesting_api_key, connection_mode, \
     status, last_message, piece_commitment_id, created_at, updated_at";

const COMMITMENT_COLUMNS: &str = "id, address, piece, size, padded_piece_size, \
     unpadded_piece_size, status, created_at, updated_at";

const DEAL_COLUMNS: &str = "id, content_id, miner, proposal, transfer_id, on_chain_deal_id, \
     transfer_started_at, transfer_finished_at, sealed_at, on_chain_at, failed_at, \
     last_message, created_at, updated_at";

const REMOVAL_COLUMNS: &str =
    "id, content_id, address, attempts, last_error, created_at, updated_at";

fn backend(e: sqlx::Error) -> StateError {
    StateError::Backend(e.to_string())
}

fn to_db(value: u64) -> Result<i64, StateError> {
    i64::try_from(value).map_err(|_| StateError::Serialization(format!("{value} exceeds BIGINT")))
}

fn from_db(value: i64) -> Result<u64, StateError> {
    u64::try_from(value).map_err(|_| StateError::Serialization(format!("negative size {value}")))
}

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, StateError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StateError::Serialization(e.to_string()))
}

fn content_from_row(row: &PgRow) -> Result<Content, StateError> {
    let mode: String = row.try_get("connection_mode").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(Content {
        id: ContentId::new(row.try_get("id").map_err(backend)?),
        address: ContentAddress::new(row.try_get::<String, _>("address").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        size: from_db(row.try_get("size").map_err(backend)?)?,
        requesting_api_key: row
            .try_get::<String, _>("requesting_api_key")
            .map_err(backend)?
            .into(),
        connection_mode: parse(&mode)?,
        status: parse(&status)?,
        last_message: row.try_get("last_message").map_err(backend)?,
        piece_commitment_id: row
            .try_get::<Option<i64>, _>("piece_commitment_id")
            .map_err(backend)?
            .map(PieceCommitmentId::new),
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn commitment_from_row(row: &PgRow) -> Result<PieceCommitment, StateError> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(PieceCommitment {
        id: PieceCommitmentId::new(row.try_get("id").map_err(backend)?),
        address: row.try_get::<String, _>("address").map_err(backend)?.into(),
        piece: row.try_get::<String, _>("piece").map_err(backend)?.into(),
        size: from_db(row.try_get("size").map_err(backend)?)?,
        padded_piece_size: from_db(row.try_get("padded_piece_size").map_err(backend)?)?,
        unpadded_piece_size: from_db(row.try_get("unpadded_piece_size").map_err(backend)?)?,
        status: parse(&status)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn proposal_from_row(row: &PgRow) -> Result<DealProposalParameters, StateError> {
    let replication: i32 = row.try_get("replication").map_err(backend)?;
    Ok(DealProposalParameters {
        content_id: ContentId::new(row.try_get("content_id").map_err(backend)?),
        miner: row.try_get::<String, _>("miner").map_err(backend)?.into(),
        wallet: row
            .try_get::<Option<String>, _>("wallet")
            .map_err(backend)?
            .map(Into::into),
        label: row.try_get("label").map_err(backend)?,
        duration: row.try_get("duration").map_err(backend)?,
        start_epoch: row.try_get("start_epoch").map_err(backend)?,
        verified_deal: row.try_get("verified_deal").map_err(backend)?,
        remove_unsealed_copy: row.try_get("remove_unsealed_copy").map_err(backend)?,
        skip_ipni_announce: row.try_get("skip_ipni_announce").map_err(backend)?,
        replication: u32::try_from(replication)
            .map_err(|_| StateError::Serialization(format!("negative replication {replication}")))?,
    })
}

fn deal_from_row(row: &PgRow) -> Result<ContentDeal, StateError> {
    let proposal: String = row.try_get("proposal").map_err(backend)?;
    Ok(ContentDeal {
        id: ContentDealId::new(row.try_get("id").map_err(backend)?),
        content_id: ContentId::new(row.try_get("content_id").map_err(backend)?),
        miner: row.try_get::<String, _>("miner").map_err(backend)?.into(),
        proposal: serde_json::from_str(&proposal)
            .map_err(|e| StateError::Serialization(e.to_string()))?,
        transfer_id: row
            .try_get::<Option<String>, _>("transfer_id")
            .map_err(backend)?
            .map(TransferId::new),
        on_chain_deal_id: row.try_get("on_chain_deal_id").map_err(backend)?,
        transfer_started_at: row.try_get("transfer_started_at").map_err(backend)?,
        transfer_finished_at: row.try_get("transfer_finished_at").map_err(backend)?,
        sealed_at: row.try_get("sealed_at").map_err(backend)?,
        on_chain_at: row.try_get("on_chain_at").map_err(backend)?,
        failed_at: row.try_get("failed_at").map_err(backend)?,
        last_message: row.try_get("last_message").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn removal_from_row(row: &PgRow) -> Result<LocalCopyRemoval, StateError> {
    let attempts: i32 = row.try_get("attempts").map_err(backend)?;
    Ok(LocalCopyRemoval {
        id: RemovalId::new(row.try_get("id").map_err(backend)?),
        content_id: ContentId::new(row.try_get("content_id").map_err(backend)?),
        address: row.try_get::<String, _>("address").map_err(backend)?.into(),
        attempts: u32::try_from(attempts).unwrap_or_default(),
        last_error: row.try_get("last_error").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
pub(crate) fn build_connect_options(
    config: &PostgresConfig,
) -> Result<sqlx::postgres::PgConnectOptions, StateError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| StateError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => {
                return Err(StateError::Connection(format!("unknown ssl_mode: {other}")));
            }
        };
        options = options.ssl_mode(ssl_mode);
    }

    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }

    Ok(options)
}

/// PostgreSQL-backed implementation of [`DealStore`].
///
/// Status transitions lock the content row with `SELECT ... FOR UPDATE`
/// inside a transaction, so the edge check and the write see the same row.
pub struct PostgresDealStore {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresDealStore {
    /// Connect, build the pool and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if pool creation fails, or
    /// [`StateError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StateError> {
        let connect_options = build_connect_options(&config)?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a store from an existing pool. Runs migrations on creation.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StateError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(backend)?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    async fn insert_commitment<'e, E>(
        &self,
        executor: E,
        commitment: &NewPieceCommitment,
        now: DateTime<Utc>,
    ) -> Result<PieceCommitment, StateError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let sql = format!(
            "INSERT INTO {} (address, piece, size, padded_piece_size, unpadded_piece_size, \
             status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING {COMMITMENT_COLUMNS}",
            self.config.commitments_table()
        );
        let row = sqlx::query(&sql)
            .bind(commitment.address.as_str())
            .bind(commitment.piece.as_str())
            .bind(to_db(commitment.size)?)
            .bind(to_db(commitment.padded_piece_size)?)
            .bind(to_db(commitment.unpadded_piece_size)?)
            .bind(commitment.status.as_str())
            .bind(now)
            .fetch_one(executor)
            .await
            .map_err(backend)?;
        commitment_from_row(&row)
    }

    async fn insert_content<'e, E>(
        &self,
        executor: E,
        content: &NewContent,
        commitment: Option<PieceCommitmentId>,
        now: DateTime<Utc>,
    ) -> Result<Content, StateError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let sql = format!(
            "INSERT INTO {} (address, name, size, requesting_api_key, connection_mode, status, \
             last_message, piece_commitment_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $8) RETURNING {CONTENT_COLUMNS}",
            self.config.contents_table()
        );
        let row = sqlx::query(&sql)
            .bind(content.address.as_str())
            .bind(&content.name)
            .bind(to_db(content.size)?)
            .bind(content.requesting_api_key.as_str())
            .bind(content.connection_mode.as_str())
            .bind(content.status.as_str())
            .bind(commitment.map(PieceCommitmentId::get))
            .bind(now)
            .fetch_one(executor)
            .await
            .map_err(backend)?;
        content_from_row(&row)
    }

    async fn lock_content(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: ContentId,
    ) -> Result<Content, StateError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM {} WHERE id = $1 FOR UPDATE",
            self.config.contents_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut **tx)
            .await
            .map_err(backend)?
            .ok_or_else(|| StateError::not_found("content", id))?;
        content_from_row(&row)
    }

    async fn fetch_deals(
        &self,
        filter: &str,
        bind: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ContentDeal>, StateError> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM {} WHERE {filter} ORDER BY id",
            self.config.deals_table()
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        if let Some(at) = before {
            query = query.bind(at);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(deal_from_row).collect()
    }
}

#[async_trait]
impl DealStore for PostgresDealStore {
    async fn create_content(&self, content: NewContent) -> Result<Content, StateError> {
        self.insert_content(&self.pool, &content, None, Utc::now())
            .await
    }

    async fn create_content_with_commitment(
        &self,
        content: NewContent,
        commitment: NewPieceCommitment,
    ) -> Result<(Content, PieceCommitment), StateError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let commitment = self.insert_commitment(&mut *tx, &commitment, now).await?;
        let content = self
            .insert_content(&mut *tx, &content, Some(commitment.id), now)
            .await?;
        tx.commit().await.map_err(backend)?;
        Ok((content, commitment))
    }

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>, StateError> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM {} WHERE id = $1",
            self.config.contents_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn transition_content(
        &self,
        id: ContentId,
        to: ContentStatus,
        message: Option<&str>,
    ) -> Result<Content, StateError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let content = self.lock_content(&mut tx, id).await?;
        content
            .status
            .check_transition(to, content.has_commitment())?;

        let sql = format!(
            "UPDATE {} SET status = $2, last_message = $3, updated_at = $4 WHERE id = $1 \
             RETURNING {CONTENT_COLUMNS}",
            self.config.contents_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(to.as_str())
            .bind(message.unwrap_or(to.as_str()))
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let updated = content_from_row(&row)?;
        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn attach_piece_commitment(
        &self,
        id: ContentId,
        commitment: NewPieceCommitment,
    ) -> Result<(Content, PieceCommitment), StateError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let content = self.lock_content(&mut tx, id).await?;
        content
            .status
            .check_transition(ContentStatus::PieceAssigned, true)?;

        let now = Utc::now();
        let commitment = self.insert_commitment(&mut *tx, &commitment, now).await?;
        let sql = format!(
            "UPDATE {} SET status = $2, last_message = $2, piece_commitment_id = $3, \
             updated_at = $4 WHERE id = $1 RETURNING {CONTENT_COLUMNS}",
            self.config.contents_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(ContentStatus::PieceAssigned.as_str())
            .bind(commitment.id.get())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let updated = content_from_row(&row)?;
        tx.commit().await.map_err(backend)?;
        Ok((updated, commitment))
    }

    async fn list_contents_in_status(
        &self,
        statuses: &[ContentStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Content>, StateError> {
        let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM {} WHERE status = ANY($1) AND updated_at < $2 \
             ORDER BY id",
            self.config.contents_table()
        );
        let rows = sqlx::query(&sql)
            .bind(names.as_slice())
            .bind(updated_before)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(content_from_row).collect()
    }

    async fn bytes_in_transfer(&self) -> Result<u64, StateError> {
        let sql = format!(
            "SELECT COALESCE(SUM(c.size), 0)::BIGINT AS total FROM {} c WHERE c.id IN ( \
                SELECT d.content_id FROM {} d WHERE d.transfer_started_at IS NOT NULL \
                AND d.transfer_finished_at IS NULL AND d.failed_at IS NULL)",
            self.config.contents_table(),
            self.config.deals_table()
        );
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        from_db(row.try_get("total").map_err(backend)?)
    }

    async fn get_piece_commitment(
        &self,
        id: PieceCommitmentId,
    ) -> Result<Option<PieceCommitment>, StateError> {
        let sql = format!(
            "SELECT {COMMITMENT_COLUMNS} FROM {} WHERE id = $1",
            self.config.commitments_table()
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(commitment_from_row).transpose()
    }

    async fn save_proposal_parameters(
        &self,
        params: &DealProposalParameters,
    ) -> Result<(), StateError> {
        let sql = format!(
            "INSERT INTO {} (content_id, miner, wallet, label, duration, start_epoch, \
             verified_deal, remove_unsealed_copy, skip_ipni_announce, replication) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (content_id) DO UPDATE SET miner = EXCLUDED.miner, \
             wallet = EXCLUDED.wallet, label = EXCLUDED.label, duration = EXCLUDED.duration, \
             start_epoch = EXCLUDED.start_epoch, verified_deal = EXCLUDED.verified_deal, \
             remove_unsealed_copy = EXCLUDED.remove_unsealed_copy, \
             skip_ipni_announce = EXCLUDED.skip_ipni_announce, \
             replication = EXCLUDED.replication",
            self.config.proposals_table()
        );
        let replication = i32::try_from(params.replication).map_err(|_| {
            StateError::Serialization(format!("replication {} too large", params.replication))
        })?;
        sqlx::query(&sql)
            .bind(params.content_id.get())
            .bind(params.miner.as_str())
            .bind(params.wallet.as_ref().map(|w| w.as_str()))
            .bind(&params.label)
            .bind(params.duration)
            .bind(params.start_epoch)
            .bind(params.verified_deal)
            .bind(params.remove_unsealed_copy)
            .bind(params.skip_ipni_announce)
            .bind(replication)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_proposal_parameters(
        &self,
        content_id: ContentId,
    ) -> Result<Option<DealProposalParameters>, StateError> {
        let sql = format!(
            "SELECT content_id, miner, wallet, label, duration, start_epoch, verified_deal, \
             remove_unsealed_copy, skip_ipni_announce, replication FROM {} WHERE content_id = $1",
            self.config.proposals_table()
        );
        let row = sqlx::query(&sql)
            .bind(content_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn create_deal(&self, deal: NewContentDeal) -> Result<ContentDeal, StateError> {
        let proposal = serde_json::to_string(&deal.proposal)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let sql = format!(
            "INSERT INTO {} (content_id, miner, proposal, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {DEAL_COLUMNS}",
            self.config.deals_table()
        );
        let row = sqlx::query(&sql)
            .bind(deal.content_id.get())
            .bind(deal.miner.as_str())
            .bind(proposal)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        deal_from_row(&row)
    }

    async fn get_deal(&self, id: ContentDealId) -> Result<Option<ContentDeal>, StateError> {
        Ok(self
            .fetch_deals("id = $1", Some(id.get()), None)
            .await?
            .into_iter()
            .next())
    }

    async fn find_deal_by_transfer_id(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<ContentDeal>, StateError> {
        let sql = format!(
            "SELECT {DEAL_COLUMNS} FROM {} WHERE transfer_id = $1 ORDER BY id DESC LIMIT 1",
            self.config.deals_table()
        );
        let row = sqlx::query(&sql)
            .bind(transfer_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(deal_from_row).transpose()
    }

    async fn list_deals_for_content(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<ContentDeal>, StateError> {
        self.fetch_deals("content_id = $1", Some(content_id.get()), None)
            .await
    }

    async fn update_deal(&self, deal: &ContentDeal) -> Result<(), StateError> {
        let proposal = serde_json::to_string(&deal.proposal)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let sql = format!(
            "UPDATE {} SET miner = $2, proposal = $3, transfer_id = $4, on_chain_deal_id = $5, \
             transfer_started_at = $6, transfer_finished_at = $7, sealed_at = $8, \
             on_chain_at = $9, failed_at = $10, last_message = $11, updated_at = $12 \
             WHERE id = $1",
            self.config.deals_table()
        );
        let result = sqlx::query(&sql)
            .bind(deal.id.get())
            .bind(deal.miner.as_str())
            .bind(proposal)
            .bind(deal.transfer_id.as_ref().map(|t| t.as_str()))
            .bind(deal.on_chain_deal_id)
            .bind(deal.transfer_started_at)
            .bind(deal.transfer_finished_at)
            .bind(deal.sealed_at)
            .bind(deal.on_chain_at)
            .bind(deal.failed_at)
            .bind(deal.last_message.as_deref())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StateError::not_found("deal", deal.id));
        }
        Ok(())
    }

    async fn list_stalled_deals(
        &self,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<ContentDeal>, StateError> {
        self.fetch_deals(
            "transfer_id IS NOT NULL AND transfer_started_at IS NULL \
             AND transfer_finished_at IS NULL AND failed_at IS NULL AND updated_at < $1",
            None,
            Some(updated_before),
        )
        .await
    }

    async fn schedule_removal(
        &self,
        content_id: ContentId,
        address: &ContentAddress,
    ) -> Result<LocalCopyRemoval, StateError> {
        let table = self.config.removals_table();
        let insert = format!(
            "INSERT INTO {table} (content_id, address, attempts, created_at, updated_at) \
             VALUES ($1, $2, 0, $3, $3) ON CONFLICT (content_id) DO NOTHING"
        );
        sqlx::query(&insert)
            .bind(content_id.get())
            .bind(address.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        let select = format!("SELECT {REMOVAL_COLUMNS} FROM {table} WHERE content_id = $1");
        let row = sqlx::query(&select)
            .bind(content_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        removal_from_row(&row)
    }

    async fn list_pending_removals(&self) -> Result<Vec<LocalCopyRemoval>, StateError> {
        let sql = format!(
            "SELECT {REMOVAL_COLUMNS} FROM {} ORDER BY id",
            self.config.removals_table()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(removal_from_row).collect()
    }

    async fn complete_removal(&self, id: RemovalId) -> Result<bool, StateError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.config.removals_table());
        let result = sqlx::query(&sql)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_removal_failure(&self, id: RemovalId, error: &str) -> Result<(), StateError> {
        let sql = format!(
            "UPDATE {} SET attempts = attempts + 1, last_error = $2, updated_at = $3 WHERE id = $1",
            self.config.removals_table()
        );
        let result = sqlx::query(&sql)
            .bind(id.get())
            .bind(error)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StateError::not_found("removal", id));
        }
        Ok(())
    }
}

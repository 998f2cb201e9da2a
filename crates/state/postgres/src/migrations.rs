use sqlx::PgPool;
use tracing::debug;

use crate::config::PostgresConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// This creates the contents, piece commitments, proposal parameters, deals
/// and local-copy removal tables in the configured schema with the
/// configured table prefix.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let contents = config.contents_table();
    let commitments = config.commitments_table();
    let proposals = config.proposals_table();
    let deals = config.deals_table();
    let removals = config.removals_table();
    let prefix = &config.table_prefix;

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {commitments} (
                id BIGSERIAL PRIMARY KEY,
                address TEXT NOT NULL,
                piece TEXT NOT NULL,
                size BIGINT NOT NULL,
                padded_piece_size BIGINT NOT NULL,
                unpadded_piece_size BIGINT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {contents} (
                id BIGSERIAL PRIMARY KEY,
                address TEXT NOT NULL,
                name TEXT NOT NULL,
                size BIGINT NOT NULL,
                requesting_api_key TEXT NOT NULL,
                connection_mode TEXT NOT NULL,
                status TEXT NOT NULL,
                last_message TEXT,
                piece_commitment_id BIGINT REFERENCES {commitments} (id),
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}contents_status_idx ON {contents} (status, updated_at)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {proposals} (
                content_id BIGINT PRIMARY KEY REFERENCES {contents} (id),
                miner TEXT NOT NULL,
                wallet TEXT,
                label TEXT NOT NULL,
                duration BIGINT NOT NULL,
                start_epoch BIGINT,
                verified_deal BOOLEAN NOT NULL,
                remove_unsealed_copy BOOLEAN NOT NULL,
                skip_ipni_announce BOOLEAN NOT NULL,
                replication INTEGER NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {deals} (
                id BIGSERIAL PRIMARY KEY,
                content_id BIGINT NOT NULL REFERENCES {contents} (id),
                miner TEXT NOT NULL,
                proposal TEXT NOT NULL,
                transfer_id TEXT,
                on_chain_deal_id BIGINT,
                transfer_started_at TIMESTAMPTZ,
                transfer_finished_at TIMESTAMPTZ,
                sealed_at TIMESTAMPTZ,
                on_chain_at TIMESTAMPTZ,
                failed_at TIMESTAMPTZ,
                last_message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}content_deals_transfer_idx ON {deals} (transfer_id)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}content_deals_content_idx ON {deals} (content_id)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {removals} (
                id BIGSERIAL PRIMARY KEY,
                content_id BIGINT NOT NULL UNIQUE REFERENCES {contents} (id),
                address TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"
        ),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!(schema = %config.schema, prefix = %config.table_prefix, "deal store migrations applied");

    Ok(())
}

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};

use crate::core::config::DatabaseConfig;
use crate::core::shared::error::{CrmError, CrmResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(config.url.clone());
    Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
            format!("Migration error: {e}").into()
        })?;
    Ok(())
}

/// Display format used for resolution timestamps, e.g. `05/03/24 14:30`.
pub fn format_resolved_at(ts: &DateTime<Utc>) -> String {
    ts.format("%d/%m/%y %H:%M").to_string()
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Trims and drops empty strings.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Rejects values longer than `max` characters.
pub fn ensure_max_len(field: &str, value: Option<&str>, max: usize) -> CrmResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(CrmError::validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// [`ensure_max_len`] over several `(field, value, max)` columns, reporting
/// the first one that does not fit.
pub fn ensure_max_lens(fields: &[(&str, Option<&str>, usize)]) -> CrmResult<()> {
    fields
        .iter()
        .try_for_each(|(field, value, max)| ensure_max_len(field, *value, *max))
}

/// Money is stored with two decimal places, halves rounded away from zero.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

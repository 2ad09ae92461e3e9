//! Postgres-backed ledger store.
//!
//! ## Isolation
//!
//! Write transactions run at `SERIALIZABLE`. On top of that:
//!
//! - [`LedgerTx::lock_series`] takes `SELECT … FOR UPDATE` on the scope's
//!   series rows, so concurrent allocations queue instead of aborting.
//! - [`LedgerTx::lock_stock`] takes a transaction-scoped advisory lock per
//!   (sku, location), keys sorted to avoid lock-order deadlocks.
//!
//! Whatever still slips through (serialization failures, deadlocks) surfaces
//! as `ConcurrencyConflict` and is retried by the service.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError |
//! |------------|----------------------|-------------|
//! | Database (serialization failure) | `40001` | `ConcurrencyConflict` |
//! | Database (deadlock detected) | `40P01` | `ConcurrencyConflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (query canceled / timeout) | `57014` | `Store` |
//! | Anything else | | `Store` |

use std::collections::BTreeMap;
use std::ops::DerefMut;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use stockbook_core::{
    CategoryId, Channel, LedgerError, LedgerResult, LocationId, Money, MovementId, MovementLineId,
    PriceRuleId, SupplierId,
};
use stockbook_ledger::{
    AddOn, Movement, MovementFilter, MovementLine, MovementType, Origin, Payment, PaymentStatus,
    StockKey,
};
use stockbook_pricing::{PriceRule, RuleKind, RuleScope, RuleTarget};
use stockbook_reference::{Location, LocationKind};
use stockbook_series::{DocumentSeries, SeriesScope};

use super::{LedgerRead, LedgerStore, LedgerTx, PurgeFilter};

const MIGRATION: &str = include_str!("../../migrations/0001_ledger.sql");

/// Postgres ledger store over a connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    maintenance_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, maintenance_timeout: Duration) -> Self {
        Self {
            pool,
            maintenance_timeout,
        }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32, maintenance_timeout: Duration) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, maintenance_timeout))
    }

    /// Apply the schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_serializable(&self) -> LedgerResult<PgTx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(PgSession { conn: tx })
    }
}

/// A connection the ledger queries run on: a pooled connection for readers,
/// an open transaction for writers.
#[derive(Debug)]
pub struct PgSession<C> {
    conn: C,
}

pub type PgReader = PgSession<PoolConnection<Postgres>>;
pub type PgTx = PgSession<Transaction<'static, Postgres>>;

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Reader = PgReader;
    type Tx = PgTx;

    async fn reader(&self) -> LedgerResult<PgReader> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        Ok(PgSession { conn })
    }

    async fn begin(&self) -> LedgerResult<PgTx> {
        self.begin_serializable().await
    }

    async fn begin_maintenance(&self) -> LedgerResult<PgTx> {
        let mut tx = self.begin_serializable().await?;
        // SET does not take bind parameters; the value is an integer we format ourselves.
        let millis = self.maintenance_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {millis}"))
            .execute(&mut *tx.conn)
            .await
            .map_err(|e| map_sqlx_error("set_statement_timeout", e))?;
        Ok(tx)
    }
}

const MOVEMENT_COLUMNS: &str = "id, kind, channel, origin, date, from_id, to_id, reference, notes, \
                                payment_status, paid_cents, return_of";

impl<C> PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Load movement headers with `where_sql`, then their lines in one round trip.
    async fn load_movements(
        &mut self,
        op: &'static str,
        where_sql: &str,
        bind: MovementBinds<'_>,
    ) -> LedgerResult<Vec<Movement>> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE {where_sql} ORDER BY date ASC, id ASC");
        let query = match bind {
            MovementBinds::Id(id) => sqlx::query(&sql).bind(id),
            MovementBinds::Filter(f) => sqlx::query(&sql)
                .bind(f.since)
                .bind(f.until)
                .bind(f.kind.map(MovementType::as_str))
                .bind(f.location.map(Uuid::from))
                .bind(f.sku.as_deref()),
        };
        let rows = query
            .fetch_all(self.conn())
            .await
            .map_err(|e| map_sqlx_error(op, e))?;

        let headers = rows
            .iter()
            .map(MovementRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(op, e))?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let line_rows = sqlx::query(
            r#"
            SELECT movement_id, id, sku, quantity, unit_price_cents, unit_cost_cents, discount_bp, addons
            FROM movement_lines
            WHERE movement_id = ANY($1)
            ORDER BY movement_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(self.conn())
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let mut lines: BTreeMap<Uuid, Vec<MovementLine>> = BTreeMap::new();
        for row in &line_rows {
            let row = LineRow::from_row(row).map_err(|e| map_sqlx_error(op, e))?;
            let movement_id = row.movement_id;
            lines.entry(movement_id).or_default().push(row.try_into()?);
        }

        headers
            .into_iter()
            .map(|h| {
                let own = lines.remove(&h.id).unwrap_or_default();
                h.into_movement(own)
            })
            .collect()
    }
}

enum MovementBinds<'a> {
    Id(Uuid),
    Filter(&'a MovementFilter),
}

const FILTER_WHERE: &str = "($1::timestamptz IS NULL OR date >= $1) \
     AND ($2::timestamptz IS NULL OR date < $2) \
     AND ($3::text IS NULL OR kind = $3) \
     AND ($4::uuid IS NULL OR from_id = $4 OR to_id = $4) \
     AND ($5::text IS NULL OR EXISTS (SELECT 1 FROM movement_lines l WHERE l.movement_id = movements.id AND l.sku = $5))";

#[async_trait]
impl<C> LedgerRead for PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    #[instrument(skip(self), fields(location = %id), err)]
    async fn location(&mut self, id: LocationId) -> LedgerResult<Option<Location>> {
        let row = sqlx::query("SELECT id, kind, name, active FROM locations WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(self.conn())
            .await
            .map_err(|e| map_sqlx_error("location", e))?;
        row.as_ref().map(location_from_row).transpose()
    }

    async fn locations(&mut self) -> LedgerResult<Vec<Location>> {
        let rows = sqlx::query("SELECT id, kind, name, active FROM locations ORDER BY name, id")
            .fetch_all(self.conn())
            .await
            .map_err(|e| map_sqlx_error("locations", e))?;
        rows.iter().map(location_from_row).collect()
    }

    async fn find_retail_location(&mut self, key: &str) -> LedgerResult<Option<Location>> {
        let row = sqlx::query(
            "SELECT id, kind, name, active FROM locations WHERE kind = 'retail' AND match_key = $1 ORDER BY id LIMIT 1",
        )
        .bind(key)
        .fetch_optional(self.conn())
        .await
        .map_err(|e| map_sqlx_error("find_retail_location", e))?;
        row.as_ref().map(location_from_row).transpose()
    }

    async fn location_in_use(&mut self, id: LocationId) -> LedgerResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM movements WHERE from_id = $1 OR to_id = $1) AS used")
            .bind(Uuid::from(id))
            .fetch_one(self.conn())
            .await
            .map_err(|e| map_sqlx_error("location_in_use", e))?;
        row.try_get("used").map_err(|e| map_sqlx_error("location_in_use", e))
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn movement(&mut self, id: MovementId) -> LedgerResult<Option<Movement>> {
        let mut found = self
            .load_movements("movement", "id = $1", MovementBinds::Id(Uuid::from(id)))
            .await?;
        Ok(found.pop())
    }

    #[instrument(skip(self, filter), err)]
    async fn movements(&mut self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>> {
        self.load_movements("movements", FILTER_WHERE, MovementBinds::Filter(filter))
            .await
    }

    async fn returns_for(&mut self, sale: MovementId) -> LedgerResult<Vec<Movement>> {
        self.load_movements("returns_for", "return_of = $1", MovementBinds::Id(Uuid::from(sale)))
            .await
    }

    #[instrument(skip(self), fields(sku = %sku, location = %location), err)]
    async fn balance(&mut self, sku: &str, location: LocationId) -> LedgerResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN m.to_id = $2 THEN l.quantity ELSE -l.quantity END), 0)::BIGINT AS balance
            FROM movement_lines l
            JOIN movements m ON m.id = l.movement_id
            WHERE l.sku = $1 AND (m.to_id = $2 OR m.from_id = $2)
            "#,
        )
        .bind(sku)
        .bind(Uuid::from(location))
        .fetch_one(self.conn())
        .await
        .map_err(|e| map_sqlx_error("balance", e))?;
        row.try_get("balance").map_err(|e| map_sqlx_error("balance", e))
    }

    async fn balances(&mut self, location: LocationId) -> LedgerResult<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT l.sku,
                   SUM(CASE WHEN m.to_id = $1 THEN l.quantity ELSE -l.quantity END)::BIGINT AS balance
            FROM movement_lines l
            JOIN movements m ON m.id = l.movement_id
            WHERE m.to_id = $1 OR m.from_id = $1
            GROUP BY l.sku
            HAVING SUM(CASE WHEN m.to_id = $1 THEN l.quantity ELSE -l.quantity END) <> 0
            ORDER BY l.sku
            "#,
        )
        .bind(Uuid::from(location))
        .fetch_all(self.conn())
        .await
        .map_err(|e| map_sqlx_error("balances", e))?;

        rows.iter()
            .map(|r| Ok((r.try_get("sku")?, r.try_get("balance")?)))
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("balances", e))
    }

    async fn all_balances(&mut self) -> LedgerResult<BTreeMap<StockKey, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT sku, location_id, SUM(delta)::BIGINT AS balance
            FROM (
                SELECT l.sku, m.to_id AS location_id, l.quantity AS delta
                FROM movement_lines l JOIN movements m ON m.id = l.movement_id
                WHERE m.to_id IS NOT NULL
                UNION ALL
                SELECT l.sku, m.from_id AS location_id, -l.quantity AS delta
                FROM movement_lines l JOIN movements m ON m.id = l.movement_id
                WHERE m.from_id IS NOT NULL
            ) deltas
            GROUP BY sku, location_id
            HAVING SUM(delta) <> 0
            "#,
        )
        .fetch_all(self.conn())
        .await
        .map_err(|e| map_sqlx_error("all_balances", e))?;

        let mut out = BTreeMap::new();
        for r in &rows {
            let sku: String = r.try_get("sku").map_err(|e| map_sqlx_error("all_balances", e))?;
            let location: Uuid = r.try_get("location_id").map_err(|e| map_sqlx_error("all_balances", e))?;
            let balance: i64 = r.try_get("balance").map_err(|e| map_sqlx_error("all_balances", e))?;
            out.insert(StockKey::new(sku, LocationId::from(location)), balance);
        }
        Ok(out)
    }

    async fn series(&mut self) -> LedgerResult<Vec<DocumentSeries>> {
        let rows = sqlx::query(
            "SELECT code, name, scope, prefix, year, next_number, padding, active FROM document_series ORDER BY code",
        )
        .fetch_all(self.conn())
        .await
        .map_err(|e| map_sqlx_error("series", e))?;
        rows.iter().map(series_from_row).collect()
    }

    async fn price_rules(&mut self) -> LedgerResult<Vec<PriceRule>> {
        let rows = sqlx::query(
            "SELECT id, name, target, scope, category_id, supplier_id, kind, value, priority, active \
             FROM price_rules ORDER BY id",
        )
        .fetch_all(self.conn())
        .await
        .map_err(|e| map_sqlx_error("price_rules", e))?;
        rows.iter().map(rule_from_row).collect()
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    #[instrument(skip(self, keys), fields(keys = keys.len()), err)]
    async fn lock_stock(&mut self, keys: &[StockKey]) -> LedgerResult<()> {
        let mut sorted: Vec<&StockKey> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();
        for key in sorted {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(format!("stock:{}:{}", key.location, key.sku))
                .execute(self.conn())
                .await
                .map_err(|e| map_sqlx_error("lock_stock", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(scope = %scope), err)]
    async fn lock_series(&mut self, scope: SeriesScope) -> LedgerResult<Vec<DocumentSeries>> {
        let rows = sqlx::query(
            "SELECT code, name, scope, prefix, year, next_number, padding, active \
             FROM document_series WHERE scope = $1 ORDER BY code FOR UPDATE",
        )
        .bind(scope.as_str())
        .fetch_all(self.conn())
        .await
        .map_err(|e| map_sqlx_error("lock_series", e))?;
        rows.iter().map(series_from_row).collect()
    }

    async fn save_series(&mut self, s: &DocumentSeries) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO document_series (code, name, scope, prefix, year, next_number, padding, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (code) DO UPDATE SET
                name = EXCLUDED.name,
                scope = EXCLUDED.scope,
                prefix = EXCLUDED.prefix,
                year = EXCLUDED.year,
                next_number = EXCLUDED.next_number,
                padding = EXCLUDED.padding,
                active = EXCLUDED.active
            "#,
        )
        .bind(&s.code)
        .bind(&s.name)
        .bind(s.scope.as_str())
        .bind(&s.prefix)
        .bind(s.year)
        .bind(s.next_number)
        .bind(i16::from(s.padding))
        .bind(s.active)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("save_series", e))?;
        Ok(())
    }

    async fn delete_series(&mut self, code: &str) -> LedgerResult<bool> {
        let res = sqlx::query("DELETE FROM document_series WHERE code = $1")
            .bind(code)
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("delete_series", e))?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_location(&mut self, loc: &Location) -> LedgerResult<()> {
        sqlx::query("INSERT INTO locations (id, kind, name, match_key, active) VALUES ($1, $2, $3, $4, $5)")
            .bind(Uuid::from(loc.id))
            .bind(loc.kind.as_str())
            .bind(&loc.name)
            .bind(loc.match_key())
            .bind(loc.active)
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("insert_location", e))?;
        Ok(())
    }

    async fn update_location(&mut self, loc: &Location) -> LedgerResult<()> {
        let res = sqlx::query("UPDATE locations SET kind = $2, name = $3, match_key = $4, active = $5 WHERE id = $1")
            .bind(Uuid::from(loc.id))
            .bind(loc.kind.as_str())
            .bind(&loc.name)
            .bind(loc.match_key())
            .bind(loc.active)
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("update_location", e))?;
        if res.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!("location {}", loc.id)));
        }
        Ok(())
    }

    async fn delete_location(&mut self, id: LocationId) -> LedgerResult<bool> {
        let res = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("delete_location", e))?;
        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self, m), fields(movement_id = %m.id, kind = %m.kind, lines = m.lines.len()), err)]
    async fn insert_movement(&mut self, m: &Movement) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO movements (
                id, kind, channel, origin, date, from_id, to_id, reference, notes,
                payment_status, paid_cents, return_of
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::from(m.id))
        .bind(m.kind.as_str())
        .bind(m.channel.map(Channel::as_str))
        .bind(m.origin.as_str())
        .bind(m.date)
        .bind(m.from.map(Uuid::from))
        .bind(m.to.map(Uuid::from))
        .bind(m.reference.as_deref())
        .bind(m.notes.as_deref())
        .bind(m.payment.map(|p| p.status.as_str()))
        .bind(m.payment.map(|p| p.paid.cents()))
        .bind(m.return_of.map(Uuid::from))
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        for (position, line) in m.lines.iter().enumerate() {
            let addons = serde_json::to_value(&line.addons)
                .map_err(|e| LedgerError::store(format!("failed to encode add-ons: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO movement_lines (
                    id, movement_id, position, sku, quantity, unit_price_cents, unit_cost_cents, discount_bp, addons
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::from(line.id))
            .bind(Uuid::from(m.id))
            .bind(position as i32)
            .bind(&line.sku)
            .bind(line.quantity)
            .bind(line.unit_price.map(Money::cents))
            .bind(line.unit_cost.cents())
            .bind(line.discount_bp as i32)
            .bind(addons)
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("insert_movement_line", e))?;
        }
        debug!("movement rows written");
        Ok(())
    }

    async fn update_movement_header(&mut self, m: &Movement) -> LedgerResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE movements
            SET reference = $2, notes = $3, date = $4, payment_status = $5, paid_cents = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(m.id))
        .bind(m.reference.as_deref())
        .bind(m.notes.as_deref())
        .bind(m.date)
        .bind(m.payment.map(|p| p.status.as_str()))
        .bind(m.payment.map(|p| p.paid.cents()))
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("update_movement_header", e))?;
        if res.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!("movement {}", m.id)));
        }
        Ok(())
    }

    async fn insert_price_rule(&mut self, rule: &PriceRule) -> LedgerResult<()> {
        let cols = RuleColumns::from(rule);
        sqlx::query(
            r#"
            INSERT INTO price_rules (id, name, target, scope, category_id, supplier_id, kind, value, priority, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(rule.id))
        .bind(&rule.name)
        .bind(cols.target)
        .bind(cols.scope)
        .bind(cols.category_id)
        .bind(cols.supplier_id)
        .bind(cols.kind)
        .bind(cols.value)
        .bind(rule.priority)
        .bind(rule.active)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("insert_price_rule", e))?;
        Ok(())
    }

    async fn update_price_rule(&mut self, rule: &PriceRule) -> LedgerResult<()> {
        let cols = RuleColumns::from(rule);
        let res = sqlx::query(
            r#"
            UPDATE price_rules
            SET name = $2, target = $3, scope = $4, category_id = $5, supplier_id = $6,
                kind = $7, value = $8, priority = $9, active = $10
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(rule.id))
        .bind(&rule.name)
        .bind(cols.target)
        .bind(cols.scope)
        .bind(cols.category_id)
        .bind(cols.supplier_id)
        .bind(cols.kind)
        .bind(cols.value)
        .bind(rule.priority)
        .bind(rule.active)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("update_price_rule", e))?;
        if res.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!("price rule {}", rule.id)));
        }
        Ok(())
    }

    async fn delete_price_rule(&mut self, id: PriceRuleId) -> LedgerResult<bool> {
        let res = sqlx::query("DELETE FROM price_rules WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("delete_price_rule", e))?;
        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn purge_movements(&mut self, filter: &PurgeFilter) -> LedgerResult<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM movements
            WHERE ($1::timestamptz IS NULL OR date < $1)
              AND ($2::uuid IS NULL OR from_id = $2 OR to_id = $2)
            "#,
        )
        .bind(filter.before)
        .bind(filter.location.map(Uuid::from))
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("purge_movements", e))?;
        Ok(res.rows_affected())
    }

    async fn commit(self) -> LedgerResult<()> {
        self.conn
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => LedgerError::concurrency(msg),
                Some("23505") | Some("23503") => LedgerError::conflict(msg),
                _ => LedgerError::store(msg),
            }
        }
        sqlx::Error::PoolClosed => LedgerError::store(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => LedgerError::store(format!("connection pool timed out in {operation}")),
        other => LedgerError::store(format!("sqlx error in {operation}: {other}")),
    }
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> LedgerError {
    LedgerError::store(format!("invalid stored {what}: {err}"))
}

// SQLx row types

#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    kind: String,
    channel: Option<String>,
    origin: String,
    date: DateTime<Utc>,
    from_id: Option<Uuid>,
    to_id: Option<Uuid>,
    reference: Option<String>,
    notes: Option<String>,
    payment_status: Option<String>,
    paid_cents: Option<i64>,
    return_of: Option<Uuid>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            channel: row.try_get("channel")?,
            origin: row.try_get("origin")?,
            date: row.try_get("date")?,
            from_id: row.try_get("from_id")?,
            to_id: row.try_get("to_id")?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            payment_status: row.try_get("payment_status")?,
            paid_cents: row.try_get("paid_cents")?,
            return_of: row.try_get("return_of")?,
        })
    }
}

impl MovementRow {
    fn into_movement(self, lines: Vec<MovementLine>) -> LedgerResult<Movement> {
        let kind = MovementType::from_str(&self.kind).map_err(|e| corrupt("movement type", e))?;
        let channel = self
            .channel
            .as_deref()
            .map(Channel::from_str)
            .transpose()
            .map_err(|e| corrupt("channel", e))?;
        let origin = Origin::from_str(&self.origin).map_err(|e| corrupt("origin", e))?;
        let payment = match (self.payment_status.as_deref(), self.paid_cents) {
            (Some(status), Some(paid)) => Some(Payment {
                status: PaymentStatus::from_str(status).map_err(|e| corrupt("payment status", e))?,
                paid: Money::from_cents(paid),
            }),
            _ => None,
        };
        Ok(Movement {
            id: MovementId::from(self.id),
            kind,
            channel,
            origin,
            date: self.date,
            from: self.from_id.map(LocationId::from),
            to: self.to_id.map(LocationId::from),
            reference: self.reference,
            notes: self.notes,
            payment,
            return_of: self.return_of.map(MovementId::from),
            lines,
        })
    }
}

#[derive(Debug)]
struct LineRow {
    movement_id: Uuid,
    id: Uuid,
    sku: String,
    quantity: i64,
    unit_price_cents: Option<i64>,
    unit_cost_cents: i64,
    discount_bp: i32,
    addons: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for LineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LineRow {
            movement_id: row.try_get("movement_id")?,
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            quantity: row.try_get("quantity")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
            unit_cost_cents: row.try_get("unit_cost_cents")?,
            discount_bp: row.try_get("discount_bp")?,
            addons: row.try_get("addons")?,
        })
    }
}

impl TryFrom<LineRow> for MovementLine {
    type Error = LedgerError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        let addons: Vec<AddOn> = serde_json::from_value(row.addons).map_err(|e| corrupt("add-ons", e))?;
        Ok(MovementLine {
            id: MovementLineId::from(row.id),
            sku: row.sku,
            quantity: row.quantity,
            unit_price: row.unit_price_cents.map(Money::from_cents),
            unit_cost: Money::from_cents(row.unit_cost_cents),
            discount_bp: u32::try_from(row.discount_bp).map_err(|e| corrupt("discount", e))?,
            addons,
        })
    }
}

fn location_from_row(row: &PgRow) -> LedgerResult<Location> {
    let get = |e: sqlx::Error| map_sqlx_error("location_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let kind: String = row.try_get("kind").map_err(get)?;
    let name: String = row.try_get("name").map_err(get)?;
    let active: bool = row.try_get("active").map_err(get)?;
    Ok(Location {
        id: LocationId::from(id),
        kind: LocationKind::from_str(&kind).map_err(|e| corrupt("location kind", e))?,
        name,
        active,
    })
}

fn series_from_row(row: &PgRow) -> LedgerResult<DocumentSeries> {
    let get = |e: sqlx::Error| map_sqlx_error("series_row", e);
    let scope: String = row.try_get("scope").map_err(get)?;
    let padding: i16 = row.try_get("padding").map_err(get)?;
    Ok(DocumentSeries {
        code: row.try_get("code").map_err(get)?,
        name: row.try_get("name").map_err(get)?,
        scope: SeriesScope::from_str(&scope).map_err(|e| corrupt("series scope", e))?,
        prefix: row.try_get("prefix").map_err(get)?,
        year: row.try_get("year").map_err(get)?,
        next_number: row.try_get("next_number").map_err(get)?,
        padding: u8::try_from(padding).map_err(|e| corrupt("series padding", e))?,
        active: row.try_get("active").map_err(get)?,
    })
}

struct RuleColumns {
    target: &'static str,
    scope: &'static str,
    category_id: Option<Uuid>,
    supplier_id: Option<Uuid>,
    kind: &'static str,
    value: i64,
}

impl From<&PriceRule> for RuleColumns {
    fn from(rule: &PriceRule) -> Self {
        let target = match rule.target {
            RuleTarget::Public => "public",
            RuleTarget::B2b => "b2b",
        };
        let (scope, category_id, supplier_id) = match rule.scope {
            RuleScope::All => ("all", None, None),
            RuleScope::Category { category_id } => ("category", Some(Uuid::from(category_id)), None),
            RuleScope::Supplier { supplier_id } => ("supplier", None, Some(Uuid::from(supplier_id))),
        };
        let (kind, value) = match rule.kind {
            RuleKind::Percent(bp) => ("percent", i64::from(bp)),
            RuleKind::Fixed(price) => ("fixed", price.cents()),
        };
        Self {
            target,
            scope,
            category_id,
            supplier_id,
            kind,
            value,
        }
    }
}

fn rule_from_row(row: &PgRow) -> LedgerResult<PriceRule> {
    let get = |e: sqlx::Error| map_sqlx_error("price_rule_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let target: String = row.try_get("target").map_err(get)?;
    let scope: String = row.try_get("scope").map_err(get)?;
    let category_id: Option<Uuid> = row.try_get("category_id").map_err(get)?;
    let supplier_id: Option<Uuid> = row.try_get("supplier_id").map_err(get)?;
    let kind: String = row.try_get("kind").map_err(get)?;
    let value: i64 = row.try_get("value").map_err(get)?;

    let target = match target.as_str() {
        "public" => RuleTarget::Public,
        "b2b" => RuleTarget::B2b,
        other => return Err(corrupt("rule target", other)),
    };
    let scope = match (scope.as_str(), category_id, supplier_id) {
        ("all", _, _) => RuleScope::All,
        ("category", Some(id), _) => RuleScope::Category {
            category_id: CategoryId::from(id),
        },
        ("supplier", _, Some(id)) => RuleScope::Supplier {
            supplier_id: SupplierId::from(id),
        },
        (other, _, _) => return Err(corrupt("rule scope", other)),
    };
    let kind = match kind.as_str() {
        "percent" => RuleKind::Percent(u32::try_from(value).map_err(|e| corrupt("percent value", e))?),
        "fixed" => RuleKind::Fixed(Money::from_cents(value)),
        other => return Err(corrupt("rule kind", other)),
    };

    Ok(PriceRule {
        id: PriceRuleId::from(id),
        name: row.try_get("name").map_err(get)?,
        target,
        scope,
        kind,
        priority: row.try_get("priority").map_err(get)?,
        active: row.try_get("active").map_err(get)?,
    })
}

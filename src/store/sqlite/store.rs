//! Sqlite-backed order store and telemetry sink.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::debug;

use crate::core::domain::{current_time_ms, Chain, ChainRecord, Order, OrderRecord};
use crate::error::{Error, Result};
use crate::store::{OrderStore, TelemetrySink};

use super::model::{ChainRow, OrderRow};
use super::schema::{chains, orders};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (or create) the database and run pending migrations.
    pub fn open(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        // Every pooled `:memory:` connection would be its own database, so
        // in-memory URLs get a single-connection pool.
        let max_size = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut conn = pool.get()?;
        diesel::sql_query("PRAGMA busy_timeout=5000").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| Error::Store(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn chain(&self, uid: &str) -> Result<Option<ChainRecord>> {
        let mut conn = self.pool.get()?;
        chains::table
            .find(uid)
            .first::<ChainRow>(&mut conn)
            .optional()?
            .map(ChainRecord::try_from)
            .transpose()
    }

    pub fn chain_count(&self) -> Result<i64> {
        let mut conn = self.pool.get()?;
        Ok(chains::table.count().get_result(&mut conn)?)
    }
}

impl OrderStore for SqliteStore {
    fn upsert(&self, order: &Order) -> Result<()> {
        let mut conn = self.pool.get()?;
        let record = OrderRecord::from(order);
        let mut row = OrderRow::from(&record);

        let previous = orders::table
            .find(&row.client_order_id)
            .first::<OrderRow>(&mut conn)
            .optional()?;

        if let Some(previous) = previous {
            // Preserve creation metadata across event updates; later events
            // often omit the hash8 and the fire timestamp.
            row.created_at_ms = previous.created_at_ms;
            row.updated_at_ms = current_time_ms();
            if row.arbitrage_hash8.is_none() {
                row.arbitrage_hash8 = previous.arbitrage_hash8;
            }
            if row.fired_at_ms.is_none() {
                row.fired_at_ms = previous.fired_at_ms;
            }
            diesel::update(orders::table.find(&row.client_order_id))
                .set(&row)
                .execute(&mut conn)?;
        } else {
            diesel::insert_into(orders::table)
                .values(&row)
                .execute(&mut conn)?;
        }
        debug!(client_order_id = %row.client_order_id, status = %row.status, "Order persisted");
        Ok(())
    }

    fn get(&self, client_order_id: &str) -> Result<Option<OrderRecord>> {
        let mut conn = self.pool.get()?;
        orders::table
            .find(client_order_id)
            .first::<OrderRow>(&mut conn)
            .optional()?
            .map(OrderRecord::try_from)
            .transpose()
    }
}

impl TelemetrySink for SqliteStore {
    fn record_chain(&self, chain: &Chain) -> Result<()> {
        let mut conn = self.pool.get()?;
        let row = ChainRow::try_from(&ChainRecord::from(chain))?;
        diesel::replace_into(chains::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    fn record_batch(&self, batch: &[Chain]) -> Result<()> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, Error, _>(|conn| {
            for chain in batch {
                let row = ChainRow::try_from(&ChainRecord::from(chain))?;
                diesel::replace_into(chains::table)
                    .values(&row)
                    .execute(conn)?;
            }
            Ok(())
        })
    }
}

// =============================================================================
// Order Store — append-only persistence for accepted fills (spec.md §6)
// =============================================================================
//
// Out-of-scope collaborator, specified only by the interface the core
// consumes: append a fill, scan every fill ever recorded. Grounded on
// `leemthai-sniper`'s sqlx usage for its own fill log, generalized from
// sqlite to postgres per the `dsn` connection string spec.md requires.
// =============================================================================

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::model::{PersistedOrder, Side};

/// Append-only order log: `orders(ts, market, type, price, size)`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &PersistedOrder) -> anyhow::Result<()>;
    async fn scan(&self) -> anyhow::Result<Vec<PersistedOrder>>;
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(dsn).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                ts     BIGINT NOT NULL,
                market TEXT NOT NULL,
                type   TEXT NOT NULL,
                price  DOUBLE PRECISION NOT NULL,
                size   BIGINT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &PersistedOrder) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO orders (ts, market, type, price, size) VALUES ($1, $2, $3, $4, $5)")
            .bind(order.ts)
            .bind(&order.market)
            .bind(order.kind.to_string())
            .bind(order.price)
            .bind(order.size as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scan(&self) -> anyhow::Result<Vec<PersistedOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT ts, market, type, price, size FROM orders ORDER BY ts")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(OrderRow::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    ts: i64,
    market: String,
    #[sqlx(rename = "type")]
    kind: String,
    price: f64,
    size: i64,
}

impl TryFrom<OrderRow> for PersistedOrder {
    type Error = anyhow::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "sell" => Side::Sell,
            "buy" => Side::Buy,
            other => anyhow::bail!("unknown order type in store: {other}"),
        };
        Ok(PersistedOrder {
            ts: row.ts,
            market: row.market,
            kind,
            price: row.price,
            size: row.size as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_row_round_trips_known_sides() {
        let row = OrderRow {
            ts: 1,
            market: "pi_ethusd".to_string(),
            kind: "sell".to_string(),
            price: 42.2,
            size: 1,
        };
        let order: PersistedOrder = row.try_into().unwrap();
        assert_eq!(order.kind, Side::Sell);
    }

    #[test]
    fn order_row_rejects_unknown_side() {
        let row = OrderRow {
            ts: 1,
            market: "pi_ethusd".to_string(),
            kind: "hold".to_string(),
            price: 42.2,
            size: 1,
        };
        let result: anyhow::Result<PersistedOrder> = row.try_into();
        assert!(result.is_err());
    }
}

use {
    crate::{
        config::PERSISTENCE,
        domain::Candle,
        models::{AlertRecord, Direction},
    },
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{
        ConnectOptions, Pool, QueryBuilder, Row, Sqlite,
        sqlite::{
            SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
            SqliteSynchronous,
        },
    },
    std::{str::FromStr, time::Duration},
};

#[async_trait]
pub trait MarketDataStorage: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    /// Returns the number of candles submitted. Duplicates are ignored.
    async fn insert_candles(&self, symbol: &str, interval: &str, candles: &[Candle])
    -> Result<u64>;
    /// The newest `limit` stored bars, oldest first.
    async fn load_recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>>;
    async fn load_candles(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
    ) -> Result<Vec<Candle>>;
    async fn insert_alert(&self, record: &AlertRecord) -> Result<()>;
    /// Any alert for symbol+direction detected at or after `since_ms`. With a
    /// price, only alerts within `tolerance_pct` of it count.
    async fn has_recent_alert(
        &self,
        symbol: &str,
        direction: Direction,
        since_ms: i64,
        price: Option<f64>,
        tolerance_pct: f64,
    ) -> Result<bool>;
    async fn latest_alert(
        &self,
        symbol: &str,
        direction: Direction,
        since_ms: i64,
    ) -> Result<Option<AlertRecord>>;
}

pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    pub async fn new(db_path: &str) -> Result<Self> {
        let db = &PERSISTENCE.database;
        let connection_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(db.busy_timeout_ms))
            .synchronous(SqliteSynchronous::Normal)
            .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(db.max_connections)
            .connect_with(connection_options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path))?;

        Ok(Self { pool })
    }
}

fn candle_from_row(row: &SqliteRow) -> Result<Candle> {
    Ok(Candle {
        open_time: row.try_get("open_time")?,
        close_time: row.try_get("close_time")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
        is_final: true,
    })
}

fn alert_from_row(row: &SqliteRow) -> Result<AlertRecord> {
    let direction: String = row.try_get("direction")?;
    Ok(AlertRecord {
        alert_id: row.try_get("alert_id")?,
        symbol: row.try_get("symbol")?,
        interval_ms: row.try_get("interval_ms")?,
        direction: Direction::from_str(&direction)
            .with_context(|| format!("Unknown direction {} in breakout_alerts", direction))?,
        breakout_price: row.try_get("breakout_price")?,
        upper_bound: row.try_get("upper_bound")?,
        lower_bound: row.try_get("lower_bound")?,
        center_price: row.try_get("center_price")?,
        magnitude_pct: row.try_get("magnitude_pct")?,
        volume_ratio: row.try_get("volume_ratio")?,
        range_start_time: row.try_get("range_start_time")?,
        range_end_time: row.try_get("range_end_time")?,
        candle_count: row.try_get("candle_count")?,
        score_total: row.try_get("score_total")?,
        detected_at: row.try_get("detected_at")?,
    })
}

#[async_trait]
impl MarketDataStorage for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS klines (
                symbol TEXT NOT NULL,
                interval TEXT NOT NULL,
                open_time INTEGER NOT NULL,
                close_time INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, interval, open_time)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create klines table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS breakout_alerts (
                alert_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                interval_ms INTEGER NOT NULL,
                direction TEXT NOT NULL,
                breakout_price REAL NOT NULL,
                upper_bound REAL NOT NULL,
                lower_bound REAL NOT NULL,
                center_price REAL NOT NULL,
                magnitude_pct REAL NOT NULL,
                volume_ratio REAL NOT NULL,
                range_start_time INTEGER NOT NULL,
                range_end_time INTEGER NOT NULL,
                candle_count INTEGER NOT NULL,
                score_total REAL NOT NULL,
                detected_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create breakout_alerts table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_alerts_symbol_dir_time \
             ON breakout_alerts (symbol, direction, detected_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Batches candles so each statement stays within SQLite's parameter limit.
    async fn insert_candles(
        &self,
        symbol: &str,
        interval: &str,
        candles: &[Candle],
    ) -> Result<u64> {
        if candles.is_empty() {
            return Ok(0);
        }

        for chunk in candles.chunks(PERSISTENCE.database.insert_chunk_rows) {
            let mut query_builder = QueryBuilder::new(
                "INSERT OR IGNORE INTO klines (symbol, interval, open_time, close_time, open, high, low, close, volume) ",
            );

            query_builder.push_values(chunk, |mut b, c| {
                b.push_bind(symbol)
                    .push_bind(interval)
                    .push_bind(c.open_time)
                    .push_bind(c.close_time)
                    .push_bind(c.open)
                    .push_bind(c.high)
                    .push_bind(c.low)
                    .push_bind(c.close)
                    .push_bind(c.volume);
            });

            query_builder.build().execute(&self.pool).await?;
        }

        Ok(candles.len() as u64)
    }

    async fn load_recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT open_time, close_time, open, high, low, close, volume
            FROM klines
            WHERE symbol = ? AND interval = ?
            ORDER BY open_time DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = rows.iter().map(candle_from_row).collect::<Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }

    async fn load_candles(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT open_time, close_time, open, high, low, close, volume
            FROM klines
            WHERE symbol = ? AND interval = ? AND open_time >= ?
            ORDER BY open_time ASC
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .bind(start_time.unwrap_or(i64::MIN))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(candle_from_row).collect()
    }

    async fn insert_alert(&self, r: &AlertRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO breakout_alerts (
                alert_id, symbol, interval_ms, direction, breakout_price,
                upper_bound, lower_bound, center_price, magnitude_pct, volume_ratio,
                range_start_time, range_end_time, candle_count, score_total, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.alert_id)
        .bind(&r.symbol)
        .bind(r.interval_ms)
        .bind(r.direction.to_string())
        .bind(r.breakout_price)
        .bind(r.upper_bound)
        .bind(r.lower_bound)
        .bind(r.center_price)
        .bind(r.magnitude_pct)
        .bind(r.volume_ratio)
        .bind(r.range_start_time)
        .bind(r.range_end_time)
        .bind(r.candle_count)
        .bind(r.score_total)
        .bind(r.detected_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store alert {} for {}", r.alert_id, r.symbol))?;
        Ok(())
    }

    async fn has_recent_alert(
        &self,
        symbol: &str,
        direction: Direction,
        since_ms: i64,
        price: Option<f64>,
        tolerance_pct: f64,
    ) -> Result<bool> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS hits FROM breakout_alerts WHERE symbol = ",
        );
        query
            .push_bind(symbol)
            .push(" AND direction = ")
            .push_bind(direction.to_string())
            .push(" AND detected_at >= ")
            .push_bind(since_ms);
        if let Some(price) = price {
            query
                .push(" AND ABS(breakout_price - ")
                .push_bind(price)
                .push(") <= ")
                .push_bind(price.abs() * tolerance_pct / 100.0);
        }

        let row = query.build().fetch_one(&self.pool).await?;
        let hits: i64 = row.try_get("hits")?;
        Ok(hits > 0)
    }

    async fn latest_alert(
        &self,
        symbol: &str,
        direction: Direction,
        since_ms: i64,
    ) -> Result<Option<AlertRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM breakout_alerts
            WHERE symbol = ? AND direction = ? AND detected_at >= ?
            ORDER BY detected_at DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(direction.to_string())
        .bind(since_ms)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(alert_from_row).transpose()
    }
}

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error};

use super::{offset, total_pages, InventoryStore};
use crate::models::{normalize_region, Page, Ticket, TicketDetail};
use crate::utils::{AppError, AppResult};

const TICKET_COLUMNS: &str = "id, capacity, region, event_date, created_at, updated_at, deleted_at";
const DETAIL_COLUMNS: &str =
    "id, ticket_id, level, stock, base_price, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the row query and the count concurrently. A failed count is
    /// logged and reported as zero; a failed row query fails the call.
    async fn paginate<T>(&self, table: &str, columns: &str, page: i64, size: i64) -> AppResult<Page<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let rows_sql = format!("SELECT {columns} FROM {table} ORDER BY id LIMIT $1 OFFSET $2");
        let count_sql = format!("SELECT COUNT(*) FROM {table}");

        let rows = sqlx::query_as::<_, T>(&rows_sql)
            .bind(size)
            .bind(offset(page, size))
            .fetch_all(&self.pool);
        let count = sqlx::query_scalar::<_, i64>(&count_sql).fetch_one(&self.pool);

        let (rows, count) = tokio::join!(rows, count);

        let total = count.unwrap_or_else(|e| {
            error!(table, error = %e, "Failed to count rows");
            0
        });
        let items = rows.map_err(|e| {
            error!(table, page, size, error = %e, "Failed to list rows");
            AppError::from(e)
        })?;

        Ok(Page {
            items,
            total,
            pages: total_pages(total, size),
        })
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn find_ticket_by_id(&self, id: i64) -> AppResult<Ticket> {
        sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(ticket_id = id, error = %e, "Failed to get ticket by id");
                AppError::from(e)
            })?
            .ok_or_else(|| AppError::NotFound(format!("ticket {id} not found")))
    }

    async fn find_ticket_by_region(&self, region: &str) -> AppResult<Ticket> {
        let region = normalize_region(region);
        sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE region = $1 ORDER BY id LIMIT 1"
        ))
        .bind(&region)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(region = %region, error = %e, "Failed to get ticket by region");
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound(format!("ticket for region '{region}' not found")))
    }

    async fn find_details_by_ticket(&self, ticket_id: i64) -> AppResult<Vec<TicketDetail>> {
        sqlx::query_as::<_, TicketDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM ticket_details WHERE ticket_id = $1 ORDER BY id"
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(ticket_id, error = %e, "Failed to get ticket details by ticket id");
            AppError::from(e)
        })
    }

    async fn find_detail(&self, id: i64) -> AppResult<TicketDetail> {
        sqlx::query_as::<_, TicketDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM ticket_details WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(ticket_detail_id = id, error = %e, "Failed to get ticket detail");
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound(format!("ticket detail {id} not found")))
    }

    async fn list_tickets(&self, page: i64, size: i64) -> AppResult<Page<Ticket>> {
        self.paginate("tickets", TICKET_COLUMNS, page, size).await
    }

    async fn list_details(&self, page: i64, size: i64) -> AppResult<Page<TicketDetail>> {
        self.paginate("ticket_details", DETAIL_COLUMNS, page, size).await
    }

    async fn update_detail_stock(&self, detail_id: i64, delta: i64) -> AppResult<TicketDetail> {
        // Every early return below drops `tx`, which rolls it back.
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction");
            AppError::internal("error starting transaction")
        })?;

        let locked = sqlx::query_as::<_, TicketDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM ticket_details WHERE id = $1 FOR UPDATE"
        ))
        .bind(detail_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!(ticket_detail_id = detail_id, error = %e, "Failed to lock ticket detail");
            AppError::internal("error locking rows")
        })?
        .ok_or_else(|| AppError::NotFound(format!("ticket detail {detail_id} not found")))?;

        let new_stock = locked
            .stock
            .checked_add(delta)
            .ok_or_else(|| AppError::bad_request("Invalid Total Ticket"))?;
        if new_stock < 0 {
            return Err(AppError::bad_request("stock not enough"));
        }

        let updated = sqlx::query_as::<_, TicketDetail>(&format!(
            "UPDATE ticket_details SET stock = $1, updated_at = clock_timestamp() WHERE id = $2 \
             RETURNING {DETAIL_COLUMNS}"
        ))
        .bind(new_stock)
        .bind(detail_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!(ticket_detail_id = detail_id, error = %e, "Failed to update ticket detail");
            AppError::internal("error updating ticket detail")
        })?;

        tx.commit().await.map_err(|e| {
            error!(ticket_detail_id = detail_id, error = %e, "Failed to commit transaction");
            AppError::internal("error committing transaction")
        })?;

        debug!(
            ticket_detail_id = detail_id,
            previous = locked.stock,
            stock = updated.stock,
            "Ticket detail stock updated"
        );
        Ok(updated)
    }
}

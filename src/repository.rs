use crate::{
    auth::AuthUser,
    error::RepositoryResult,
    models::{
        Product, SalesCase, SalesCaseCreate, SalesCaseFilter, SalesCaseItem, SalesCaseReturnReport,
        SalesCaseReturnRequest, SalesCaseStatus, User,
    },
    reconciliation,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction, query_builder::QueryBuilder};
use std::{collections::HashMap, sync::Arc};

/// Repository Trait
///
/// The CRUD layer behind the sales case router: persistence plus the business rules of
/// the case lifecycle. Handlers only see this contract, so the Postgres implementation
/// can be swapped for the in-memory one in tests.
///
/// Business-rule violations come back as `RepositoryError::Validation`, ownership
/// violations as `RepositoryError::Permission`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- User/Auth ---
    async fn get_user(&self, id: i64) -> Option<User>;

    // --- Sales Cases ---
    /// Consigns stock to a sales rep. Fails without touching stock if any line is invalid.
    async fn create_sales_case(&self, req: SalesCaseCreate) -> RepositoryResult<SalesCase>;
    /// Lists cases visible to `user`, newest first. Sales reps are always scoped to their own.
    async fn get_sales_cases(
        &self,
        user: &AuthUser,
        filter: SalesCaseFilter,
    ) -> RepositoryResult<Vec<SalesCase>>;
    /// Plain lookup by id. Ownership is checked by the caller.
    async fn get_sales_case(&self, id: i64) -> RepositoryResult<Option<SalesCase>>;
    /// Closes a case: records sold/returned units and puts the returned units back in stock.
    async fn process_sales_case_return(
        &self,
        case_id: i64,
        req: SalesCaseReturnRequest,
        user: &AuthUser,
    ) -> RepositoryResult<SalesCaseReturnReport>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const CASE_COLUMNS: &str = "id, sales_rep_id, status, notes, created_at, returned_at";
const ITEM_COLUMNS: &str =
    "id, sales_case_id, product_id, quantity_assigned, quantity_returned, quantity_sold, unit_price";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Every mutating operation runs in one transaction.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, case_ids: &[i64]) -> RepositoryResult<HashMap<i64, Vec<SalesCaseItem>>> {
        let items = sqlx::query_as::<_, SalesCaseItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM sales_case_items WHERE sales_case_id = ANY($1) ORDER BY product_id"
        ))
        .bind(case_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<SalesCaseItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.sales_case_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn lock_product(
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
    ) -> RepositoryResult<Product> {
        sqlx::query_as::<_, Product>(
            "SELECT id, name, unit_price, stock_quantity FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| reconciliation::product_not_found(product_id))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_user
    ///
    /// Retrieves the identity and role needed by the auth extractor.
    async fn get_user(&self, id: i64) -> Option<User> {
        sqlx::query_as::<_, User>("SELECT id, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    /// create_sales_case
    ///
    /// Product rows are locked in ascending id order, checked, then decremented. The case
    /// and its items are inserted in the same transaction, so a rejected line rolls
    /// everything back.
    async fn create_sales_case(&self, req: SalesCaseCreate) -> RepositoryResult<SalesCase> {
        let lines = reconciliation::validate_case_items(&req.items)?;

        let mut tx = self.pool.begin().await?;

        let rep = sqlx::query_as::<_, User>("SELECT id, email, role FROM users WHERE id = $1")
            .bind(req.sales_rep_id)
            .fetch_optional(&mut *tx)
            .await?;
        reconciliation::ensure_sales_rep(rep.as_ref(), req.sales_rep_id)?;

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = Self::lock_product(&mut tx, line.product_id).await?;
            reconciliation::ensure_stock(&product, line.quantity)?;
            priced.push((line, product.unit_price));
        }

        for (line, _) in &priced {
            sqlx::query("UPDATE products SET stock_quantity = stock_quantity - $1 WHERE id = $2")
                .bind(line.quantity)
                .bind(line.product_id)
                .execute(&mut *tx)
                .await?;
        }

        let mut case = sqlx::query_as::<_, SalesCase>(&format!(
            "INSERT INTO sales_cases (sales_rep_id, status, notes) VALUES ($1, $2, $3) RETURNING {CASE_COLUMNS}"
        ))
        .bind(req.sales_rep_id)
        .bind(SalesCaseStatus::Active)
        .bind(req.notes)
        .fetch_one(&mut *tx)
        .await?;

        for (line, unit_price) in priced {
            let item = sqlx::query_as::<_, SalesCaseItem>(&format!(
                "INSERT INTO sales_case_items (sales_case_id, product_id, quantity_assigned, unit_price) \
                 VALUES ($1, $2, $3, $4) RETURNING {ITEM_COLUMNS}"
            ))
            .bind(case.id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(unit_price)
            .fetch_one(&mut *tx)
            .await?;
            case.items.push(item);
        }

        tx.commit().await?;
        Ok(case)
    }

    /// get_sales_cases
    ///
    /// Builds the filter with QueryBuilder so every value is bound, never interpolated.
    async fn get_sales_cases(
        &self,
        user: &AuthUser,
        filter: SalesCaseFilter,
    ) -> RepositoryResult<Vec<SalesCase>> {
        let filter = filter.scoped_to(user);

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {CASE_COLUMNS} FROM sales_cases WHERE TRUE"));

        if let Some(rep_id) = filter.sales_rep_id {
            builder.push(" AND sales_rep_id = ");
            builder.push_bind(rep_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let mut cases = builder
            .build_query_as::<SalesCase>()
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = cases.iter().map(|c| c.id).collect();
        let mut items = self.load_items(&ids).await?;
        for case in &mut cases {
            case.items = items.remove(&case.id).unwrap_or_default();
        }
        Ok(cases)
    }

    async fn get_sales_case(&self, id: i64) -> RepositoryResult<Option<SalesCase>> {
        let case = sqlx::query_as::<_, SalesCase>(&format!(
            "SELECT {CASE_COLUMNS} FROM sales_cases WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut case) = case else {
            return Ok(None);
        };
        case.items = self.load_items(&[id]).await?.remove(&id).unwrap_or_default();
        Ok(Some(case))
    }

    /// process_sales_case_return
    ///
    /// The case row is locked first, so two concurrent returns of the same case
    /// serialise and the second one sees `RETURNED`.
    async fn process_sales_case_return(
        &self,
        case_id: i64,
        req: SalesCaseReturnRequest,
        user: &AuthUser,
    ) -> RepositoryResult<SalesCaseReturnReport> {
        let mut tx = self.pool.begin().await?;

        let case = sqlx::query_as::<_, SalesCase>(&format!(
            "SELECT {CASE_COLUMNS} FROM sales_cases WHERE id = $1 FOR UPDATE"
        ))
        .bind(case_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| reconciliation::case_not_found(case_id))?;

        reconciliation::ensure_returnable(&case, user)?;

        let items = sqlx::query_as::<_, SalesCaseItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM sales_case_items WHERE sales_case_id = $1 ORDER BY product_id"
        ))
        .bind(case_id)
        .fetch_all(&mut *tx)
        .await?;

        let lines = reconciliation::reconcile_return(&items, &req)?;

        for line in &lines {
            sqlx::query(
                "UPDATE sales_case_items SET quantity_returned = $1, quantity_sold = $2 \
                 WHERE sales_case_id = $3 AND product_id = $4",
            )
            .bind(line.quantity_returned)
            .bind(line.quantity_sold)
            .bind(case_id)
            .bind(line.product_id)
            .execute(&mut *tx)
            .await?;

            if line.quantity_returned > 0 {
                sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $1 WHERE id = $2")
                    .bind(line.quantity_returned)
                    .bind(line.product_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let returned_at: DateTime<Utc> = sqlx::query_scalar(
            "UPDATE sales_cases SET status = $1, returned_at = NOW() WHERE id = $2 RETURNING returned_at",
        )
        .bind(SalesCaseStatus::Returned)
        .bind(case_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(reconciliation::build_report(&case, returned_at, lines))
    }
}

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    auth::AuthUser,
    error::RepositoryResult,
    models::{
        Product, SalesCase, SalesCaseCreate, SalesCaseFilter, SalesCaseItem, SalesCaseReturnReport,
        SalesCaseReturnRequest, SalesCaseStatus, User,
    },
    reconciliation,
    repository::Repository,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<i64, User>,
    products: HashMap<i64, Product>,
    cases: BTreeMap<i64, SalesCase>,
    next_case_id: i64,
    next_item_id: i64,
}

/// InMemoryRepository
///
/// `Repository` kept entirely in process memory. It applies the same rules as the
/// Postgres implementation; the write lock plays the role of the transaction.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    pub async fn product(&self, id: i64) -> Option<Product> {
        self.state.read().await.products.get(&id).cloned()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> Option<User> {
        self.state.read().await.users.get(&id).cloned()
    }

    async fn create_sales_case(&self, req: SalesCaseCreate) -> RepositoryResult<SalesCase> {
        let lines = reconciliation::validate_case_items(&req.items)?;

        let mut state = self.state.write().await;
        reconciliation::ensure_sales_rep(state.users.get(&req.sales_rep_id), req.sales_rep_id)?;

        // Check every line before moving any stock.
        let mut prices = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = state
                .products
                .get(&line.product_id)
                .ok_or_else(|| reconciliation::product_not_found(line.product_id))?;
            reconciliation::ensure_stock(product, line.quantity)?;
            prices.push(product.unit_price);
        }

        state.next_case_id += 1;
        let case_id = state.next_case_id;

        let mut items = Vec::with_capacity(lines.len());
        for (line, unit_price) in lines.iter().zip(prices) {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock_quantity -= line.quantity;
            }
            state.next_item_id += 1;
            items.push(SalesCaseItem {
                id: state.next_item_id,
                sales_case_id: case_id,
                product_id: line.product_id,
                quantity_assigned: line.quantity,
                quantity_returned: None,
                quantity_sold: None,
                unit_price,
            });
        }

        let case = SalesCase {
            id: case_id,
            sales_rep_id: req.sales_rep_id,
            status: SalesCaseStatus::Active,
            notes: req.notes,
            created_at: Utc::now(),
            returned_at: None,
            items,
        };
        state.cases.insert(case_id, case.clone());
        Ok(case)
    }

    async fn get_sales_cases(
        &self,
        user: &AuthUser,
        filter: SalesCaseFilter,
    ) -> RepositoryResult<Vec<SalesCase>> {
        let filter = filter.scoped_to(user);
        let state = self.state.read().await;
        // Ids grow with creation time, so reverse id order is newest first.
        Ok(state
            .cases
            .values()
            .rev()
            .filter(|case| filter.matches(case))
            .cloned()
            .collect())
    }

    async fn get_sales_case(&self, id: i64) -> RepositoryResult<Option<SalesCase>> {
        Ok(self.state.read().await.cases.get(&id).cloned())
    }

    async fn process_sales_case_return(
        &self,
        case_id: i64,
        req: SalesCaseReturnRequest,
        user: &AuthUser,
    ) -> RepositoryResult<SalesCaseReturnReport> {
        let mut state = self.state.write().await;

        let case = state
            .cases
            .get(&case_id)
            .cloned()
            .ok_or_else(|| reconciliation::case_not_found(case_id))?;
        reconciliation::ensure_returnable(&case, user)?;

        let lines = reconciliation::reconcile_return(&case.items, &req)?;
        let returned_at = Utc::now();

        for line in &lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock_quantity += line.quantity_returned;
            }
        }

        if let Some(stored) = state.cases.get_mut(&case_id) {
            for item in &mut stored.items {
                if let Some(line) = lines.iter().find(|l| l.product_id == item.product_id) {
                    item.quantity_returned = Some(line.quantity_returned);
                    item.quantity_sold = Some(line.quantity_sold);
                }
            }
            stored.status = SalesCaseStatus::Returned;
            stored.returned_at = Some(returned_at);
        }

        Ok(reconciliation::build_report(&case, returned_at, lines))
    }
}

//! Business rules of the sales case lifecycle.
//!
//! Everything here is pure: the repositories load rows, call into these functions and
//! only write once every rule has passed, so a rejected request never moves stock.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    auth::AuthUser,
    error::{RepositoryError, RepositoryResult},
    models::{
        Product, ReturnReportLine, SalesCase, SalesCaseFilter, SalesCaseItem, SalesCaseItemCreate,
        SalesCaseReturnReport, SalesCaseReturnRequest, SalesCaseStatus, User, UserRole,
    },
};

impl SalesCaseFilter {
    /// The filter actually applied for `user`. A sales rep is pinned to their own cases
    /// whatever `sales_rep_id` they asked for.
    pub fn scoped_to(&self, user: &AuthUser) -> SalesCaseFilter {
        match user.role {
            UserRole::Admin => self.clone(),
            UserRole::SalesRep => SalesCaseFilter {
                status: self.status,
                sales_rep_id: Some(user.id),
            },
        }
    }

    pub fn matches(&self, case: &SalesCase) -> bool {
        self.status.is_none_or(|s| s == case.status)
            && self.sales_rep_id.is_none_or(|id| id == case.sales_rep_id)
    }
}

/// Checks the shape of a creation payload and returns the lines sorted by product id,
/// which is also the order row locks are taken in.
pub fn validate_case_items(items: &[SalesCaseItemCreate]) -> RepositoryResult<Vec<SalesCaseItemCreate>> {
    if items.is_empty() {
        return Err(RepositoryError::validation(
            "A sales case must contain at least one item",
        ));
    }

    let mut seen = HashSet::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(RepositoryError::validation(format!(
                "Quantity for product {} must be greater than zero",
                item.product_id
            )));
        }
        if !seen.insert(item.product_id) {
            return Err(RepositoryError::validation(format!(
                "Product {} is listed more than once",
                item.product_id
            )));
        }
    }

    let mut sorted = items.to_vec();
    sorted.sort_by_key(|item| item.product_id);
    Ok(sorted)
}

/// Only existing users with the `SALES_REP` role can receive a case.
pub fn ensure_sales_rep(user: Option<&User>, sales_rep_id: i64) -> RepositoryResult<()> {
    match user {
        Some(user) if user.role == UserRole::SalesRep => Ok(()),
        _ => Err(RepositoryError::validation(format!(
            "Invalid sales representative: {}",
            sales_rep_id
        ))),
    }
}

pub fn ensure_stock(product: &Product, requested: i32) -> RepositoryResult<()> {
    if product.stock_quantity < requested {
        return Err(RepositoryError::validation(format!(
            "Insufficient stock for product '{}': requested {}, available {}",
            product.name, requested, product.stock_quantity
        )));
    }
    Ok(())
}

pub fn product_not_found(product_id: i64) -> RepositoryError {
    RepositoryError::validation(format!("Product {} not found", product_id))
}

pub fn case_not_found(case_id: i64) -> RepositoryError {
    RepositoryError::validation(format!("Sales case {} not found", case_id))
}

/// Preconditions of a return: the caller owns the case (or is admin) and the case is
/// still active.
pub fn ensure_returnable(case: &SalesCase, user: &AuthUser) -> RepositoryResult<()> {
    if !user.can_access(case.sales_rep_id) {
        return Err(RepositoryError::permission(
            "Not authorized to return this sales case",
        ));
    }
    if case.status != SalesCaseStatus::Active {
        return Err(RepositoryError::validation(format!(
            "Sales case {} has already been returned",
            case.id
        )));
    }
    Ok(())
}

/// Computes sold vs returned units for every line of the case.
///
/// Lines of the case missing from the request come back with zero returned units.
/// The result follows the order of `items`.
pub fn reconcile_return(
    items: &[SalesCaseItem],
    request: &SalesCaseReturnRequest,
) -> RepositoryResult<Vec<ReturnReportLine>> {
    let assigned: HashMap<i64, &SalesCaseItem> =
        items.iter().map(|item| (item.product_id, item)).collect();

    let mut returned: HashMap<i64, i32> = HashMap::new();
    for line in &request.items {
        let Some(item) = assigned.get(&line.product_id) else {
            return Err(RepositoryError::validation(format!(
                "Product {} is not part of this sales case",
                line.product_id
            )));
        };
        if line.quantity_returned < 0 {
            return Err(RepositoryError::validation(format!(
                "Returned quantity for product {} cannot be negative",
                line.product_id
            )));
        }
        if line.quantity_returned > item.quantity_assigned {
            return Err(RepositoryError::validation(format!(
                "Returned quantity for product {} ({}) exceeds the assigned quantity ({})",
                line.product_id, line.quantity_returned, item.quantity_assigned
            )));
        }
        if returned.insert(line.product_id, line.quantity_returned).is_some() {
            return Err(RepositoryError::validation(format!(
                "Product {} is listed more than once",
                line.product_id
            )));
        }
    }

    Ok(items
        .iter()
        .map(|item| {
            let quantity_returned = returned.get(&item.product_id).copied().unwrap_or(0);
            let quantity_sold = item.quantity_assigned - quantity_returned;
            ReturnReportLine {
                product_id: item.product_id,
                quantity_assigned: item.quantity_assigned,
                quantity_returned,
                quantity_sold,
                unit_price: item.unit_price,
                line_total: Decimal::from(quantity_sold) * item.unit_price,
            }
        })
        .collect())
}

/// Aggregates reconciled lines into the report returned to the caller.
pub fn build_report(
    case: &SalesCase,
    returned_at: DateTime<Utc>,
    lines: Vec<ReturnReportLine>,
) -> SalesCaseReturnReport {
    let total_units_sold = lines.iter().map(|l| i64::from(l.quantity_sold)).sum();
    let total_units_returned = lines.iter().map(|l| i64::from(l.quantity_returned)).sum();
    let total_sales_value = lines.iter().map(|l| l.line_total).sum();

    SalesCaseReturnReport {
        sales_case_id: case.id,
        sales_rep_id: case.sales_rep_id,
        status: SalesCaseStatus::Returned,
        returned_at,
        lines,
        total_units_sold,
        total_units_returned,
        total_sales_value,
    }
}

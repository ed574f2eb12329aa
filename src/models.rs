use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Enumerations (Mapped to Postgres enum types) ---

/// UserRole
///
/// The RBAC field of a user. Stored as the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum UserRole {
    Admin,
    SalesRep,
}

/// SalesCaseStatus
///
/// A case is `ACTIVE` from creation until its return is processed, then `RETURNED`.
/// There is no way back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "sales_case_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SalesCaseStatus {
    #[default]
    Active,
    Returned,
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Identity record from the `users` table, resolved during authentication.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
}

/// Product
///
/// A stock-keeping item from the `products` table. `stock_quantity` is the warehouse
/// stock that is not currently consigned to any sales case.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[ts(type = "string")]
    pub unit_price: Decimal,
    pub stock_quantity: i32,
}

/// SalesCaseItem
///
/// One product line of a case. `quantity_returned` and `quantity_sold` stay empty until
/// the case is returned.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct SalesCaseItem {
    pub id: i64,
    pub sales_case_id: i64,
    pub product_id: i64,
    pub quantity_assigned: i32,
    pub quantity_returned: Option<i32>,
    pub quantity_sold: Option<i32>,
    // Price snapshot taken when the stock was consigned.
    #[ts(type = "string")]
    pub unit_price: Decimal,
}

/// SalesCase
///
/// A stock consignment assigned to a sales representative (`sales_cases` table).
/// The `items` are loaded with a second query and attached by the repository.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SalesCase {
    pub id: i64,
    // FK to users.id (Owner).
    pub sales_rep_id: i64,
    pub status: SalesCaseStatus,
    pub notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub returned_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub items: Vec<SalesCaseItem>,
}

// --- Request Payloads (Input Schemas) ---

/// SalesCaseItemCreate
///
/// A product and the quantity taken out of stock for the case.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SalesCaseItemCreate {
    pub product_id: i64,
    #[schema(example = 10)]
    pub quantity: i32,
}

/// SalesCaseCreate
///
/// Input payload for POST /sales-cases.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SalesCaseCreate {
    pub sales_rep_id: i64,
    pub items: Vec<SalesCaseItemCreate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// SalesCaseReturnItem
///
/// How many units of a product come back to the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SalesCaseReturnItem {
    pub product_id: i64,
    pub quantity_returned: i32,
}

/// SalesCaseReturnRequest
///
/// Input payload for POST /sales-cases/{case_id}/return.
/// Products of the case that are not listed are considered fully sold.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SalesCaseReturnRequest {
    #[serde(default)]
    pub items: Vec<SalesCaseReturnItem>,
}

// --- Query Filters ---

/// SalesCaseFilter
///
/// Accepted query parameters for GET /sales-cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SalesCaseFilter {
    /// Only cases in this status.
    pub status: Option<SalesCaseStatus>,
    /// Only cases of this sales representative (admins only; ignored for sales reps).
    pub sales_rep_id: Option<i64>,
}

// --- Reports (Output) ---

/// ReturnReportLine
///
/// Reconciliation result for one product line of a returned case.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct ReturnReportLine {
    pub product_id: i64,
    pub quantity_assigned: i32,
    pub quantity_returned: i32,
    pub quantity_sold: i32,
    #[ts(type = "string")]
    pub unit_price: Decimal,
    /// `quantity_sold * unit_price`.
    #[ts(type = "string")]
    pub line_total: Decimal,
}

/// SalesCaseReturnReport
///
/// Output of the return processing: what was sold, what went back to stock and the
/// resulting sales value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SalesCaseReturnReport {
    pub sales_case_id: i64,
    pub sales_rep_id: i64,
    pub status: SalesCaseStatus,
    #[ts(type = "string")]
    pub returned_at: DateTime<Utc>,
    pub lines: Vec<ReturnReportLine>,
    pub total_units_sold: i64,
    pub total_units_returned: i64,
    #[ts(type = "string")]
    pub total_sales_value: Decimal,
}

/// ErrorDetail
///
/// Body of every error response: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct ErrorDetail {
    pub detail: String,
}

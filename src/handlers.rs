use crate::{
    AppState,
    auth::{RequireAdmin, RequireAdminOrSalesRep},
    error::ApiError,
    extract::{Json, Path, Query},
    models::{
        ErrorDetail, SalesCase, SalesCaseCreate, SalesCaseFilter, SalesCaseReturnReport,
        SalesCaseReturnRequest,
    },
};
use axum::{extract::State, http::StatusCode};

// --- Handlers ---

/// create_sales_case
///
/// [Admin Route] Consigns stock to a sales representative.
///
/// Stock checks and the transactional insert happen in the repository; business-rule
/// violations (insufficient stock, invalid rep) come back as 400 with their message.
#[utoipa::path(
    post,
    path = "/sales-cases",
    tag = "Sales Cases",
    request_body = SalesCaseCreate,
    responses(
        (status = 201, description = "Created", body = SalesCase),
        (status = 400, description = "Business rule violation", body = ErrorDetail),
        (status = 401, description = "Unauthenticated", body = ErrorDetail),
        (status = 403, description = "Not an admin", body = ErrorDetail),
        (status = 422, description = "Malformed request body", body = ErrorDetail)
    )
)]
pub async fn create_sales_case(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SalesCaseCreate>,
) -> Result<(StatusCode, Json<SalesCase>), ApiError> {
    let sales_rep_id = payload.sales_rep_id;
    match state.repo.create_sales_case(payload).await {
        Ok(case) => {
            tracing::info!(
                case_id = case.id,
                sales_rep_id,
                admin_id = admin.id,
                "sales case created"
            );
            Ok((StatusCode::CREATED, Json(case)))
        }
        Err(e) => {
            tracing::warn!(sales_rep_id, "sales case creation rejected: {}", e);
            Err(e.into())
        }
    }
}

/// list_sales_cases
///
/// [Authenticated Route] Lists sales cases.
/// - Admins see every case and may filter by `sales_rep_id` and `status`.
/// - Sales reps only ever see their own cases; the repository ignores any other
///   `sales_rep_id` they pass.
#[utoipa::path(
    get,
    path = "/sales-cases",
    tag = "Sales Cases",
    params(SalesCaseFilter),
    responses(
        (status = 200, description = "Sales cases", body = [SalesCase]),
        (status = 400, description = "Malformed query string", body = ErrorDetail),
        (status = 401, description = "Unauthenticated", body = ErrorDetail)
    )
)]
pub async fn list_sales_cases(
    RequireAdminOrSalesRep(user): RequireAdminOrSalesRep,
    State(state): State<AppState>,
    Query(filter): Query<SalesCaseFilter>,
) -> Result<Json<Vec<SalesCase>>, ApiError> {
    let cases = state.repo.get_sales_cases(&user, filter).await?;
    Ok(Json(cases))
}

/// get_sales_case
///
/// [Authenticated Route] Details of a single case.
///
/// *Authorization*: a sales rep asking for someone else's case gets 403.
#[utoipa::path(
    get,
    path = "/sales-cases/{case_id}",
    tag = "Sales Cases",
    params(("case_id" = i64, Path, description = "Sales case ID")),
    responses(
        (status = 200, description = "Found", body = SalesCase),
        (status = 400, description = "Malformed case id", body = ErrorDetail),
        (status = 403, description = "Not the owner", body = ErrorDetail),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn get_sales_case(
    RequireAdminOrSalesRep(user): RequireAdminOrSalesRep,
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
) -> Result<Json<SalesCase>, ApiError> {
    let case = state
        .repo
        .get_sales_case(case_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Sales case not found"))?;

    if !user.can_access(case.sales_rep_id) {
        return Err(ApiError::forbidden("Not authorized to view this sales case"));
    }

    Ok(Json(case))
}

/// return_sales_case
///
/// [Authenticated Route] Closes a case: records what was sold and returns the
/// remaining units to stock. Runs as a single transaction in the repository.
#[utoipa::path(
    post,
    path = "/sales-cases/{case_id}/return",
    tag = "Sales Cases",
    params(("case_id" = i64, Path, description = "Sales case ID")),
    request_body = SalesCaseReturnRequest,
    responses(
        (status = 200, description = "Return processed", body = SalesCaseReturnReport),
        (status = 400, description = "Business rule violation", body = ErrorDetail),
        (status = 403, description = "Not the owner", body = ErrorDetail),
        (status = 422, description = "Malformed request body", body = ErrorDetail)
    )
)]
pub async fn return_sales_case(
    RequireAdminOrSalesRep(user): RequireAdminOrSalesRep,
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    Json(payload): Json<SalesCaseReturnRequest>,
) -> Result<Json<SalesCaseReturnReport>, ApiError> {
    match state
        .repo
        .process_sales_case_return(case_id, payload, &user)
        .await
    {
        Ok(report) => {
            tracing::info!(
                case_id,
                user_id = user.id,
                units_sold = report.total_units_sold,
                units_returned = report.total_units_returned,
                "sales case returned"
            );
            Ok(Json(report))
        }
        Err(e) => {
            tracing::warn!(case_id, user_id = user.id, "sales case return rejected: {}", e);
            Err(e.into())
        }
    }
}

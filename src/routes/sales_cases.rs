use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Sales Case Router Module
///
/// Mounted behind the authentication middleware. Role checks (admin-only creation,
/// admin-or-sales-rep for everything else) are done by the handlers' guard extractors.
pub fn sales_case_routes() -> Router<AppState> {
    Router::new()
        // POST /sales-cases  (admin)
        // GET  /sales-cases?status=...&sales_rep_id=...
        // The collection answers with and without the trailing slash.
        .route(
            "/sales-cases",
            post(handlers::create_sales_case).get(handlers::list_sales_cases),
        )
        .route(
            "/sales-cases/",
            post(handlers::create_sales_case).get(handlers::list_sales_cases),
        )
        // GET /sales-cases/{case_id}
        // Sales reps only see their own cases (403 otherwise).
        .route("/sales-cases/{case_id}", get(handlers::get_sales_case))
        // POST /sales-cases/{case_id}/return
        // Closes the case and restocks the returned units.
        .route(
            "/sales-cases/{case_id}/return",
            post(handlers::return_sales_case),
        )
}

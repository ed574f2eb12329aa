/// Router Module Index
///
/// Routes are split by access level. Access control is applied at the module level
/// (via Axum layers) and again by the guard extractors in each handler.

/// Routes accessible to all clients (health check).
pub mod public;

/// Sales case routes. Every handler requires an authenticated admin or sales rep.
pub mod sales_cases;

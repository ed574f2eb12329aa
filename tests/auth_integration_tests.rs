use axum::{
    extract::FromRequestParts,
    http::{Request, StatusCode, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use sales_case_service::{
    AppState, InMemoryRepository,
    auth::{AuthUser, Claims, RequireAdmin, RequireAdminOrSalesRep},
    config::{AppConfig, Env},
    models::{User, UserRole},
};
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

const ADMIN_ID: i64 = 1;
const REP_ID: i64 = 10;
const SECRET: &str = "test-secret";

// --- Test Utilities ---

async fn test_state(env: Env) -> AppState {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_user(User {
        id: ADMIN_ID,
        email: "admin@example.com".to_string(),
        role: UserRole::Admin,
    })
    .await;
    repo.insert_user(User {
        id: REP_ID,
        email: "rep@example.com".to_string(),
        role: UserRole::SalesRep,
    })
    .await;

    AppState {
        repo,
        config: AppConfig {
            env,
            jwt_secret: SECRET.to_string(),
            ..AppConfig::default()
        },
    }
}

fn now() -> usize {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize
}

fn token_for(sub: &str, exp: usize, secret: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp,
        iat: now(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn parts_with_headers(headers: &[(&str, String)]) -> Parts {
    let mut builder = Request::builder().uri("/sales-cases");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder.body(()).unwrap().into_parts().0
}

fn bearer(token: String) -> (&'static str, String) {
    ("authorization", format!("Bearer {}", token))
}

// --- Tests ---

#[tokio::test]
async fn test_valid_jwt_resolves_user_and_role() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[bearer(token_for("10", now() + 3600, SECRET))]);

    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(
        user,
        AuthUser {
            id: REP_ID,
            role: UserRole::SalesRep
        }
    );
}

#[tokio::test]
async fn test_expired_jwt_is_401() {
    let state = test_state(Env::Production).await;
    // Well past the default 60s leeway.
    let mut parts = parts_with_headers(&[bearer(token_for("10", now() - 3600, SECRET))]);

    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_signature_is_401() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[bearer(token_for("10", now() + 3600, "other-secret"))]);

    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_user_is_401() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[bearer(token_for("999", now() + 3600, SECRET))]);

    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_numeric_subject_is_401() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[bearer(token_for("alice", now() + 3600, SECRET))]);

    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_bearer_prefix_is_401() {
    let state = test_state(Env::Production).await;
    let token = token_for("10", now() + 3600, SECRET);
    let mut parts = parts_with_headers(&[("authorization", token)]);

    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_header() {
    let state = test_state(Env::Local).await;
    let mut parts = parts_with_headers(&[("x-user-id", ADMIN_ID.to_string())]);

    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(user.role, UserRole::Admin);
}

#[tokio::test]
async fn test_bypass_header_ignored_in_production() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[("x-user-id", ADMIN_ID.to_string())]);

    let err = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_require_admin_rejects_sales_rep_with_403() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[bearer(token_for("10", now() + 3600, SECRET))]);

    let err = RequireAdmin::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(err.detail(), "The user doesn't have enough privileges");
}

#[tokio::test]
async fn test_require_admin_accepts_admin() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[bearer(token_for("1", now() + 3600, SECRET))]);

    let RequireAdmin(user) = RequireAdmin::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(user.id, ADMIN_ID);
}

#[tokio::test]
async fn test_require_admin_or_sales_rep_accepts_both() {
    let state = test_state(Env::Production).await;
    for sub in ["1", "10"] {
        let mut parts = parts_with_headers(&[bearer(token_for(sub, now() + 3600, SECRET))]);
        assert!(
            RequireAdminOrSalesRep::from_request_parts(&mut parts, &state)
                .await
                .is_ok()
        );
    }
}

#[tokio::test]
async fn test_identity_from_extensions_is_reused() {
    let state = test_state(Env::Production).await;
    let mut parts = parts_with_headers(&[]);
    let resolved = AuthUser {
        id: REP_ID,
        role: UserRole::SalesRep,
    };
    parts.extensions.insert(resolved.clone());

    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(user, resolved);
}

#[test]
fn test_can_access_ownership_rule() {
    let admin = AuthUser {
        id: ADMIN_ID,
        role: UserRole::Admin,
    };
    let rep = AuthUser {
        id: REP_ID,
        role: UserRole::SalesRep,
    };

    assert!(admin.can_access(REP_ID));
    assert!(rep.can_access(REP_ID));
    assert!(!rep.can_access(REP_ID + 1));
}

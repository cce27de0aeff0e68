//! 会话与密码流程集成测试
//! 需要 PostgreSQL：TEST_DATABASE_URL=... cargo test -- --ignored

use serial_test::serial;
use sisfo_auth::{
    error::AppError,
    models::auth::LoginRequest,
    rabbitmq::PASSWORD_RESET_ROUTING_KEY,
    store::{revocation_key, LoginGuard},
};

mod common;
use common::{create_test_app_state, create_test_config, create_test_user, setup_test_db, PASSWORD, TENANT};

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        tenant_id: TENANT.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_login_refresh_rotation_and_replay() {
    let pool = setup_test_db(&create_test_config()).await;
    let user_id = create_test_user(&pool, TENANT, "guru@school.test", PASSWORD).await;
    let app = create_test_app_state(pool);
    let sessions = &app.state.session_service;

    let pair = sessions
        .login(login_request("  Guru@School.test ", PASSWORD))
        .await
        .unwrap();
    assert_eq!(pair.token_type, "Bearer");
    assert_eq!(pair.expires_in, 300);

    let claims = app.state.tokens.verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.user_id, user_id);
    assert_eq!(claims.tenant_id, TENANT);

    let rotated = sessions.refresh(&pair.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    let old_jti = app.state.tokens.verify_refresh(&pair.refresh_token).unwrap().jti;
    assert!(app.store.get(&revocation_key(&old_jti)).is_some());

    // 旧令牌重放被拒绝，新令牌仍然可用
    assert!(matches!(
        sessions.refresh(&pair.refresh_token).await,
        Err(AppError::Unauthorized)
    ));
    sessions.refresh(&rotated.refresh_token).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_refresh_fails_closed_when_store_is_down() {
    let pool = setup_test_db(&create_test_config()).await;
    create_test_user(&pool, TENANT, "tu@school.test", PASSWORD).await;
    let app = create_test_app_state(pool);

    let pair = app
        .state
        .session_service
        .login(login_request("tu@school.test", PASSWORD))
        .await
        .unwrap();

    app.store.set_failing(true);
    let result = app.state.session_service.refresh(&pair.refresh_token).await;
    assert!(matches!(result, Err(AppError::Store(_))));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_lockout_after_repeated_failures() {
    let pool = setup_test_db(&create_test_config()).await;
    create_test_user(&pool, TENANT, "siswa@school.test", PASSWORD).await;
    let app = create_test_app_state(pool);
    let sessions = &app.state.session_service;

    for _ in 0..5 {
        let result = sessions.login(login_request("siswa@school.test", "Wr0ng!Pass")).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    assert!(app.store.is_locked(TENANT, "siswa@school.test").await.unwrap());

    // 锁定期间正确密码同样被拒绝
    let result = sessions.login(login_request("siswa@school.test", PASSWORD)).await;
    assert!(matches!(result, Err(AppError::AccountRestricted(_))));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_successful_login_clears_failures() {
    let pool = setup_test_db(&create_test_config()).await;
    create_test_user(&pool, TENANT, "staf@school.test", PASSWORD).await;
    let app = create_test_app_state(pool);
    let sessions = &app.state.session_service;

    for _ in 0..4 {
        let _ = sessions.login(login_request("staf@school.test", "Wr0ng!Pass")).await;
    }
    sessions.login(login_request("staf@school.test", PASSWORD)).await.unwrap();
    for _ in 0..4 {
        let _ = sessions.login(login_request("staf@school.test", "Wr0ng!Pass")).await;
    }

    assert!(!app.store.is_locked(TENANT, "staf@school.test").await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_inactive_user_cannot_login() {
    let pool = setup_test_db(&create_test_config()).await;
    let user_id = create_test_user(&pool, TENANT, "alumni@school.test", PASSWORD).await;
    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();
    let app = create_test_app_state(pool);

    let result = app
        .state
        .session_service
        .login(login_request("alumni@school.test", PASSWORD))
        .await;
    assert!(matches!(result, Err(AppError::AccountRestricted(_))));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_login_is_scoped_to_tenant() {
    let pool = setup_test_db(&create_test_config()).await;
    create_test_user(&pool, "school-b", "kepala@school.test", PASSWORD).await;
    let app = create_test_app_state(pool);

    let result = app
        .state
        .session_service
        .login(login_request("kepala@school.test", PASSWORD))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_forgot_and_reset_password() {
    let pool = setup_test_db(&create_test_config()).await;
    create_test_user(&pool, TENANT, "ortu@school.test", PASSWORD).await;
    let app = create_test_app_state(pool.clone());
    let passwords = &app.state.password_service;

    let token = passwords
        .forgot_password(TENANT, "ortu@school.test")
        .await
        .unwrap()
        .expect("token for existing user");
    assert_eq!(token.len(), 64);

    let published = app.events.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, PASSWORD_RESET_ROUTING_KEY);
    assert_eq!(published[0].1["token"], token.as_str());

    // 只保存令牌摘要
    let stored: String = sqlx::query_scalar("SELECT token_hash FROM password_resets")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_ne!(stored, token);

    // 当前密码不能作为新密码
    assert!(matches!(
        passwords.reset_password(&token, PASSWORD).await,
        Err(AppError::BadRequest(_))
    ));

    passwords.reset_password(&token, "N3w!Passw0rd").await.unwrap();
    assert!(matches!(
        passwords.reset_password(&token, "An0ther!Pass").await,
        Err(AppError::Unauthorized)
    ));

    app.state
        .session_service
        .login(login_request("ortu@school.test", "N3w!Passw0rd"))
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_forgot_password_for_unknown_email_is_silent() {
    let pool = setup_test_db(&create_test_config()).await;
    let app = create_test_app_state(pool);

    let token = app
        .state
        .password_service
        .forgot_password(TENANT, "nobody@school.test")
        .await
        .unwrap();

    assert!(token.is_none());
    assert!(app.events.published().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_change_password_rejects_history() {
    let pool = setup_test_db(&create_test_config()).await;
    let user_id = create_test_user(&pool, TENANT, "tu2@school.test", PASSWORD).await;
    let app = create_test_app_state(pool);
    let passwords = &app.state.password_service;

    assert!(matches!(
        passwords.change_password(user_id, "Wr0ng!Pass", "N3w!Passw0rd").await,
        Err(AppError::Unauthorized)
    ));

    passwords.change_password(user_id, PASSWORD, "N3w!Passw0rd").await.unwrap();
    passwords.change_password(user_id, "N3w!Passw0rd", "Th1rd!Passw0rd").await.unwrap();

    assert!(matches!(
        passwords.change_password(user_id, "Th1rd!Passw0rd", "N3w!Passw0rd").await,
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        passwords.change_password(user_id, "Th1rd!Passw0rd", "weak").await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL"]
async fn test_login_attempts_are_audited() {
    let pool = setup_test_db(&create_test_config()).await;
    create_test_user(&pool, TENANT, "audit@school.test", PASSWORD).await;
    let app = create_test_app_state(pool.clone());

    let _ = app
        .state
        .session_service
        .login(login_request("audit@school.test", "Wr0ng!Pass"))
        .await;
    app.state
        .session_service
        .login(login_request("audit@school.test", PASSWORD))
        .await
        .unwrap();

    let rows: Vec<(String, serde_json::Value)> = sqlx::query_as(
        "SELECT action, new_values FROM audit_logs WHERE action = 'auth.login' ORDER BY created_at",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1["success"], false);
    assert_eq!(rows[0].1["reason"], "bad_password");
    assert_eq!(rows[1].1["success"], true);
}

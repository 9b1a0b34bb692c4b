use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App, HttpResponse};
use chirpy_auth::auth::AccessTokenCodec;
use chirpy_auth::configuration::AuthSettings;
use chirpy_auth::middleware::{AuthenticatedUser, JwtMiddleware};
use serde_json::Value;
use uuid::Uuid;

async fn whoami(user: web::ReqData<AuthenticatedUser>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id.to_string() }))
}

fn codec() -> Arc<AccessTokenCodec> {
    Arc::new(
        AccessTokenCodec::new(&AuthSettings::with_secret("middleware-test-secret"))
            .expect("Failed to build codec"),
    )
}

macro_rules! protected_app {
    ($codec:expr) => {
        test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new($codec))
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await
    };
}

#[actix_web::test]
async fn valid_token_reaches_handler_with_user() {
    let codec = codec();
    let user_id = Uuid::new_v4();
    let token = codec.issue(user_id).expect("Failed to generate token");
    let app = protected_app!(codec.clone());

    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["user_id"], user_id.to_string());
}

#[actix_web::test]
async fn missing_header_is_401_missing_token() {
    let app = protected_app!(codec());

    let req = test::TestRequest::get().uri("/api/me").to_request();
    let err = test::try_call_service(&app, req)
        .await
        .expect_err("Request without token should fail");

    let response = err.error_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn token_failures_share_one_response_body() {
    let codec = codec();
    let foreign = AccessTokenCodec::new(&AuthSettings::with_secret("some-other-secret"))
        .expect("Failed to build codec");
    let forged = foreign.issue(Uuid::new_v4()).expect("Failed to generate token");
    let app = protected_app!(codec);

    for token in [forged.as_str(), "not.a.jwt"] {
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let err = test::try_call_service(&app, req)
            .await
            .expect_err("Request with bad token should fail");

        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = actix_web::body::to_bytes(response.into_body())
            .await
            .expect("Failed to read body");
        let body: Value = serde_json::from_slice(&body).expect("Body is not JSON");
        assert_eq!(body["code"], "TOKEN_INVALID");
        assert_eq!(body["message"], "Invalid or expired token");
    }
}

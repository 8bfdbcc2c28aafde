use axum::extract::Request;
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{auth, events, health_check, tickets, users};
use crate::services::AppState;
use crate::utils::error::InternalDetail;
use crate::utils::response::error as error_response;

pub fn create_routes(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/users", post(users::signup).get(users::list))
        .route("/admin/users", post(users::admin_create))
        .route("/users/me", get(users::me))
        .route(
            "/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/events", post(events::create).get(events::list))
        .route("/events/mine", get(events::list_mine))
        .route(
            "/events/:id",
            get(events::get).put(events::update).delete(events::delete),
        )
        .route("/tickets", post(tickets::purchase).get(tickets::list))
        .route(
            "/tickets/:id",
            get(tickets::get).put(tickets::update_status),
        )
        .with_state(state);

    if !config.environment.is_production() {
        router = router.layer(middleware::from_fn(expose_internal_detail));
    }

    router
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(create_security_headers_layer(&config))
}

/// Development only: puts the diagnostic of a 5xx into `error.details`.
async fn expose_internal_detail(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(detail) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };

    error_response(
        detail.code,
        detail.message,
        Some(json!({ "detail": detail.detail })),
        response.status(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment};
    use crate::store::Stores;
    use crate::testing;
    use crate::utils::error::AppError;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Signs up a user of the given profile and logs them in.
    async fn signup_and_login(app: &Router, profile_type: &str) -> (String, String) {
        let email = format!("{}@example.com", uuid::Uuid::new_v4().simple());
        let tax_id = if profile_type == "PROMOTER" {
            testing::cnpj()
        } else {
            testing::cpf()
        };
        let (status, body) = send(
            app,
            Method::POST,
            "/users",
            None,
            Some(json!({
                "name": "Maria Souza",
                "taxId": tax_id,
                "email": email,
                "password": "password1",
                "passwordConfirmation": "password1",
                "profileType": profile_type,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": "password1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (id, body["data"]["accessToken"].as_str().unwrap().to_string())
    }

    fn event_body(name: &str, tickets: i64) -> Value {
        let start = chrono::Utc::now() + chrono::Duration::days(7);
        json!({
            "name": name,
            "address": "Av. Paulista, 1000",
            "startDate": start.to_rfc3339(),
            "endDate": (start + chrono::Duration::hours(3)).to_rfc3339(),
            "tickets": tickets,
            "ticketPrice": "45.00",
            "limitByParticipant": false,
        })
    }

    #[tokio::test]
    async fn test_health_carries_layer_headers() {
        let app = create_routes(testing::state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_is_unauthorized() {
        let app = create_routes(testing::state());

        let (status, body) = send(&app, Method::GET, "/events", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, Method::GET, "/events", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_envelope() {
        let app = create_routes(testing::state());
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_purchase_and_cancel_over_http() {
        let app = create_routes(testing::state());
        let (_, promoter) = signup_and_login(&app, "PROMOTER").await;
        let (participant_id, participant) = signup_and_login(&app, "PARTICIPANT").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/events",
            Some(promoter.as_str()),
            Some(event_body("Festival de Inverno", 3)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let event_id = body["data"]["id"].as_str().unwrap().to_string();

        // Participants cannot create events.
        let (status, _) = send(
            &app,
            Method::POST,
            "/events",
            Some(participant.as_str()),
            Some(event_body("Outro", 3)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            Method::POST,
            "/tickets",
            Some(participant.as_str()),
            Some(json!({ "event": event_id, "quantity": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let tickets = body["data"].as_array().unwrap();
        assert_eq!(tickets.len(), 3);
        assert_eq!(tickets[0]["participant"]["id"], participant_id.as_str());
        let ticket_id = tickets[0]["id"].as_str().unwrap().to_string();

        let uri = format!("/events/{event_id}");
        let (_, body) = send(&app, Method::GET, &uri, Some(promoter.as_str()), None).await;
        assert_eq!(body["data"]["status"], "CLOSED");
        assert_eq!(body["data"]["ticketsSold"], 3);

        // Only the promoter sees the sold count.
        let (_, body) = send(&app, Method::GET, &uri, Some(participant.as_str()), None).await;
        assert!(body["data"].get("ticketsSold").is_none());

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/tickets/{ticket_id}"),
            Some(participant.as_str()),
            Some(json!({ "status": "CANCELLED" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "CANCELLED");

        let (_, body) = send(&app, Method::GET, &uri, Some(promoter.as_str()), None).await;
        assert_eq!(body["data"]["status"], "FORSALE");
        assert_eq!(body["data"]["ticketsSold"], 2);
    }

    #[tokio::test]
    async fn test_users_me_is_not_an_id() {
        let app = create_routes(testing::state());
        let (id, token) = signup_and_login(&app, "PARTICIPANT").await;

        let (status, body) = send(&app, Method::GET, "/users/me", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id.as_str());

        let (status, body) = send(&app, Method::GET, "/users/not-a-uuid", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_logout_then_refresh_fails() {
        let app = create_routes(testing::state());
        let email = format!("{}@example.com", uuid::Uuid::new_v4().simple());
        let (status, _) = send(
            &app,
            Method::POST,
            "/users",
            None,
            Some(json!({
                "name": "João Lima",
                "taxId": testing::cpf(),
                "email": email,
                "password": "password1",
                "passwordConfirmation": "password1",
                "profileType": "PARTICIPANT",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": "password1" })),
        )
        .await;
        let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/logout",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    async fn failing() -> Result<Response, AppError> {
        Err(AppError::InternalServerError("pool exhausted".to_string()))
    }

    async fn internal_error_body(router: Router) -> Value {
        let response = router
            .oneshot(axum::http::Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_internal_detail_exposed_only_in_development() {
        let development = Router::new()
            .route("/boom", get(failing))
            .layer(middleware::from_fn(expose_internal_detail));
        let body = internal_error_body(development).await;
        assert_eq!(body["error"]["details"]["detail"], "pool exhausted");

        let production = Router::new().route("/boom", get(failing));
        let body = internal_error_body(production).await;
        assert!(body["error"]["details"].is_null());
    }

    #[tokio::test]
    async fn test_production_router_builds() {
        let config = Config {
            environment: Environment::Production,
            ..Config::default()
        };
        let state = AppState::new(config, Stores::memory(), testing::hasher());
        let app = create_routes(state);
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["service"], "boxoffice-api");
    }
}

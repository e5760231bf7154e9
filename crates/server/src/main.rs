use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    routing::get,
    Json, Router,
};
use shared::{
    domain::Meal,
    error::{ApiError, ErrorCode},
    protocol::NewMeal,
};
use storage::Storage;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

mod cache;
mod config;

use cache::ListCache;
use config::{load_settings, normalize_database_url};

const DB_CONNECT_ATTEMPTS: u32 = 10;
const LIST_CACHE_TTL: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct AppState {
    storage: Storage,
    list_cache: Arc<ListCache>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::connect_with_retry(&database_url, DB_CONNECT_ATTEMPTS).await?;

    let state = AppState {
        storage,
        list_cache: Arc::new(ListCache::new(LIST_CACHE_TTL)),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/meals", get(http_list_meals).post(http_create_meal))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_meals(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Meal>>, (StatusCode, Json<ApiError>)> {
    if let Some(meals) = state.list_cache.get().await {
        return Ok(Json(meals));
    }

    let meals = state.storage.list_meals().await.map_err(internal)?;
    state.list_cache.put(meals.clone()).await;
    Ok(Json(meals))
}

async fn http_create_meal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewMeal>,
) -> Result<Json<Meal>, (StatusCode, Json<ApiError>)> {
    // A null calories sentinel decodes to zero.
    let calories = req.calories.unwrap_or(0);

    let meal = state
        .storage
        .insert_meal(&req.name, calories)
        .await
        .map_err(internal)?;
    state.list_cache.invalidate().await;
    Ok(Json(meal))
}

fn internal(err: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(ErrorCode::Internal, err.to_string())),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_app() -> (Router, Arc<AppState>) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let state = Arc::new(AppState {
            storage,
            list_cache: Arc::new(ListCache::new(LIST_CACHE_TTL)),
        });
        (build_router(Arc::clone(&state)), state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn create_request(body: &str) -> Request<Body> {
        Request::post("/api/meals")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn lists_empty_collection() {
        let (app, _state) = test_app().await;
        let response = app
            .oneshot(Request::get("/api/meals").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn created_meal_appears_in_subsequent_list() {
        let (app, _state) = test_app().await;

        let response = app
            .clone()
            .oneshot(create_request(r#"{"name":"Toast","calories":200}"#))
            .await
            .expect("create response");
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["name"], "Toast");
        assert_eq!(created["calories"], 200);
        assert!(created["id"].as_i64().expect("id") > 0);

        let response = app
            .oneshot(Request::get("/api/meals").body(Body::empty()).expect("request"))
            .await
            .expect("list response");
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().expect("array").len(), 1);
        assert_eq!(listed[0]["name"], "Toast");
    }

    #[tokio::test]
    async fn list_is_served_from_cache_within_ttl() {
        let (app, state) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/meals").body(Body::empty()).expect("request"))
            .await
            .expect("first list");
        assert_eq!(body_json(response).await, serde_json::json!([]));

        // Writing behind the handler's back is not observed until the
        // entry expires or an insert through the API invalidates it.
        state
            .storage
            .insert_meal("Stew", 320)
            .await
            .expect("direct insert");

        let response = app
            .oneshot(Request::get("/api/meals").body(Body::empty()).expect("request"))
            .await
            .expect("second list");
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn create_invalidates_list_cache() {
        let (app, _state) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/meals").body(Body::empty()).expect("request"))
            .await
            .expect("warm cache");
        assert_eq!(body_json(response).await, serde_json::json!([]));

        let response = app
            .clone()
            .oneshot(create_request(r#"{"name":"Soup","calories":150}"#))
            .await
            .expect("create response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/meals").body(Body::empty()).expect("request"))
            .await
            .expect("list response");
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().expect("array").len(), 1);
        assert_eq!(listed[0]["name"], "Soup");
    }

    #[tokio::test]
    async fn null_calories_sentinel_is_stored_as_zero() {
        let (app, _state) = test_app().await;
        let response = app
            .oneshot(create_request(r#"{"name":"X","calories":null}"#))
            .await
            .expect("create response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["calories"], 0);
    }

    #[tokio::test]
    async fn rejects_unsupported_methods_on_collection() {
        let (app, _state) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/meals")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let (app, _state) = test_app().await;
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

use adsrec::services::training::TriggerOutcome;
use adsrec::utils::validation::validate_limit;
use adsrec::{init_tracing, ActivityType, Ad, AppState, Config, Interaction, User, UserPreferences};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    id: i64,
    email: String,
    preferences: Option<UserPreferences>,
}

#[derive(Debug, Deserialize)]
struct CreateAdRequest {
    id: i64,
    title: String,
    #[serde(default)]
    description: String,
    image_url: Option<String>,
    category: String,
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TrackActivityRequest {
    user_id: i64,
    ad_id: i64,
    activity_type: String,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct EmbeddingResponse {
    id: i64,
    generation: Option<u64>,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn reject<T>(status: StatusCode, message: String) -> (StatusCode, Json<ApiResponse<T>>) {
    (status, Json(ApiResponse::error(message)))
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "adsrec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn trigger_training(State(state): State<AppState>) -> ApiResult<String> {
    match state.training_coordinator.trigger() {
        TriggerOutcome::Scheduled => Ok(Json(ApiResponse::success(
            "Model training has been scheduled".to_string(),
        ))),
        TriggerOutcome::AlreadyRunning => Err(reject(
            StatusCode::CONFLICT,
            "A training run is already in progress".to_string(),
        )),
    }
}

async fn training_status(State(state): State<AppState>) -> Json<ApiResponse<adsrec::TrainingRun>> {
    Json(ApiResponse::success(state.training_coordinator.get_status()))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendationQuery>,
) -> ApiResult<adsrec::RecommendationResponse> {
    let limit = params.limit.unwrap_or(state.config.recommendation.max_recommendations);
    validate_limit(limit).map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?;

    match state.recommendation_service.get_recommendations(user_id, limit).await {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(e) => {
            tracing::error!("Failed to get recommendations: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn create_ad(State(state): State<AppState>, Json(request): Json<CreateAdRequest>) -> ApiResult<Ad> {
    let mut ad = Ad::new(request.id, request.title, request.category).with_description(request.description);
    ad.image_url = request.image_url;
    ad.price = request.price;

    state
        .recommendation_service
        .create_ad(ad)
        .await
        .map(|ad| Json(ApiResponse::success(ad)))
        .map_err(|e| reject(StatusCode::CONFLICT, e.to_string()))
}

async fn create_user(State(state): State<AppState>, Json(request): Json<CreateUserRequest>) -> ApiResult<User> {
    let mut user = User::new(request.id, request.email);
    user.preferences = request.preferences;

    state
        .recommendation_service
        .create_user(user)
        .await
        .map(|user| Json(ApiResponse::success(user)))
        .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn get_user(State(state): State<AppState>, Path(user_id): Path<i64>) -> ApiResult<User> {
    match state.recommendation_service.get_user(user_id).await {
        Ok(Some(user)) => Ok(Json(ApiResponse::success(user))),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "User not found".to_string())),
        Err(e) => {
            tracing::error!("Failed to get user: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(preferences): Json<UserPreferences>,
) -> ApiResult<User> {
    match state.recommendation_service.update_preferences(user_id, preferences).await {
        Ok(Some(user)) => Ok(Json(ApiResponse::success(user))),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "User not found".to_string())),
        Err(e) => Err(reject(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

async fn get_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    match state.recommendation_service.get_categories().await {
        Ok(categories) => Ok(Json(ApiResponse::success(categories))),
        Err(e) => {
            tracing::error!("Failed to list categories: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn get_ad_embedding(State(state): State<AppState>, Path(ad_id): Path<i64>) -> Json<ApiResponse<EmbeddingResponse>> {
    Json(ApiResponse::success(EmbeddingResponse {
        id: ad_id,
        generation: state.serving.generation(),
        embedding: state.recommendation_service.get_item_embedding(ad_id),
    }))
}

async fn get_user_embedding(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Json<ApiResponse<EmbeddingResponse>> {
    Json(ApiResponse::success(EmbeddingResponse {
        id: user_id,
        generation: state.serving.generation(),
        embedding: state.recommendation_service.get_user_embedding(user_id),
    }))
}

async fn get_user_features(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<adsrec::UserFeatureVector> {
    match state.recommendation_service.user_features(user_id).await {
        Ok(features) => Ok(Json(ApiResponse::success(features))),
        Err(e) => {
            tracing::error!("Failed to extract user features: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn get_user_activities(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<Interaction>> {
    match state.recommendation_service.activity_history(user_id).await {
        Ok(history) => Ok(Json(ApiResponse::success(history))),
        Err(e) => {
            tracing::error!("Failed to load activity history: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn track_activity(
    State(state): State<AppState>,
    Json(request): Json<TrackActivityRequest>,
) -> ApiResult<String> {
    let activity = ActivityType::from(request.activity_type.as_str());
    let mut interaction = Interaction::new(request.user_id, request.ad_id, activity);
    if let Some(timestamp) = request.timestamp {
        interaction = interaction.at(timestamp);
    }

    state
        .recommendation_service
        .track_activity(interaction)
        .await
        .map(|_| Json(ApiResponse::success("Activity recorded successfully".to_string())))
        .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/training/trigger", post(trigger_training))
        .route("/training/status", get(training_status))
        .route("/ads", post(create_ad))
        .route("/ads/categories", get(get_categories))
        .route("/ads/recommendations/:user_id", get(get_recommendations))
        .route("/ads/:ad_id/embedding", get(get_ad_embedding))
        .route("/users", post(create_user))
        .route("/users/:user_id", get(get_user))
        .route("/users/:user_id/preferences", put(update_preferences))
        .route("/users/:user_id/embedding", get(get_user_embedding))
        .route("/users/:user_id/features", get(get_user_features))
        .route("/users/:user_id/activities", get(get_user_activities))
        .route("/activities", post(track_activity))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = if std::path::Path::new(CONFIG_PATH).exists() {
        Config::from_file(CONFIG_PATH)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    info!("Starting adsrec server with config: {:?}", config.server);

    let addr = config.server.socket_addr()?;
    let state = AppState::new(config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

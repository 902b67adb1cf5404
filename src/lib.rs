pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::middleware::auth::auth_middleware;
use crate::config::AppConfig;
use crate::services::storage::StorageService;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::health::health_check,
        api::handlers::shares::upload_files,
        api::handlers::shares::add_files,
        api::handlers::shares::list_shares,
        api::handlers::shares::get_share,
        api::handlers::shares::update_share_settings,
        api::handlers::shares::delete_share,
        api::handlers::shares::delete_file,
        api::handlers::public::get_share_status,
        api::handlers::public::unlock_share,
        api::handlers::public::download_file,
    ),
    components(
        schemas(
            api::handlers::auth::AuthRequest,
            api::handlers::auth::AuthResponse,
            api::handlers::health::HealthResponse,
            api::handlers::shares::FileResponse,
            api::handlers::shares::ShareResponse,
            api::handlers::shares::ShareListItem,
            api::handlers::shares::UpdateShareRequest,
            api::handlers::shares::MessageResponse,
            api::handlers::public::ShareUnlockRequest,
            api::handlers::public::PublicFile,
            api::handlers::public::PublicShareResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "shares", description = "Share management for owners"),
        (name = "public", description = "Recipient access through share links"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub config: AppConfig,
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    use api::handlers::{auth, health, public, shares};

    // Multipart framing on top of the payload itself
    let body_limit = state.config.max_file_size + 10 * 1024 * 1024;

    let owner_routes = Router::new()
        .route("/upload", post(shares::upload_files))
        .route("/shares", get(shares::list_shares))
        .route(
            "/share/:public_id",
            get(shares::get_share)
                .post(shares::update_share_settings)
                .delete(shares::delete_share),
        )
        .route("/share/:public_id/files", post(shares::add_files))
        .route(
            "/share/:public_id/file/:file_id",
            delete(shares::delete_file),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/public/share/:public_id", get(public::get_share_status))
        .route("/public/share/:public_id/unlock", post(public::unlock_share))
        .route("/public/file/:token", get(public::download_file))
        .merge(owner_routes)
        .layer(cors_layer(&state.config))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

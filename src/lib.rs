pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::StorageConfig;
use crate::services::file_ops::FileOps;
use crate::services::session::{MemorySessionStore, SessionStore};
use axum::{Router, middleware::from_fn, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload_storage::show_form,
        api::handlers::upload_storage::submit_form,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::upload_storage::UploadForm,
            models::FileDescriptor,
            models::UploadError,
        )
    ),
    tags(
        (name = "system", description = "Service status"),
        (name = "upload-storage", description = "Upload persistence across form re-renders")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub file_ops: FileOps,
    pub config: StorageConfig,
}

impl AppState {
    /// State backed by the in-process session container
    pub fn in_memory(config: StorageConfig) -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new(config.session_ttl_secs)),
            file_ops: FileOps::new(config.resolved_temp_dir(), config.file_permissions),
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            api::handlers::upload_storage::FORM_PATH,
            get(api::handlers::upload_storage::show_form)
                .post(api::handlers::upload_storage::submit_form)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit(
                    state.config.max_file_size,
                ))),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}

/// Request body cap: one file plus room for multipart framing and fields
fn body_limit(max_file_size: usize) -> usize {
    max_file_size.saturating_add(1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_saturates() {
        assert_eq!(body_limit(1024), 1024 + 1024 * 1024);
        assert_eq!(body_limit(usize::MAX), usize::MAX);
    }
}

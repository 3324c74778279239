use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;

use crate::identigo::context::Services;

// axum handler for health
pub async fn health(services: Extension<Arc<Services>>) -> impl IntoResponse {
    let body = Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": {
            "user": services.user_sessions.live_count(),
            "admin": services.admin_sessions.live_count(),
        },
    }));

    let mut headers = HeaderMap::new();
    if let Ok(value) = format!(
        "{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
    .parse()
    {
        headers.insert("X-App", value);
    }

    (headers, body)
}

#[cfg(test)]
mod tests {
    use super::health;
    use crate::identigo::testkit::TestEnv;
    use axum::extract::Extension;
    use axum::response::IntoResponse;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn health_reports_live_session_counts() {
        let env = TestEnv::new();
        env.services.user_sessions.create(Uuid::new_v4());

        let response = health(Extension(Arc::clone(&env.services)))
            .await
            .into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("X-App")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.starts_with("identigo:")),
            Some(true)
        );
    }
}

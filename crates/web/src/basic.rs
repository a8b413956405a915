use super::AppState;
use axum::{Router, routing::get};
use std::sync::Arc;

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route("/healthcheck", get(|| async { "OK" }))
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_healthcheck() {
        let app = TestApp::empty();
        let (status, body) = app.call_text(get("/healthcheck")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}

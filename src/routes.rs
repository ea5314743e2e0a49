use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{auth::User, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(public))
        .route("/protected", get(protected))
}

async fn public() -> Json<Value> {
    Json(json!({
        "message": "Hello, this is a public endpoint.",
    }))
}

async fn protected(user: User) -> Json<Value> {
    tracing::info!(sub = ?user.subject(), "authenticated request");
    Json(json!({
        "message": "You are authenticated!",
        "user": user,
    }))
}

//! Handles GET /callback - demo client redirect target that echoes the received code

use axum::{Json, extract::Query};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

pub async fn handle_callback(Query(query): Query<CallbackQuery>) -> Json<Value> {
    Json(json!({
        "message": "Received authorization code",
        "code": query.code,
    }))
}

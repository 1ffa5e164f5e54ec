//! Axum request handlers: health plus a set of demo endpoints exercising the
//! middleware end to end.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use common::protocol::{ApiResult, ErrorResponse, HealthResponse};
use secure_api_core::{DecryptFields, FieldDescriptor, Mode, TypeTag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{extract::DecryptedQuery, state::AppState};

// ---------------------------------------------------------------------------
// Demo models
// ---------------------------------------------------------------------------

/// A user as posted in JSON or rebuilt from query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub role: Vec<String>,
    pub create_time: Option<NaiveDateTime>,
    pub edit_time: Option<DateTime<Utc>>,
}

impl DecryptFields for User {
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("id", TypeTag::Number),
        FieldDescriptor::new("name", TypeTag::Text),
        FieldDescriptor::new("role", TypeTag::List).decrypt(),
        FieldDescriptor::new("createTime", TypeTag::LocalDateTime).decrypt(),
        FieldDescriptor::new("editTime", TypeTag::Date).decrypt(),
    ];
}

/// Loose parameters of assorted shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lookup {
    pub age: Option<i64>,
    pub list: Vec<String>,
    pub set: Vec<String>,
    pub map: Map<String, Value>,
    pub active: bool,
    pub trace: Option<String>,
}

impl DecryptFields for Lookup {
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("age", TypeTag::Number),
        FieldDescriptor::new("list", TypeTag::List),
        FieldDescriptor::new("set", TypeTag::Set),
        FieldDescriptor::new("map", TypeTag::Map),
        FieldDescriptor::new("active", TypeTag::Bool),
        FieldDescriptor::new("trace", TypeTag::Text).ignore(),
    ];
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: reports whether the middleware is on and how it is set up.
pub async fn health(State(state): State<AppState>) -> Response {
    let settings = state.api.settings();
    let dispatcher = state.api.dispatcher();
    let session_key_cipher_algorithm = match dispatcher.mode() {
        Mode::SessionKey => Some(settings.session_key_cipher_algorithm.to_string()),
        Mode::Common => None,
    };
    let body = HealthResponse {
        status: if settings.enabled { "ok" } else { "disabled" }.into(),
        enabled: settings.enabled,
        mode: dispatcher.mode().to_string(),
        cipher_algorithm: settings.cipher_algorithm.to_string(),
        session_key_cipher_algorithm,
        sign_enabled: state.api.signer().is_some(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// `GET /secure-api-test/form`: a [`User`] rebuilt from query parameters.
pub async fn form(DecryptedQuery(user): DecryptedQuery<User>) -> Json<User> {
    Json(user)
}

/// `GET /secure-api-test/param`: a [`Lookup`] rebuilt from query parameters.
pub async fn param(DecryptedQuery(lookup): DecryptedQuery<Lookup>) -> Json<Lookup> {
    Json(lookup)
}

/// `GET /secure-api-test/response`
pub async fn response() -> Json<ApiResult<String>> {
    Json(ApiResult::success_with("response encrypted", "hello".to_owned()))
}

/// `POST /secure-api-test/request`: echoes a decrypted JSON body.
pub async fn request(Json(user): Json<User>) -> Json<ApiResult<User>> {
    Json(ApiResult::success_with("request decrypted", user))
}

/// `POST /secure-api-test/echo`: echoes a decrypted text body as a JSON string.
pub async fn echo(body: String) -> Json<String> {
    Json(body)
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

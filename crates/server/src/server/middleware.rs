//! The secure-api layer: decrypts inbound bodies, encrypts outbound ones.
//!
//! For every request the route policy decides the [`RouteFlags`]. On a
//! decrypt route the body is read, unwrapped from JSON quotes, decrypted and
//! (when signing is on and the caller sent one) checked against the
//! `X-signature` header. On an encrypt route a successful response body is
//! signed as plaintext and then encrypted, either whole or only the configured
//! data field. A [`RequestContext`] is attached to the request extensions so
//! extractors share the same session key.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use secure_api_core::{coerce::strip_quotes, RequestContext, RouteFlags, SecureApi};
use serde::de::IgnoredAny;
use serde_json::Value;
use tracing::{debug, warn};

use super::{error::ApiError, state::AppState};

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Carries the base64 signature of a plaintext body, in both directions.
pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-signature");

const JSON: HeaderValue = HeaderValue::from_static("application/json");
const TEXT: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

pub async fn secure_api(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.api.settings().enabled {
        return Ok(next.run(request).await);
    }

    let flags = state.routes.flags(request.uri().path());
    let ctx = Arc::new(request_context(&state, request.headers(), flags));
    debug!(
        request_id = ctx.request_id(),
        path = request.uri().path(),
        encrypt = flags.encrypt,
        decrypt = flags.decrypt,
        "secure api route"
    );

    if flags.decrypt {
        request = decrypt_request(&state, &ctx, request).await?;
    }
    request.extensions_mut().insert(Arc::clone(&ctx));

    let response = next.run(request).await;
    if !flags.encrypt || !response.status().is_success() {
        return Ok(response);
    }
    encrypt_response(&state, &ctx, response).await
}

/// Context for a request that has not been through [`secure_api`].
pub fn request_context(state: &AppState, headers: &HeaderMap, flags: RouteFlags) -> RequestContext {
    let wrapped = header_value(headers, &state.api.settings().session_key_header);
    RequestContext::new(flags, wrapped)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

fn too_large(limit: usize) -> ApiError {
    ApiError::payload_too_large(format!("request body exceeds {limit} bytes"))
}

async fn decrypt_request(
    state: &AppState,
    ctx: &Arc<RequestContext>,
    request: Request,
) -> Result<Request, ApiError> {
    let (mut parts, body) = request.into_parts();
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > state.max_body_bytes) {
        return Err(too_large(state.max_body_bytes));
    }
    // A bounded read only fails once the limit is hit or the peer has gone away.
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| {
            debug!(request_id = ctx.request_id(), error = %e, "request body read failed");
            too_large(state.max_body_bytes)
        })?;
    if bytes.is_empty() {
        return Ok(Request::from_parts(parts, Body::empty()));
    }

    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ApiError::bad_request("request body is not valid UTF-8"))?;
    let content = strip_quotes(content.trim()).to_owned();

    let api = Arc::clone(&state.api);
    let task_ctx = Arc::clone(ctx);
    let plaintext = tokio::task::spawn_blocking(move || api.dispatcher().decrypt(&task_ctx, &content))
        .await
        .map_err(|e| ApiError::internal(format!("decrypt worker failed: {e}")))??;

    if let Some(signer) = state.api.signer() {
        if let Some(signature) = header_value(&parts.headers, SIGNATURE_HEADER.as_str()) {
            if !signer.verify(plaintext.as_bytes(), &signature)? {
                warn!(request_id = ctx.request_id(), "request signature mismatch");
                return Err(ApiError::unauthorized("request signature does not match the body"));
            }
        }
    }

    parts.headers.remove(CONTENT_LENGTH);
    if serde_json::from_str::<IgnoredAny>(&plaintext).is_ok() {
        parts.headers.insert(CONTENT_TYPE, JSON);
    }
    Ok(Request::from_parts(parts, Body::from(plaintext)))
}

// ---------------------------------------------------------------------------
// Response side
// ---------------------------------------------------------------------------

async fn encrypt_response(
    state: &AppState,
    ctx: &Arc<RequestContext>,
    response: Response,
) -> Result<Response, ApiError> {
    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::internal(format!("failed to read response body: {e}")))?;
    if bytes.is_empty() {
        return Ok(Response::from_parts(parts, Body::empty()));
    }
    let body = String::from_utf8(bytes.to_vec())
        .map_err(|_| ApiError::internal("response body is not valid UTF-8"))?;
    let plaintext = unquote_json_string(body);

    let api = Arc::clone(&state.api);
    let task_ctx = Arc::clone(ctx);
    let (ciphertext, signature, partial) = tokio::task::spawn_blocking(move || {
        seal(&api, &task_ctx, &plaintext)
    })
    .await
    .map_err(|e| ApiError::internal(format!("encrypt worker failed: {e}")))??;

    if let Some(signature) = signature {
        let value = HeaderValue::from_str(&signature)
            .map_err(|_| ApiError::internal("signature is not a valid header value"))?;
        parts.headers.insert(SIGNATURE_HEADER, value);
    }
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, if partial { JSON } else { TEXT });
    Ok(Response::from_parts(parts, Body::from(ciphertext)))
}

/// Sign then encrypt. Returns the new body, the signature if signing is on,
/// and whether only the data field was encrypted.
fn seal(
    api: &SecureApi,
    ctx: &RequestContext,
    plaintext: &str,
) -> Result<(String, Option<String>, bool), ApiError> {
    let signature = api
        .signer()
        .map(|signer| signer.sign(plaintext.as_bytes()))
        .transpose()?;
    match api.settings().response_body_data_field.as_deref() {
        Some(field) => Ok((encrypt_data_field(api, ctx, plaintext, field)?, signature, true)),
        None => Ok((api.dispatcher().encrypt(ctx, plaintext)?, signature, false)),
    }
}

/// Encrypt only `field` of a JSON object body. A missing or null field leaves
/// the body untouched; string values are encrypted without their quotes.
fn encrypt_data_field(
    api: &SecureApi,
    ctx: &RequestContext,
    body: &str,
    field: &str,
) -> Result<String, ApiError> {
    let mut value: Value = serde_json::from_str(body).map_err(|_| {
        ApiError::internal(format!("response is not JSON, cannot encrypt field {field}"))
    })?;
    let Value::Object(object) = &mut value else {
        return Err(ApiError::internal(format!(
            "response is not a JSON object, cannot encrypt field {field}"
        )));
    };
    let data = match object.get(field) {
        None | Some(Value::Null) => return Ok(body.to_owned()),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let encrypted = api.dispatcher().encrypt(ctx, &data)?;
    object.insert(field.to_owned(), Value::String(encrypted));
    serde_json::to_string(&value)
        .map_err(|e| ApiError::internal(format!("failed to serialise response: {e}")))
}

/// Scalar handler results serialise as JSON strings; encrypt their content,
/// not the quoted form.
fn unquote_json_string(body: String) -> String {
    if body.starts_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(&body) {
            return inner;
        }
    }
    body
}

//! Extractor rebuilding typed values from (possibly encrypted) query
//! parameters.

use std::{collections::HashMap, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use secure_api_core::{DecryptFields, RequestContext};

use super::{error::ApiError, middleware::request_context, state::AppState};

/// Builds `T` from the query string through its [`DecryptFields`] table.
///
/// Fields are decrypted when the route is a decrypt route or the field is
/// marked for decryption, then coerced to their declared type. A field that
/// does not decrypt, convert, or fit is logged and left to `T`'s default.
#[derive(Debug, Clone)]
pub struct DecryptedQuery<T>(pub T);

#[async_trait]
impl<T: DecryptFields> FromRequestParts<AppState> for DecryptedQuery<T> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let fields = state.api.fields();
        if !state.api.settings().enabled {
            return Ok(Self(fields.decode_plain(&params)?));
        }

        let ctx = match parts.extensions.get::<Arc<RequestContext>>() {
            Some(ctx) => Arc::clone(ctx),
            None => {
                let flags = state.routes.flags(parts.uri.path());
                Arc::new(request_context(state, &parts.headers, flags))
            }
        };
        Ok(Self(fields.decode(ctx, &params).await?))
    }
}

//! Reconstruction of typed objects from decrypted request parameters.
//!
//! Types opt in by implementing [`DecryptFields`] with a static table of
//! [`FieldDescriptor`]s. Each present field is decrypted (when its marker or the
//! route says so) and coerced on a blocking worker, bounded by a semaphore.
//! The results are assembled into a JSON object and deserialised into the
//! target type.

use std::{collections::HashMap, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, warn};

use crate::{
    coerce::{CoercedValue, TypeTag, TypedValueCoder},
    context::RequestContext,
    dispatch::ModeDispatcher,
    error::SecureApiError,
};

/// Per-field override of the route's decrypt flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldMarker {
    /// Decrypt when the route decrypts.
    #[default]
    Inherit,
    /// Always decrypt.
    Decrypt,
    /// Never decrypt.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub tag: TypeTag,
    pub marker: FieldMarker,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, tag: TypeTag) -> Self {
        Self {
            name,
            tag,
            marker: FieldMarker::Inherit,
        }
    }

    pub const fn decrypt(self) -> Self {
        Self {
            marker: FieldMarker::Decrypt,
            ..self
        }
    }

    pub const fn ignore(self) -> Self {
        Self {
            marker: FieldMarker::Ignore,
            ..self
        }
    }

    pub fn needs_decrypt(&self, route_decrypts: bool) -> bool {
        match self.marker {
            FieldMarker::Inherit => route_decrypts,
            FieldMarker::Decrypt => true,
            FieldMarker::Ignore => false,
        }
    }
}

/// A type that can be rebuilt from (possibly encrypted) string parameters.
///
/// ```ignore
/// impl DecryptFields for User {
///     const FIELDS: &'static [FieldDescriptor] = &[
///         FieldDescriptor::new("name", TypeTag::Text),
///         FieldDescriptor::new("roles", TypeTag::List),
///         FieldDescriptor::new("trace", TypeTag::Text).ignore(),
///     ];
/// }
/// ```
pub trait DecryptFields: DeserializeOwned + Send + 'static {
    const FIELDS: &'static [FieldDescriptor];
}

/// The assembled fields did not build the target type.
#[derive(Debug, Error)]
#[error("could not build {type_name}: {message}")]
pub struct FieldDecodeError {
    pub type_name: &'static str,
    pub message: String,
}

/// Decrypts and coerces fields on a bounded pool of blocking workers.
#[derive(Debug, Clone)]
pub struct FieldDecoder {
    dispatcher: Arc<ModeDispatcher>,
    coder: Arc<TypedValueCoder>,
    permits: Arc<Semaphore>,
}

impl FieldDecoder {
    pub fn new(dispatcher: Arc<ModeDispatcher>, coder: Arc<TypedValueCoder>, workers: usize) -> Self {
        Self {
            dispatcher,
            coder,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Decrypt `raw` if asked to, then coerce it. `Ok(None)` means the value
    /// did not convert and should be left unset.
    pub fn decode_value(
        &self,
        ctx: &RequestContext,
        raw: &str,
        tag: TypeTag,
        decrypt: bool,
    ) -> Result<Option<CoercedValue>, SecureApiError> {
        let plaintext = if decrypt {
            self.dispatcher.decrypt(ctx, raw)?
        } else {
            raw.to_owned()
        };
        Ok(self.coder.coerce(&plaintext, tag))
    }

    /// Build `T` from `params`.
    ///
    /// Every field is handled on its own: one that is missing, fails to
    /// decrypt, fails to coerce, or does not fit its Rust type is logged and
    /// left to `T`'s serde default. `T` must therefore deserialise from any
    /// subset of its fields.
    pub async fn decode<T: DecryptFields>(
        &self,
        ctx: Arc<RequestContext>,
        params: &HashMap<String, String>,
    ) -> Result<T, FieldDecodeError> {
        let type_name = std::any::type_name::<T>();
        let route_decrypts = ctx.flags().decrypt;
        let mut tasks = JoinSet::new();

        for field in T::FIELDS.iter().copied() {
            let Some(raw) = params.get(field.name).cloned() else {
                continue;
            };
            let decoder = self.clone();
            let ctx = Arc::clone(&ctx);
            let decrypt = field.needs_decrypt(route_decrypts);
            tasks.spawn(async move {
                let _permit = Arc::clone(&decoder.permits).acquire_owned().await.ok();
                let outcome = tokio::task::spawn_blocking(move || {
                    match decoder.decode_value(&ctx, &raw, field.tag, decrypt) {
                        Ok(Some(value)) => fitted::<T>(field.name, value.into_json()),
                        Ok(None) => None,
                        Err(e) => {
                            error!(
                                request_id = ctx.request_id(),
                                type_name,
                                field = field.name,
                                error = %e,
                                "field decryption failed, skipping field"
                            );
                            None
                        }
                    }
                })
                .await;
                (field.name, outcome)
            });
        }

        let mut object = Map::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(type_name, error = %e, "field task failed, skipping field");
                    continue;
                }
            };
            match outcome {
                Ok(Some(value)) => {
                    object.insert(name.to_owned(), value);
                }
                Ok(None) => debug!(type_name, field = name, "field left unset"),
                Err(e) => error!(type_name, field = name, error = %e, "field worker failed, skipping field"),
            }
        }

        build(type_name, object)
    }

    /// Build `T` from `params` without decrypting anything, for when the
    /// middleware is switched off. Skips fields the way [`decode`](Self::decode) does.
    pub fn decode_plain<T: DecryptFields>(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<T, FieldDecodeError> {
        let object = T::FIELDS
            .iter()
            .filter_map(|field| {
                let raw = params.get(field.name)?;
                let value = self.coder.coerce(raw, field.tag)?;
                let value = fitted::<T>(field.name, value.into_json())?;
                Some((field.name.to_owned(), value))
            })
            .collect();
        build(std::any::type_name::<T>(), object)
    }
}

/// `Some(value)` when `T` accepts `value` as its `name` field.
fn fitted<T: DeserializeOwned>(name: &'static str, value: Value) -> Option<Value> {
    let mut single = Map::new();
    single.insert(name.to_owned(), value);
    let candidate = Value::Object(single);
    match serde_json::from_value::<T>(candidate.clone()) {
        Ok(_) => match candidate {
            Value::Object(mut single) => single.remove(name),
            _ => None,
        },
        Err(e) => {
            warn!(
                type_name = std::any::type_name::<T>(),
                field = name,
                error = %e,
                "value does not fit the field type, skipping field"
            );
            None
        }
    }
}

fn build<T: DeserializeOwned>(type_name: &'static str, object: Map<String, Value>) -> Result<T, FieldDecodeError> {
    serde_json::from_value(Value::Object(object)).map_err(|e| FieldDecodeError {
        type_name,
        message: e.to_string(),
    })
}

//! Callable values registered with the engines.
//!
//! Engines only see type-erased functions over `serde_json::Value`. The
//! constructors in this module bind concrete argument and return types at
//! registration time; a payload that does not fit the bound type becomes an
//! error of that single invocation.
//!
//! Hooks that take several arguments receive them as a JSON array, which
//! deserializes into a tuple:
//!
//! ```rust
//! use popmesh::messaging::hook;
//! use serde_json::json;
//!
//! let sum = hook(|(x, y): (i64, i64)| x + y);
//! assert_eq!(sum(json!([5, 7])).unwrap(), json!(12));
//! ```

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::utils::error::BoxError;

/// Computes a payload: before sending a request or publication, or when
/// answering a request.
pub type Hook = Arc<dyn Fn(Value) -> Result<Value, BoxError> + Send + Sync>;

/// Side effect run with the value a publish function just sent.
pub type AfterHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Receives publications for a topic.
pub type Handler = Arc<dyn Fn(&Value) -> Result<(), BoxError> + Send + Sync>;

pub fn hook<A, R, F>(f: F) -> Hook
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> R + Send + Sync + 'static,
{
    Arc::new(move |args: Value| {
        let args: A = serde_json::from_value(args)?;
        Ok(serde_json::to_value(f(args))?)
    })
}

/// Like [`hook`] for functions that can fail.
pub fn try_hook<A, R, E, F>(f: F) -> Hook
where
    A: DeserializeOwned,
    R: Serialize,
    E: Into<BoxError>,
    F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
{
    Arc::new(move |args: Value| {
        let args: A = serde_json::from_value(args)?;
        let out = f(args).map_err(Into::into)?;
        Ok(serde_json::to_value(out)?)
    })
}

pub fn handler<T, F>(f: F) -> Handler
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |data: &Value| {
        let data = T::deserialize(data)?;
        f(data);
        Ok(())
    })
}

/// Like [`handler`] for functions that can fail.
pub fn try_handler<T, E, F>(f: F) -> Handler
where
    T: DeserializeOwned,
    E: Into<BoxError>,
    F: Fn(T) -> Result<(), E> + Send + Sync + 'static,
{
    Arc::new(move |data: &Value| {
        let data = T::deserialize(data)?;
        f(data).map_err(Into::into)
    })
}

pub fn after<T, F>(f: F) -> AfterHandler
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |data: &Value| match T::deserialize(data) {
        Ok(data) => f(data),
        Err(e) => warn!("after handler skipped, payload did not match: {e}"),
    })
}

/// Runs user code, turning both errors and panics into a message.
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

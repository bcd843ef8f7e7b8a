//! Param: a tunable that is either a literal or computed at convergence time.

use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, Error, Result};

type Evaluator<T> = Arc<dyn Fn() -> std::result::Result<T, BoxError> + Send + Sync>;

/// A resource field holding either a fixed value or an evaluator that
/// produces it. Evaluators run once per `converge()` call and may fail, which
/// aborts convergence of the owning resource.
pub enum Param<T> {
    Literal(T),
    Deferred(Evaluator<T>),
}

impl<T: Clone> Param<T> {
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(f))
    }

    /// Resolve the current value. `field` names the tunable in the error.
    pub fn resolve(&self, field: &'static str) -> Result<T> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Deferred(f) => f().map_err(|e| Error::evaluation(field, e)),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl<T: Default> Default for Param<T> {
    fn default() -> Self {
        Self::Literal(T::default())
    }
}

impl<T> From<T> for Param<T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Param<String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl<T: Clone> Clone for Param<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(v) => Self::Literal(v.clone()),
            Self::Deferred(f) => Self::Deferred(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Param<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        let p: Param<String> = "hello".into();
        assert_eq!(p.resolve("path").unwrap(), "hello");
        assert!(!p.is_deferred());
    }

    #[test]
    fn deferred_is_evaluated_on_each_resolve() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let p = Param::deferred(move || Ok(counter.fetch_add(1, Ordering::SeqCst) as u32));
        assert_eq!(p.resolve("mode").unwrap(), 0);
        assert_eq!(p.resolve("mode").unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deferred_failure_names_the_field() {
        let p: Param<bool> = Param::deferred(|| Err("lookup failed".into()));
        let err = p.resolve("absent").unwrap_err();
        assert!(matches!(err, Error::Evaluation { field: "absent", .. }));
        assert!(err.to_string().contains("lookup failed"));
    }
}

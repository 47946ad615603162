//! Tagged outcome for reads that can legitimately find nothing.

/// Result of a lookup: the value, its documented absence, or a failure that
/// was reported by the remote side and already logged.
///
/// Callers pattern-match instead of telling "absent" and "failed" apart by
/// error type.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Error(String),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }

    /// The value if found; absence and failure both become `None`.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Error(cause) => Lookup::Error(cause),
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

impl<T> From<crate::error::Result<Option<T>>> for Lookup<T> {
    fn from(result: crate::error::Result<Option<T>>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(e) => Lookup::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_from_option() {
        assert_eq!(Lookup::from(Some(3)), Lookup::Found(3));
        assert_eq!(Lookup::<i32>::from(None), Lookup::NotFound);
    }

    #[test]
    fn test_from_result() {
        let failed: crate::error::Result<Option<i32>> =
            Err(Error::RepositoryError("gone".to_string()));
        assert_eq!(
            Lookup::from(failed),
            Lookup::Error("Repository error: gone".to_string())
        );
    }

    #[test]
    fn test_map_and_found() {
        let doubled = Lookup::Found(21).map(|v| v * 2);
        assert!(doubled.is_found());
        assert_eq!(doubled.found(), Some(42));
        assert_eq!(Lookup::<i32>::Error("x".into()).found(), None);
    }
}

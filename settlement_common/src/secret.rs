use std::{
    fmt,
    fmt::{Debug, Display},
};

/// Wraps configuration values (API keys and the like) so that they are never written to logs by accident.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl Secret<String> {
    /// True if a non-blank value has been provided.
    pub fn is_set(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::Secret;

    #[test]
    fn never_printed() {
        let s = Secret::new("sk_live_123".to_string());
        assert_eq!(format!("{s} {s:?}"), "**** ****");
        assert!(s.is_set());
        assert!(!Secret::new("  ".to_string()).is_set());
        assert_eq!(s.reveal(), "sk_live_123");
    }
}

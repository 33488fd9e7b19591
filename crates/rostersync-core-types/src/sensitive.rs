//! Sensitive data marker for automatic redaction
//!
//! Adapter options marked as secrets (API keys, client secrets) are wrapped
//! in `Sensitive<T>` as soon as they leave the settings layer.

use std::fmt;

/// Wrapper for sensitive data that redacts itself in Debug and Display
///
/// # Example
///
/// ```
/// use rostersync_core_types::Sensitive;
///
/// let api_key = Sensitive::new("hgn_sk_123");
/// assert_eq!(format!("{:?}", api_key), "***REDACTED***");
/// assert_eq!(api_key.expose(), &"hgn_sk_123");
/// ```
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the underlying value
    ///
    /// Only adapters talking to the target system should call this.
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T: Clone> Clone for Sensitive<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

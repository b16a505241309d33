//! URL path builder.
//!
//! Paths are built by concatenating segments losslessly; a segment keeps
//! whatever characters it was given, and percent-encoding happens once, at
//! URL composition time, through `reqwest::Url`'s segment API.

use std::fmt;
use std::ops::Div;

/// An ordered list of path segments, assembled with [`UrlPath::join`] or the
/// `/` operator.
///
/// ```
/// use courier_core::http::UrlPath;
///
/// let path = UrlPath::new() / "v1" / "users" / "42";
/// assert_eq!(path.to_string(), "/v1/users/42");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UrlPath {
    segments: Vec<String>,
}

impl UrlPath {
    /// Empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-segment path.
    pub fn segment(segment: impl Into<String>) -> Self {
        Self {
            segments: vec![segment.into()],
        }
    }

    /// Append one segment.
    pub fn join(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// The segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl Div<&str> for UrlPath {
    type Output = UrlPath;

    fn div(self, rhs: &str) -> UrlPath {
        self.join(rhs)
    }
}

impl Div<String> for UrlPath {
    type Output = UrlPath;

    fn div(self, rhs: String) -> UrlPath {
        self.join(rhs)
    }
}

impl Div<UrlPath> for UrlPath {
    type Output = UrlPath;

    fn div(mut self, rhs: UrlPath) -> UrlPath {
        self.segments.extend(rhs.segments);
        self
    }
}

impl fmt::Display for UrlPath {
    /// Human-readable form; not the encoded wire form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        if self.segments.is_empty() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

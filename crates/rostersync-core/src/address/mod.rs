//! Deterministic contact address generation
//!
//! ```
//! use rostersync_core::address::{AddressBook, AddressGenerator};
//!
//! let generator = AddressGenerator::new("school.org");
//! let taken = AddressBook::new();
//! assert_eq!(
//!     generator.generate("Björn", "Müller", "A1", &taken),
//!     "bmueller@school.org"
//! );
//! ```

pub mod transliterate;

use crate::errors::{ExError, ExErrorKind, Result};
use std::collections::HashSet;
pub use transliterate::sanitize_name_part;

/// Template used when none is configured: first initial + last name
pub const DEFAULT_TEMPLATE: &str = "{i}{n}";

const SEPARATORS: [char; 3] = ['.', '-', '_'];

/// Check that a configured address domain is usable.
///
/// # Errors
///
/// `InvalidConfig` when the domain is empty, contains whitespace or `@`, or
/// has no dot.
pub fn validate_domain(domain: &str) -> Result<()> {
    let invalid = |message: &str| {
        ExError::new(ExErrorKind::InvalidConfig)
            .with_op("validate_domain")
            .with_message(format!("invalid address domain '{}': {}", domain, message))
    };

    let trimmed = domain.trim();
    if trimmed.is_empty() {
        return Err(invalid("domain is empty"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("domain contains whitespace"));
    }
    if trimmed.contains('@') {
        return Err(invalid("domain must not contain '@'"));
    }
    if !trimmed.contains('.') || trimmed.starts_with('.') || trimmed.ends_with('.') {
        return Err(invalid("domain needs a dot between labels"));
    }
    Ok(())
}

/// Check that every placeholder in a template is one of `{i}`, `{v}`, `{n}`.
///
/// # Errors
///
/// `InvalidConfig` on an unknown or unterminated placeholder, or when the
/// template names no placeholder at all.
pub fn validate_template(template: &str) -> Result<()> {
    let invalid = |message: String| {
        ExError::new(ExErrorKind::InvalidConfig)
            .with_op("validate_template")
            .with_message(message)
    };

    let mut placeholders = 0;
    for segment in parse_template(template) {
        match segment {
            Segment::Placeholder(_) => placeholders += 1,
            Segment::Unknown(name) => {
                return Err(invalid(format!(
                    "unknown placeholder '{{{}}}' in address template '{}'",
                    name, template
                )))
            }
            Segment::Unterminated => {
                return Err(invalid(format!(
                    "unterminated placeholder in address template '{}'",
                    template
                )))
            }
            Segment::Literal(_) => {}
        }
    }
    if placeholders == 0 {
        return Err(invalid(format!(
            "address template '{}' has no placeholder",
            template
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Initial,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(char),
    Placeholder(Part),
    Unknown(String),
    Unterminated,
}

fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '{' {
            segments.push(Segment::Literal(ch));
            continue;
        }
        let mut name = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            name.push(inner);
        }
        segments.push(match (closed, name.as_str()) {
            (false, _) => Segment::Unterminated,
            (true, "i") => Segment::Placeholder(Part::Initial),
            (true, "v") => Segment::Placeholder(Part::First),
            (true, "n") => Segment::Placeholder(Part::Last),
            (true, _) => Segment::Unknown(name),
        });
    }
    segments
}

/// Drop leading and trailing separators and collapse repeated ones.
fn collapse_separators(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending: Option<char> = None;
    for ch in raw.chars() {
        if SEPARATORS.contains(&ch) {
            if !out.is_empty() && pending.is_none() {
                pending = Some(ch);
            }
            continue;
        }
        if let Some(sep) = pending.take() {
            out.push(sep);
        }
        out.push(ch);
    }
    out
}

/// Builds `local@domain` addresses from name parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressGenerator {
    domain: String,
    template: String,
}

impl AddressGenerator {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().to_lowercase(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Compose the local part before collision handling.
    ///
    /// Falls back to the sanitized `fallback_id`, then to `user`, when the
    /// names sanitize to nothing.
    pub fn local_part(&self, first: &str, last: &str, fallback_id: &str) -> String {
        let first = sanitize_name_part(first);
        let last = sanitize_name_part(last);
        let initial: String = first.chars().take(1).collect();

        let mut raw = String::new();
        for segment in parse_template(&self.template) {
            match segment {
                Segment::Placeholder(Part::Initial) => raw.push_str(&initial),
                Segment::Placeholder(Part::First) => raw.push_str(&first),
                Segment::Placeholder(Part::Last) => raw.push_str(&last),
                Segment::Literal(ch) if SEPARATORS.contains(&ch) => raw.push(ch),
                Segment::Literal(ch) => raw.push_str(&sanitize_name_part(&ch.to_string())),
                Segment::Unknown(_) | Segment::Unterminated => {}
            }
        }

        let local = collapse_separators(&raw);
        if !local.is_empty() {
            return local;
        }
        let fallback = sanitize_name_part(fallback_id);
        if fallback.is_empty() {
            "user".to_string()
        } else {
            fallback
        }
    }

    /// Generate an address not present in `taken`.
    ///
    /// On collision `2, 3, …` is appended to the local part. `taken` is only
    /// read; use [`AddressBook::reserve`] to claim the result within a batch.
    pub fn generate(&self, first: &str, last: &str, fallback_id: &str, taken: &AddressBook) -> String {
        let local = self.local_part(first, last, fallback_id);
        let candidate = format!("{}@{}", local, self.domain);
        if !taken.contains(&candidate) {
            return candidate;
        }

        let mut counter: u32 = 2;
        loop {
            let candidate = format!("{}{}@{}", local, counter, self.domain);
            if !taken.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Case-insensitive set of addresses already in use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    addresses: HashSet<String>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(&address.trim().to_lowercase())
    }

    /// Record an address as taken; returns `false` if it already was.
    pub fn insert(&mut self, address: &str) -> bool {
        let key = address.trim().to_lowercase();
        if key.is_empty() {
            return false;
        }
        self.addresses.insert(key)
    }

    /// Generate a free address and mark it as taken.
    pub fn reserve(
        &mut self,
        generator: &AddressGenerator,
        first: &str,
        last: &str,
        fallback_id: &str,
    ) -> String {
        let address = generator.generate(first, last, fallback_id, self);
        self.insert(&address);
        address
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AddressBook {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut book = AddressBook::new();
        for address in iter {
            book.insert(address.as_ref());
        }
        book
    }
}

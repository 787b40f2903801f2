//! # Composite Identifiers
//!
//! Encodes an ordered list of key parts (e.g. a store ARN and a key name) into
//! the single opaque ID string a controller persists, and decodes it back.
//!
//! Two modes are supported:
//! - **plain**: parts are joined with the delimiter; a part containing the
//!   delimiter is rejected because the result could not be split back.
//! - **escaping**: occurrences of the delimiter and of the escape character
//!   inside a part are prefixed with the escape character, so any part
//!   sequence round-trips.
//!
//! The expected part count is always supplied by the caller. Decoding a string
//! that yields a different number of parts fails instead of truncating or
//! padding.

use crate::error::IdError;

/// Separator used by [`IdCodec::default`].
pub const DEFAULT_SEPARATOR: char = ',';

/// Escape character used by [`IdCodec::default_escaping`].
pub const DEFAULT_ESCAPE: char = '\\';

/// Encoder/decoder for composite identifiers.
///
/// Choose the delimiter (and escape character) once and use the same codec
/// for both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCodec {
    delimiter: char,
    escape: Option<char>,
}

impl Default for IdCodec {
    fn default() -> Self {
        Self::plain(DEFAULT_SEPARATOR)
    }
}

impl IdCodec {
    /// Codec that joins parts verbatim and rejects parts containing `delimiter`.
    #[must_use]
    pub const fn plain(delimiter: char) -> Self {
        Self {
            delimiter,
            escape: None,
        }
    }

    /// Codec that escapes `delimiter` and `escape` inside parts.
    ///
    /// # Panics
    ///
    /// Panics if `delimiter` and `escape` are the same character.
    #[must_use]
    pub const fn escaping(delimiter: char, escape: char) -> Self {
        assert!(delimiter != escape, "delimiter and escape must differ");
        Self {
            delimiter,
            escape: Some(escape),
        }
    }

    /// Escaping codec with `,` as delimiter and `\` as escape.
    #[must_use]
    pub const fn default_escaping() -> Self {
        Self::escaping(DEFAULT_SEPARATOR, DEFAULT_ESCAPE)
    }

    /// The delimiter placed between parts.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Join `parts` into one identifier.
    ///
    /// # Errors
    ///
    /// * [`IdError::Arity`] if `parts.len() != expected_count`
    /// * [`IdError::InvalidPart`] if a part is empty and `allow_empty` is false,
    ///   or (plain mode) a part contains the delimiter
    pub fn encode<S: AsRef<str>>(
        &self,
        parts: &[S],
        expected_count: usize,
        allow_empty: bool,
    ) -> Result<String, IdError> {
        let raw = || {
            parts
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(self.delimiter.to_string().as_str())
        };

        if parts.len() != expected_count {
            return Err(IdError::Arity {
                id: raw(),
                expected: expected_count,
                actual: parts.len(),
            });
        }

        let mut id = String::new();
        for (index, part) in parts.iter().map(AsRef::as_ref).enumerate() {
            if part.is_empty() && !allow_empty {
                return Err(IdError::InvalidPart {
                    id: raw(),
                    index,
                    reason: "part is empty".to_string(),
                });
            }
            if index > 0 {
                id.push(self.delimiter);
            }
            match self.escape {
                Some(escape) => {
                    for c in part.chars() {
                        if c == self.delimiter || c == escape {
                            id.push(escape);
                        }
                        id.push(c);
                    }
                }
                None => {
                    if part.contains(self.delimiter) {
                        return Err(IdError::InvalidPart {
                            id: raw(),
                            index,
                            reason: format!("part contains the delimiter '{}'", self.delimiter),
                        });
                    }
                    id.push_str(part);
                }
            }
        }

        Ok(id)
    }

    /// Split an identifier produced by [`IdCodec::encode`] back into its parts.
    ///
    /// # Errors
    ///
    /// * [`IdError::Arity`] if the number of parts differs from `expected_count`
    /// * [`IdError::InvalidPart`] if a part is empty and `allow_empty` is false
    /// * [`IdError::InvalidEscape`] on a dangling or unknown escape sequence
    pub fn decode(
        &self,
        id: &str,
        expected_count: usize,
        allow_empty: bool,
    ) -> Result<Vec<String>, IdError> {
        // Zero parts encode to the empty string.
        if expected_count == 0 && id.is_empty() {
            return Ok(Vec::new());
        }

        let parts = self.split(id)?;

        if parts.len() != expected_count {
            return Err(IdError::Arity {
                id: id.to_string(),
                expected: expected_count,
                actual: parts.len(),
            });
        }

        if !allow_empty {
            if let Some(index) = parts.iter().position(String::is_empty) {
                return Err(IdError::InvalidPart {
                    id: id.to_string(),
                    index,
                    reason: "part is empty".to_string(),
                });
            }
        }

        Ok(parts)
    }

    fn split(&self, id: &str) -> Result<Vec<String>, IdError> {
        let Some(escape) = self.escape else {
            return Ok(id.split(self.delimiter).map(str::to_string).collect());
        };

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = id.char_indices();
        while let Some((position, c)) = chars.next() {
            if c == escape {
                match chars.next() {
                    Some((_, next)) if next == self.delimiter || next == escape => current.push(next),
                    _ => {
                        return Err(IdError::InvalidEscape {
                            id: id.to_string(),
                            position,
                        });
                    }
                }
            } else if c == self.delimiter {
                parts.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        parts.push(current);

        Ok(parts)
    }
}

/// Ordered key parts addressing one remote object.
///
/// Built on create, read or import and never modified afterwards; a change of
/// identity means a different object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    parts: Vec<String>,
}

impl ResourceId {
    /// Build an identifier from its parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// All parts in order.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Part at `index`, if present.
    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the identifier has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Encode with `codec`, using this identifier's own length as the arity.
    ///
    /// # Errors
    ///
    /// See [`IdCodec::encode`].
    pub fn encode_with(&self, codec: &IdCodec, allow_empty: bool) -> Result<String, IdError> {
        codec.encode(&self.parts, self.parts.len(), allow_empty)
    }

    /// Decode `id` with `codec`, requiring exactly `expected_count` parts.
    ///
    /// # Errors
    ///
    /// See [`IdCodec::decode`].
    pub fn decode_with(
        codec: &IdCodec,
        id: &str,
        expected_count: usize,
        allow_empty: bool,
    ) -> Result<Self, IdError> {
        codec
            .decode(id, expected_count, allow_empty)
            .map(|parts| Self { parts })
    }
}

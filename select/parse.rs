//! # Sparse Row Expansion
//!
//! Turns one line of the sparse text format (`label idx:value idx:value ...`)
//! into a dense feature row of fixed width. Indices on the wire are 1-based and
//! strictly increasing; every column that is not declared stays at zero.

use ndarray::ArrayViewMut1;
use thiserror::Error;

/// Label string that marks the positive class. Every other label is negative.
pub const POSITIVE_LABEL: &str = "1";

/// Every way a single input row can be rejected. Any of these aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Line {line}: the row is empty and has no class label.")]
    MissingLabel { line: usize },

    #[error("Line {line}: token '{token}' is not of the form 'index:value'.")]
    MalformedToken { line: usize, token: String },

    #[error("Line {line}: the feature index in '{token}' is not a positive integer.")]
    InvalidIndex { line: usize, token: String },

    #[error(
        "Line {line}: feature index {index} exceeds the feature-space dimension ({dimension})."
    )]
    IndexOutOfRange {
        line: usize,
        index: usize,
        dimension: usize,
    },

    #[error(
        "Line {line}: feature index {index} must be strictly greater than the previous index {previous}."
    )]
    NonIncreasingIndex {
        line: usize,
        index: usize,
        previous: usize,
    },

    #[error("Line {line}: the value in '{token}' is not a finite number.")]
    InvalidValue { line: usize, token: String },
}

impl ParseError {
    /// The 1-based input line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            Self::MissingLabel { line }
            | Self::MalformedToken { line, .. }
            | Self::InvalidIndex { line, .. }
            | Self::IndexOutOfRange { line, .. }
            | Self::NonIncreasingIndex { line, .. }
            | Self::InvalidValue { line, .. } => *line,
        }
    }
}

/// Parses `text` into `row` and returns the row's label token.
///
/// `row` must already be zeroed; its length is the feature-space dimension.
/// Only declared entries are written, so the gaps between declared indices and
/// the tail after the last one keep their zeros.
pub fn parse_row<'a>(
    text: &'a str,
    line: usize,
    mut row: ArrayViewMut1<f64>,
) -> Result<&'a str, ParseError> {
    let dimension = row.len();
    let mut tokens = text.split_ascii_whitespace();
    let label = tokens.next().ok_or(ParseError::MissingLabel { line })?;

    let mut previous = 0usize;
    for token in tokens {
        let (index_text, value_text) =
            token
                .split_once(':')
                .ok_or_else(|| ParseError::MalformedToken {
                    line,
                    token: token.to_string(),
                })?;

        let index = match lexical_core::parse::<usize>(index_text.as_bytes()) {
            Ok(index) if index >= 1 => index,
            _ => {
                return Err(ParseError::InvalidIndex {
                    line,
                    token: token.to_string(),
                });
            }
        };
        if index > dimension {
            return Err(ParseError::IndexOutOfRange {
                line,
                index,
                dimension,
            });
        }
        if index <= previous {
            return Err(ParseError::NonIncreasingIndex {
                line,
                index,
                previous,
            });
        }

        let value = match lexical_core::parse::<f64>(value_text.as_bytes()) {
            Ok(value) if value.is_finite() => value,
            _ => {
                return Err(ParseError::InvalidValue {
                    line,
                    token: token.to_string(),
                });
            }
        };

        row[index - 1] = value;
        previous = index;
    }

    Ok(label)
}

pub fn is_positive_label(label: &str) -> bool {
    label == POSITIVE_LABEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    fn expand_row(
        text: &str,
        line: usize,
        dimension: usize,
    ) -> Result<(&str, Array1<f64>), ParseError> {
        let mut row = Array1::zeros(dimension);
        let label = parse_row(text, line, row.view_mut())?;
        Ok((label, row))
    }

    #[test]
    fn declared_indices_fill_and_gaps_stay_zero() {
        let (label, row) = expand_row("1 2:0.5 4:3", 1, 6).unwrap();
        assert_eq!(label, "1");
        assert_eq!(row, array![0.0, 0.5, 0.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn label_only_row_is_all_zeros() {
        let (label, row) = expand_row("-1", 3, 3).unwrap();
        assert_eq!(label, "-1");
        assert!(!is_positive_label(label));
        assert_eq!(row, array![0.0, 0.0, 0.0]);
    }

    #[test]
    fn repeated_index_is_rejected() {
        let err = expand_row("1 1:1 2:1 2:1", 3, 3).unwrap_err();
        assert_eq!(
            err,
            ParseError::NonIncreasingIndex {
                line: 3,
                index: 2,
                previous: 2
            }
        );
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn malformed_tokens_are_reported() {
        assert!(matches!(
            expand_row("1 7", 1, 10),
            Err(ParseError::MalformedToken { .. })
        ));
        assert!(matches!(
            expand_row("1 0:2", 1, 10),
            Err(ParseError::InvalidIndex { .. })
        ));
        assert!(matches!(
            expand_row("1 x:2", 1, 10),
            Err(ParseError::InvalidIndex { .. })
        ));
        assert!(matches!(
            expand_row("1 11:2", 1, 10),
            Err(ParseError::IndexOutOfRange { index: 11, .. })
        ));
        assert!(matches!(
            expand_row("1 3:abc", 1, 10),
            Err(ParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            expand_row("   ", 9, 10),
            Err(ParseError::MissingLabel { line: 9 })
        ));
    }

    #[test]
    fn scientific_notation_values_parse() {
        let (_, row) = expand_row("0 1:1e-3 2:-2.5E2", 1, 2).unwrap();
        assert_eq!(row, array![1e-3, -250.0]);
    }
}

//! Parser error types

use crate::source::SourceFile;
use cfgscript_core::ScriptError;
use thiserror::Error;

/// Errors produced while lexing or parsing a module.
///
/// Every variant carries the byte offset it was raised at.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected character {found:?}")]
    UnexpectedCharacter { offset: usize, found: String },

    #[error("unterminated string literal")]
    UnterminatedString { offset: usize },

    #[error("invalid number literal {text:?}")]
    InvalidNumber { offset: usize, text: String },

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("unindent does not match any outer indentation level")]
    InconsistentIndent { offset: usize },

    #[error("{message}")]
    InvalidSyntax { offset: usize, message: String },

    #[error("nesting exceeds {max_depth} levels")]
    MaxDepthExceeded { offset: usize, max_depth: usize },
}

impl ParseError {
    /// Byte offset of the error in the source
    pub fn offset(&self) -> usize {
        match self {
            ParseError::UnexpectedCharacter { offset, .. }
            | ParseError::UnterminatedString { offset }
            | ParseError::InvalidNumber { offset, .. }
            | ParseError::UnexpectedToken { offset, .. }
            | ParseError::InconsistentIndent { offset }
            | ParseError::InvalidSyntax { offset, .. }
            | ParseError::MaxDepthExceeded { offset, .. } => *offset,
        }
    }

    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ParseError::InvalidSyntax {
            offset,
            message: message.into(),
        }
    }

    /// Attach the position within `file`
    pub fn into_script_error(self, file: &SourceFile) -> ScriptError {
        let position = file.position(self.offset());
        ScriptError::new(self.to_string()).at(position)
    }
}

use thiserror::Error;

/// Structural problems found while scanning a DQL fragment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("unterminated {quote} literal starting at offset {offset}")]
    UnterminatedQuote { quote: char, offset: usize },
    #[error("parenthesis opened at offset {offset} is never closed")]
    UnclosedParenthesis { offset: usize },
    #[error("unexpected closing parenthesis at offset {offset}")]
    UnexpectedClosingParenthesis { offset: usize },
}

impl TokenizeError {
    pub fn offset(&self) -> usize {
        match self {
            TokenizeError::UnterminatedQuote { offset, .. }
            | TokenizeError::UnclosedParenthesis { offset }
            | TokenizeError::UnexpectedClosingParenthesis { offset } => *offset,
        }
    }
}

//! Quote- and parenthesis-aware splitting of DQL fragments.
//!
//! Everything in the parser that cuts text into pieces goes through the scanner
//! here, so a delimiter inside a string literal (`'a, b'`) or inside an argument
//! list (`CONCAT(a, b)`) is never treated as a boundary.

use super::errors::TokenizeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Quoted { quote: char, start: usize },
}

/// Byte range of a token inside the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Shrinks the span so it excludes surrounding whitespace.
    pub fn trimmed(&self, text: &str) -> Span {
        let raw = self.slice(text);
        let lead = raw.len() - raw.trim_start().len();
        let trail = raw.len() - raw.trim_end().len();
        if lead == raw.len() {
            return Span {
                start: self.start,
                end: self.start,
            };
        }
        Span {
            start: self.start + lead,
            end: self.end - trail,
        }
    }
}

/// Scanner settings for quoted literals. A doubled quote always escapes the
/// quote character; a backslash escapes the next character only when
/// `backslash_escapes` is set, matching how the target database reads its
/// string literals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scanner {
    backslash_escapes: bool,
}

impl Scanner {
    pub const fn new(backslash_escapes: bool) -> Self {
        Scanner { backslash_escapes }
    }

    /// Runs the scanning state machine over `text`.
    ///
    /// `visit(offset, ch, top_level)` is called for every character outside quoted
    /// literals, plus the opening quote of each literal. `top_level` is true when
    /// the character is not nested inside parentheses; for `)` it reports the depth
    /// after the group closes. Returning `false` from `visit` stops the scan early,
    /// in which case balance is not checked.
    fn scan<F>(&self, text: &str, mut visit: F) -> Result<(), TokenizeError>
    where
        F: FnMut(usize, char, bool) -> bool,
    {
        let mut state = ScanState::Normal;
        let mut open_parens: Vec<usize> = Vec::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match state {
                ScanState::Quoted { quote, .. } => {
                    if ch == '\\' && self.backslash_escapes {
                        chars.next();
                    } else if ch == quote {
                        // a doubled quote is an escaped quote
                        if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                            chars.next();
                        } else {
                            state = ScanState::Normal;
                        }
                    }
                }
                ScanState::Normal => {
                    let keep_going = match ch {
                        '\'' | '"' => {
                            state = ScanState::Quoted { quote: ch, start: offset };
                            visit(offset, ch, open_parens.is_empty())
                        }
                        '(' => {
                            let top = open_parens.is_empty();
                            open_parens.push(offset);
                            visit(offset, ch, top)
                        }
                        ')' => {
                            if open_parens.pop().is_none() {
                                return Err(TokenizeError::UnexpectedClosingParenthesis { offset });
                            }
                            visit(offset, ch, open_parens.is_empty())
                        }
                        _ => visit(offset, ch, open_parens.is_empty()),
                    };
                    if !keep_going {
                        return Ok(());
                    }
                }
            }
        }

        if let ScanState::Quoted { quote, start } = state {
            return Err(TokenizeError::UnterminatedQuote {
                quote,
                offset: start,
            });
        }
        if let Some(&offset) = open_parens.last() {
            return Err(TokenizeError::UnclosedParenthesis { offset });
        }
        Ok(())
    }

    /// Checks that quotes and parentheses in `text` are balanced.
    pub fn validate(&self, text: &str) -> Result<(), TokenizeError> {
        self.scan(text, |_, _, _| true)
    }

    /// Splits `text` at every top-level occurrence of `delimiter`.
    ///
    /// The returned spans are untrimmed and always cover the whole input, so
    /// `"a,,b"` yields three spans, the middle one empty.
    pub fn split_top_level_spans(&self, text: &str, delimiter: &str) -> Result<Vec<Span>, TokenizeError> {
        let mut cuts = Vec::new();
        let mut skip_until = 0;
        self.scan(text, |offset, _, top| {
            if !delimiter.is_empty()
                && top
                && offset >= skip_until
                && text[offset..].starts_with(delimiter)
            {
                cuts.push(offset);
                skip_until = offset + delimiter.len();
            }
            true
        })?;

        let mut spans = Vec::with_capacity(cuts.len() + 1);
        let mut start = 0;
        for cut in cuts {
            spans.push(Span { start, end: cut });
            start = cut + delimiter.len();
        }
        spans.push(Span {
            start,
            end: text.len(),
        });
        Ok(spans)
    }

    /// Splits `text` at top-level `delimiter`s and trims every piece.
    pub fn split_top_level<'a>(&self, text: &'a str, delimiter: &str) -> Result<Vec<&'a str>, TokenizeError> {
        Ok(self.split_top_level_spans(text, delimiter)?
            .into_iter()
            .map(|span| span.slice(text).trim())
            .collect())
    }

    /// Spans of the whitespace-separated words of `text`, where a parenthesised
    /// group or a quoted literal never gets cut.
    pub fn top_level_words(&self, text: &str) -> Result<Vec<Span>, TokenizeError> {
        let mut words = Vec::new();
        let mut current: Option<usize> = None;
        self.scan(text, |offset, ch, top| {
            if ch.is_whitespace() {
                if top {
                    if let Some(start) = current.take() {
                        words.push(Span { start, end: offset });
                    }
                }
            } else if current.is_none() {
                current = Some(offset);
            }
            true
        })?;
        if let Some(start) = current {
            words.push(Span {
                start,
                end: text.len(),
            });
        }
        Ok(words)
    }

    /// Breaks an expression into its top-level words, e.g. to separate
    /// `COUNT(p.id) DESC` into the expression and its direction keyword.
    pub fn bracket_explode<'a>(&self, text: &'a str) -> Result<Vec<&'a str>, TokenizeError> {
        Ok(self.top_level_words(text)?
            .into_iter()
            .map(|span| span.slice(text))
            .collect())
    }

    /// Number of positional `?` placeholders outside quoted literals.
    pub fn count_placeholders(&self, text: &str) -> Result<usize, TokenizeError> {
        let mut count = 0;
        self.scan(text, |_, ch, _| {
            if ch == '?' {
                count += 1;
            }
            true
        })?;
        Ok(count)
    }

    /// Offset of the parenthesis closing the group that opens at `open`.
    pub fn closing_paren(&self, text: &str, open: usize) -> Result<usize, TokenizeError> {
        let tail = &text[open..];
        let mut close = None;
        self.scan(tail, |offset, ch, top| {
            if ch == ')' && top {
                close = Some(open + offset);
                return false;
            }
            true
        })?;
        close.ok_or(TokenizeError::UnclosedParenthesis { offset: open })
    }

    /// Offset just past the quoted literal that starts at `open`.
    pub fn literal_end(&self, text: &str, open: usize) -> usize {
        let mut chars = text[open..].char_indices().peekable();
        let Some((_, quote)) = chars.next() else {
            return text.len();
        };
        while let Some((offset, ch)) = chars.next() {
            if ch == '\\' && self.backslash_escapes {
                chars.next();
            } else if ch == quote {
                if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                    chars.next();
                } else {
                    return open + offset + ch.len_utf8();
                }
            }
        }
        text.len()
    }
}

//! Character-level helpers shared by the extractors and the parser.

use crate::error::{Error, Result};
use crate::extract::{PLACEHOLDER_END, PLACEHOLDER_START};
use crate::token::Operators;

#[must_use]
/// Check if `ident` is a valid function or parameter name
///
/// # Examples
///
/// ```
/// # use formulary::is_identifier;
///
/// assert_eq!(is_identifier("__abc3"), true);
/// assert_eq!(is_identifier("34zb"), false);
/// ```
pub fn is_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    // Check first char
    if !chars.next().map_or(false, is_identifier_start) {
        return false;
    }
    chars.all(is_identifier_part)
}

/// Check if `c` can appear at the first character of an identifier
pub(crate) fn is_identifier_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

/// Check if `c` can appear inside an identifier
pub(crate) fn is_identifier_part(c: char) -> bool {
    c == '_' || c == '.' || c.is_alphanumeric()
}

/// Remove the whitespace of `text`. Blanks may surround operators, but two
/// operands separated only by blanks (`2 3`, `a b`) are a structural error.
pub(crate) fn strip_whitespace(text: &str, operators: &Operators) -> Result<String> {
    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((position, c)) = chars.next() {
        if !c.is_whitespace() {
            stripped.push(c);
            continue;
        }
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let rest = chars.peek().map_or("", |(next, _)| &text[*next..]);
        let glued = stripped.chars().next_back().map_or(false, is_operand_part)
            && rest.chars().next().map_or(false, is_operand_part)
            && !operators.ends_with_operator(&stripped)
            && operators.match_at(rest).is_none();
        if glued {
            return Err(Error::Structural(format!(
                "operator missing between operands at offset {}",
                position
            )));
        }
    }
    Ok(stripped)
}

fn is_operand_part(c: char) -> bool {
    c == PLACEHOLDER_START || c == PLACEHOLDER_END || is_identifier_part(c)
}

/// Length in bytes of the number written in scientific notation at the start of
/// `text`, such as `1.5e-3` or `2E+10`. Plain numbers without an exponent are
/// left to the constant interpreters.
pub(crate) fn scientific_number_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut position = digits(bytes, 0);
    if position == 0 {
        return None;
    }
    if bytes.get(position) == Some(&b'.') {
        position = digits(bytes, position + 1);
    }
    if !matches!(bytes.get(position), Some(b'e') | Some(b'E')) {
        return None;
    }
    position += 1;
    if matches!(bytes.get(position), Some(b'+') | Some(b'-')) {
        position += 1;
    }
    let exponent_end = digits(bytes, position);
    if exponent_end == position {
        return None;
    }
    // `2e5x` is an identifier-ish token, not a number
    if text[exponent_end..]
        .chars()
        .next()
        .map_or(false, is_identifier_part)
    {
        return None;
    }
    Some(exponent_end)
}

fn digits(bytes: &[u8], mut position: usize) -> usize {
    while bytes.get(position).map_or(false, u8::is_ascii_digit) {
        position += 1;
    }
    position
}

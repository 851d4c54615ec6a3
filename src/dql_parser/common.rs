use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, recognize},
    multi::separated_list1,
    sequence::pair,
    IResult, Parser,
};

pub fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

/// `User`, `u.Phonenumber`, `u.Group.Email`
pub fn dotted_path(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char('.'), identifier).parse(input)
}

fn digits(input: &str) -> IResult<&str, &str> {
    digit1(input)
}

pub fn is_identifier(text: &str) -> bool {
    all_consuming(identifier).parse(text).is_ok()
}

pub fn parse_path(text: &str) -> Option<Vec<&str>> {
    all_consuming(dotted_path)
        .parse(text)
        .ok()
        .map(|(_, path)| path)
}

pub fn parse_unsigned(text: &str) -> Option<u64> {
    all_consuming(digits)
        .parse(text)
        .ok()
        .and_then(|(_, value)| value.parse().ok())
}

pub fn keyword_eq(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

/// True when `text` begins with `keyword` as a whole word.
pub fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.len() >= keyword.len()
        && text.is_char_boundary(keyword.len())
        && text[..keyword.len()].eq_ignore_ascii_case(keyword)
        && text[keyword.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

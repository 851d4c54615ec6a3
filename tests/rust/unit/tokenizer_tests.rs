use dql_compiler::dql_parser::errors::TokenizeError;
use dql_compiler::dql_parser::tokenizer::Scanner;
use test_case::test_case;

#[test_case("u.name, COUNT(p.id), u.id", &["u.name", "COUNT(p.id)", "u.id"] ; "plain list")]
#[test_case("CONCAT(u.name, ', ', u.loginname), u.id", &["CONCAT(u.name, ', ', u.loginname)", "u.id"] ; "comma inside call and literal")]
#[test_case("'a,b'", &["'a,b'"] ; "single literal")]
fn test_split_on_top_level_commas(text: &str, expected: &[&str]) {
    assert_eq!(Scanner::default().split_top_level(text, ",").unwrap(), expected);
}

#[test]
fn test_bracket_explode_keeps_groups_whole() {
    assert_eq!(Scanner::default().bracket_explode("COUNT(p.id) DESC").unwrap(), vec!["COUNT(p.id)", "DESC"]);
    assert_eq!(
        Scanner::default().bracket_explode("u.id IN (SELECT p.entity_id FROM Phonenumber p)").unwrap(),
        vec!["u.id", "IN", "(SELECT p.entity_id FROM Phonenumber p)"]
    );
}

#[test_case("u.name = ?", 1 ; "single")]
#[test_case("u.name = '?' AND u.id = ?", 1 ; "quoted mark ignored")]
#[test_case("u.id IN (?, ?, ?)", 3 ; "list")]
#[test_case("u.name = 'it''s ?'", 0 ; "doubled quote")]
fn test_placeholders_outside_literals(text: &str, expected: usize) {
    assert_eq!(Scanner::default().count_placeholders(text).unwrap(), expected);
}

#[test]
fn test_unbalanced_input_is_rejected() {
    assert_eq!(
        Scanner::default().validate("u.name = 'zYne").unwrap_err(),
        TokenizeError::UnterminatedQuote { quote: '\'', offset: 9 }
    );
    assert_eq!(
        Scanner::default().validate("(u.id = 1").unwrap_err(),
        TokenizeError::UnclosedParenthesis { offset: 0 }
    );
    assert_eq!(
        Scanner::default().validate("u.id = 1)").unwrap_err(),
        TokenizeError::UnexpectedClosingParenthesis { offset: 8 }
    );
}

#[test]
fn test_backslash_escapes_follow_scanner_setting() {
    let windows_path = r"u.path = 'C:\' AND u.id = ?";
    assert_eq!(Scanner::default().count_placeholders(windows_path).unwrap(), 1);
    assert!(Scanner::new(true).validate(windows_path).is_err());

    let escaped_quote = r"u.name = 'it\'s ?'";
    assert_eq!(Scanner::new(true).count_placeholders(escaped_quote).unwrap(), 0);
    assert!(Scanner::default().validate(escaped_quote).is_err());
}

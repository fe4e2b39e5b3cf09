/// Splits a message into arguments.
///
/// Handles:
/// - Whitespace-separated arguments
/// - Double-quoted strings, which may be empty and may contain whitespace
/// - Backslash escapes within quotes
///
/// Single quotes are ordinary characters, so apostrophes in chat text stay
/// intact. An unterminated quote runs to the end of the input.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_quote => escape_next = true,
            '"' => {
                in_quote = !in_quote;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quote => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }
    args
}

/// Splits `name-prop` into the command base and its property.
///
/// `"bet-all"` gives `("bet", "all")`; a name without a dash has an empty
/// property. Only the first dash counts.
pub fn split_name(name: &str) -> (&str, &str) {
    let mut parts = name.split('-').map(str::trim);
    let base = parts.next().unwrap_or_default();
    let prop = parts.next().unwrap_or_default();
    (base, prop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        assert_eq!(split_args("+echo hello  world"), vec!["+echo", "hello", "world"]);
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_args(r#"+bet "two words" 10"#),
            vec!["+bet", "two words", "10"]
        );
        assert_eq!(split_args(r#"say "" x"#), vec!["say", "", "x"]);
    }

    #[test]
    fn test_split_escapes_inside_quotes() {
        assert_eq!(split_args(r#"say "a \"b\" c""#), vec!["say", r#"a "b" c"#]);
    }

    #[test]
    fn test_apostrophes_are_plain() {
        assert_eq!(split_args("don't stop"), vec!["don't", "stop"]);
    }

    #[test]
    fn test_unterminated_quote_takes_the_rest() {
        assert_eq!(split_args(r#"say "hello there"#), vec!["say", "hello there"]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_args("").is_empty());
        assert!(split_args(" \t\n ").is_empty());
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("bet-all"), ("bet", "all"));
        assert_eq!(split_name("ping"), ("ping", ""));
        assert_eq!(split_name("a-b-c"), ("a", "b"));
        assert_eq!(split_name(""), ("", ""));
    }
}

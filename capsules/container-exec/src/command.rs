use crate::SandboxError;

/// Split a command line into arguments the way a POSIX shell would,
/// without expanding anything.
///
/// Supports single quotes, double quotes (where `\"` and `\\` are escapes)
/// and backslash escapes outside quotes. Unbalanced quotes are an error.
pub fn split_command(command: &str) -> Result<Vec<String>, SandboxError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unbalanced('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(unbalanced('"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unbalanced('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => {
                        return Err(SandboxError::InvalidCommand {
                            message: "trailing backslash".to_string(),
                        })
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

fn unbalanced(quote: char) -> SandboxError {
    SandboxError::InvalidCommand {
        message: format!("unbalanced {} quote", quote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words() {
        assert_eq!(
            split_command("  --input file.txt  --verbose ").unwrap(),
            ["--input", "file.txt", "--verbose"]
        );
    }

    #[test]
    fn quoted_arguments_keep_spaces() {
        assert_eq!(
            split_command(r#"python word_counter.py "hello world" 'it''s'"#).unwrap(),
            ["python", "word_counter.py", "hello world", "its"]
        );
    }

    #[test]
    fn escapes_inside_and_outside_quotes() {
        assert_eq!(
            split_command(r#""say \"hi\"" a\ b "C:\path""#).unwrap(),
            [r#"say "hi""#, "a b", r"C:\path"]
        );
    }

    #[test]
    fn empty_quotes_are_an_argument() {
        assert_eq!(split_command("a '' b").unwrap(), ["a", "", "b"]);
    }

    #[test]
    fn empty_input_has_no_arguments() {
        assert!(split_command("   ").unwrap().is_empty());
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        assert!(matches!(
            split_command("\"hello"),
            Err(SandboxError::InvalidCommand { .. })
        ));
        assert!(split_command("it's").is_err());
        assert!(split_command("end\\").is_err());
    }
}

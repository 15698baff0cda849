//! Turning free-form oracle replies into the values the pipeline consumes.

use crate::{OracleError, ScriptRequirements};

const FENCE: &str = "```";
const SHELL_TAGS: &[&str] = &["bash", "sh", "shell", "console", "zsh"];

/// Extract the body of the first fenced block in `text`.
///
/// Replies without any fence are taken as-is. A fence that is opened but
/// never closed is an error, as is an empty body.
pub fn strip_code_fence(text: &str) -> Result<String, OracleError> {
    let trimmed = text.trim();
    let Some(open) = trimmed.find(FENCE) else {
        if trimmed.is_empty() {
            return Err(OracleError::parse("response is empty"));
        }
        return Ok(trimmed.to_string());
    };

    // Everything up to the end of the opening line is the fence and its
    // language tag.
    let after_open = &trimmed[open + FENCE.len()..];
    let Some(newline) = after_open.find('\n') else {
        return Err(OracleError::parse("code fence has no body"));
    };
    let body = &after_open[newline + 1..];
    let Some(close) = body.find(FENCE) else {
        return Err(OracleError::parse("code fence is not closed"));
    };

    let content = body[..close].trim();
    if content.is_empty() {
        return Err(OracleError::parse("code fence is empty"));
    }
    Ok(content.to_string())
}

pub fn parse_requirements(text: &str) -> Result<ScriptRequirements, OracleError> {
    let json = strip_code_fence(text)?;
    serde_json::from_str(&json)
        .map_err(|e| OracleError::parse(format!("invalid requirements document: {e}")))
}

/// Pull the container arguments out of an example-analysis reply.
pub fn parse_command(text: &str) -> Result<String, OracleError> {
    let body = if text.contains(FENCE) {
        strip_code_fence(text)?
    } else {
        text.trim().to_string()
    };

    body.lines()
        .map(|line| line.trim().trim_matches('`').trim())
        .filter(|line| !line.is_empty())
        .find(|line| !SHELL_TAGS.contains(&line.to_ascii_lowercase().as_str()))
        .map(|line| line.strip_prefix("$ ").unwrap_or(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| OracleError::parse("no valid command found in example"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_dockerfile_is_unwrapped() {
        let reply = "```dockerfile\nFROM debian:bookworm\nCOPY a.py /app/\n```";
        assert_eq!(
            strip_code_fence(reply).unwrap(),
            "FROM debian:bookworm\nCOPY a.py /app/"
        );
    }

    #[test]
    fn prose_around_fence_is_dropped() {
        let reply = "Here you go:\n```\nFROM ubuntu\n```\nGood luck.";
        assert_eq!(strip_code_fence(reply).unwrap(), "FROM ubuntu");
    }

    #[test]
    fn bare_text_passes_through() {
        assert_eq!(strip_code_fence("  FROM ubuntu\n").unwrap(), "FROM ubuntu");
    }

    #[test]
    fn unterminated_fence_is_rejected() {
        let err = strip_code_fence("```dockerfile\nFROM ubuntu\n").unwrap_err();
        assert!(err.is_content_error());
    }

    #[test]
    fn empty_fence_is_rejected() {
        assert!(strip_code_fence("```dockerfile\n\n```").is_err());
        assert!(strip_code_fence("   ").is_err());
    }

    #[test]
    fn requirements_accept_json_fence() {
        let reply = "```json\n{\"language\": \"Go\"}\n```";
        assert_eq!(parse_requirements(reply).unwrap().language, "Go");
    }

    #[test]
    fn requirements_reject_non_json() {
        assert!(parse_requirements("the script is python").is_err());
    }

    #[test]
    fn command_from_fenced_block() {
        let reply = "```bash\n\"hello world\"\n```";
        assert_eq!(parse_command(reply).unwrap(), "\"hello world\"");
    }

    #[test]
    fn command_with_shell_tag_line() {
        assert_eq!(parse_command("bash\n--input file.txt").unwrap(), "--input file.txt");
        assert_eq!(parse_command("`data.csv --mode full`").unwrap(), "data.csv --mode full");
    }

    #[test]
    fn command_keeps_words_containing_shell_names() {
        assert_eq!(parse_command("--shell bash").unwrap(), "--shell bash");
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = parse_command("```\nbash\n```").unwrap_err();
        assert!(err.to_string().contains("no valid command"));
    }
}

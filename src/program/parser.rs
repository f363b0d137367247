//! Turns model replies into programs.
//!
//! Replies are rarely clean JSON: they come wrapped in code fences or
//! surrounded by prose. The parser extracts the outermost JSON value and
//! accepts either `{"steps": [...]}` or a bare array of instructions.

use super::instruction::Instruction;
use super::{Program, ProgramError};
use serde::Deserialize;

#[derive(Deserialize)]
struct Document {
    steps: Vec<Instruction>,
}

pub fn parse(source: &str) -> Result<Program, ProgramError> {
    let body = json_body(source)
        .ok_or_else(|| ProgramError::Parse("reply contains no JSON program".to_string()))?;

    let steps = if body.starts_with('[') {
        serde_json::from_str::<Vec<Instruction>>(body)
    } else {
        serde_json::from_str::<Document>(body).map(|doc| doc.steps)
    }
    .map_err(|e| ProgramError::Parse(e.to_string()))?;

    if steps.is_empty() {
        return Err(ProgramError::Empty);
    }

    Ok(Program { steps })
}

/// Slice from the first opening bracket to its matching last closing bracket
fn json_body(source: &str) -> Option<&str> {
    let start = source.find(['{', '['])?;
    let close = if source[start..].starts_with('{') { '}' } else { ']' };
    let end = source.rfind(close)?;
    (end > start).then(|| &source[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_document() {
        let program = parse(r#"{"steps": [{"op": "grayscale"}, {"op": "output"}]}"#).unwrap();
        assert_eq!(
            program.steps,
            vec![Instruction::Grayscale, Instruction::Output]
        );
    }

    #[test]
    fn test_parse_fenced_reply_with_prose() {
        let reply = concat!(
            "Here is a program for this image:\n",
            "```json\n",
            "[\n",
            "  {\"op\": \"brighten\", \"alpha\": 1.2},\n",
            "  {\"op\": \"output\"}\n",
            "]\n",
            "```\n",
            "It brightens the photo."
        );
        let program = parse(reply).unwrap();
        assert_eq!(program.steps.len(), 2);
        assert_eq!(
            program.steps[0],
            Instruction::Brighten {
                alpha: 1.2,
                beta: 20.0
            }
        );
    }

    #[test]
    fn test_prose_only_is_parse_error() {
        let err = parse("I cannot help with that.").unwrap_err();
        assert!(matches!(err, ProgramError::Parse(_)));
    }

    #[test]
    fn test_unknown_opcode_is_parse_error() {
        let err = parse(r#"[{"op": "import", "module": "os"}]"#).unwrap_err();
        assert!(matches!(err, ProgramError::Parse(_)));
    }

    #[test]
    fn test_empty_program_is_rejected() {
        assert!(matches!(parse(r#"{"steps": []}"#), Err(ProgramError::Empty)));
    }
}

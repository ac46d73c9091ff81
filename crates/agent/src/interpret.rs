use h2pc_core::domain::message::Message;
use h2pc_core::domain::prompt::Operator;
use thiserror::Error;

const THOUGHT_OPEN: &str = "<thought>";
const THOUGHT_CLOSE: &str = "</thought>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error("Index operator expected an integer, got `{content}`")]
    NotAnIndex { content: String },
}

/// Trims the completion and drops a leading `<thought>` preamble up to the
/// last `</thought>`.
pub fn strip_thought(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with(THOUGHT_OPEN) {
        return trimmed;
    }
    match trimmed.rsplit_once(THOUGHT_CLOSE) {
        Some((_, answer)) => answer.trim(),
        None => trimmed,
    }
}

/// Maps a completion onto the batch according to `operator`.
///
/// `Index` selects `batch[idx - 1]` for `1 <= idx < batch.len()`; the last
/// element of the batch is never selectable.
pub fn interpret(
    operator: Operator,
    completion: Option<Message>,
    batch: &[Message],
) -> Result<Option<Message>, InterpretError> {
    let Some(completion) = completion else {
        return Ok(None);
    };
    let content = strip_thought(&completion.content);

    match operator {
        Operator::Message => Ok(Some(Message::assistant(content))),
        Operator::Index => {
            let Some(index) = parse_index(content)? else {
                return Ok(None);
            };
            if index < 1 || index >= batch.len() as i64 {
                return Ok(None);
            }
            Ok(batch.get((index - 1) as usize).cloned())
        }
    }
}

/// Decimal integer with an optional sign and single `_` separators between
/// digits. `Ok(None)` for integers too large for `i64`; they are out of range
/// anyway.
fn parse_index(content: &str) -> Result<Option<i64>, InterpretError> {
    let (sign, body) = match content.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", content.strip_prefix('+').unwrap_or(content)),
    };
    let grouped = !body.is_empty()
        && body
            .split('_')
            .all(|group| !group.is_empty() && group.bytes().all(|byte| byte.is_ascii_digit()));
    if !grouped {
        return Err(InterpretError::NotAnIndex { content: content.to_string() });
    }
    Ok(format!("{sign}{}", body.replace('_', "")).parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use h2pc_core::domain::message::{Message, Role};
    use h2pc_core::domain::prompt::Operator;

    use super::{interpret, strip_thought, InterpretError};

    fn batch() -> Vec<Message> {
        vec![Message::user("m1"), Message::user("m2"), Message::user("m3")]
    }

    #[test]
    fn strips_thought_preamble_up_to_last_close_tag() {
        assert_eq!(strip_thought("  <thought>reasoning</thought>final answer  "), "final answer");
        assert_eq!(strip_thought("<thought>a</thought>b</thought>  c "), "c");
        assert_eq!(strip_thought("\n plain answer \t"), "plain answer");
    }

    #[test]
    fn thought_marker_must_lead() {
        assert_eq!(strip_thought("answer <thought>x</thought> tail"), "answer <thought>x</thought> tail");
        assert_eq!(strip_thought("<thought>never closed"), "<thought>never closed");
    }

    #[test]
    fn stripping_twice_equals_stripping_once() {
        let samples = [
            "  <thought>reasoning</thought>final answer  ",
            "<thought>a</thought><thought>b",
            "<thought></thought>   ",
            "no markers",
            "<thought>x</thought> <thought>y</thought> z",
            "",
        ];
        for sample in samples {
            let once = strip_thought(sample);
            assert_eq!(strip_thought(once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn message_operator_synthesizes_assistant_reply() {
        let completion = Message::assistant("  <thought>reasoning</thought>final answer  ");

        let output = interpret(Operator::Message, Some(completion), &batch()).expect("interpret");

        let output = output.expect("message");
        assert_eq!(output.role, Role::Assistant);
        assert_eq!(output.content, "final answer");
        assert_eq!(output.name, None);
    }

    #[test]
    fn absent_completion_is_absent_for_every_operator() {
        assert_eq!(interpret(Operator::Message, None, &batch()), Ok(None));
        assert_eq!(interpret(Operator::Index, None, &batch()), Ok(None));
    }

    #[test]
    fn index_selects_one_based_position() {
        let output = interpret(Operator::Index, Some(Message::assistant("2")), &batch());
        assert_eq!(output, Ok(Some(Message::user("m2"))));

        let output = interpret(Operator::Index, Some(Message::assistant(" <thought>hm</thought> 1 ")), &batch());
        assert_eq!(output, Ok(Some(Message::user("m1"))));
    }

    #[test]
    fn index_excludes_last_element_and_out_of_range() {
        for content in ["3", "4", "0", "-1", "99999999999999999999999"] {
            let output = interpret(Operator::Index, Some(Message::assistant(content)), &batch());
            assert_eq!(output, Ok(None), "content {content:?}");
        }
        let output = interpret(Operator::Index, Some(Message::assistant("1")), &[]);
        assert_eq!(output, Ok(None));
    }

    #[test]
    fn non_numeric_index_is_fatal() {
        let contents = ["two", "2.0", "", "<thought>2</thought>second", "_1", "1_", "1__0", "+-1"];
        for content in contents {
            let output = interpret(Operator::Index, Some(Message::assistant(content)), &batch());
            assert!(
                matches!(output, Err(InterpretError::NotAnIndex { .. })),
                "content {content:?} gave {output:?}"
            );
        }
    }

    #[test]
    fn index_accepts_underscore_digit_separators() {
        let output = interpret(Operator::Index, Some(Message::assistant("0_2")), &batch());
        assert_eq!(output, Ok(Some(Message::user("m2"))));

        // 10 is past the end of a three element batch
        let output = interpret(Operator::Index, Some(Message::assistant("1_0")), &batch());
        assert_eq!(output, Ok(None));
    }
}

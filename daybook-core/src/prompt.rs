// Prompt template for the generation engine
//
// The template is fixed: chatml-style role prefixes with `<|end|>` as the
// turn terminator. The same string doubles as the stream's stop marker, so
// the assembler can cut the reply at the end of the assistant turn. Role
// markers must stay stable across calls or the model stops producing
// well-formed turn boundaries.

use crate::types::ConversationTurn;

/// Sentinel whose appearance in cumulative output ends the stream.
pub const STOP_MARKER: &str = "<|end|>";

const USER_PREFIX: &str = "<|user|>\n";
const ASSISTANT_PREFIX: &str = "<|assistant|>\n";

/// Render history plus the pending user message into one prompt string.
/// Each past turn becomes a user segment and an assistant segment, both
/// closed with the stop marker; the pending message trails with an open
/// assistant segment for the model to complete.
pub fn build_prompt(history: &[ConversationTurn], message: &str) -> String {
    let mut prompt = String::new();
    for turn in history {
        prompt.push_str(USER_PREFIX);
        prompt.push_str(&turn.user);
        prompt.push_str(STOP_MARKER);
        prompt.push('\n');
        prompt.push_str(ASSISTANT_PREFIX);
        prompt.push_str(&turn.assistant);
        prompt.push_str(STOP_MARKER);
        prompt.push('\n');
    }
    prompt.push_str(USER_PREFIX);
    prompt.push_str(message);
    prompt.push_str(STOP_MARKER);
    prompt.push('\n');
    prompt.push_str(ASSISTANT_PREFIX);
    prompt
}

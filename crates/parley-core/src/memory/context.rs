//! Rendering stored history into model input.

use crate::core_types::{ChatMessage, Message, Role, ToolCall, ToolOutput};

/// Tail of `history` holding at most `max_messages` entries where possible.
///
/// The window always opens on a `UserMessage` so a tool observation is never
/// sent without the action that requested it. If no user message falls inside
/// the tail, the window reaches back to the latest one before it.
pub fn context_window(history: &[Message], max_messages: usize) -> &[Message] {
    if history.len() <= max_messages {
        return history;
    }

    let start = history.len() - max_messages;
    let boundary = history[start..]
        .iter()
        .position(Message::is_user_message)
        .map(|offset| start + offset)
        .or_else(|| history[..start].iter().rposition(Message::is_user_message))
        .unwrap_or(0);

    &history[boundary..]
}

/// Chat messages for one model query: the system prompt, then `entries`.
///
/// Consecutive `AgentAction`s become one assistant message carrying all of
/// their tool calls, matching how the model requested them.
pub fn to_chat_messages(system_prompt: &str, entries: &[Message]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    let mut pending_calls: Vec<ToolCall> = Vec::new();

    for entry in entries {
        if let Message::AgentAction {
            call_id,
            tool_name,
            arguments,
        } = entry
        {
            pending_calls.push(ToolCall {
                id: Some(call_id.clone()),
                name: tool_name.clone(),
                arguments: arguments.clone(),
            });
            continue;
        }

        flush_calls(&mut messages, &mut pending_calls);

        match entry {
            Message::UserMessage { text } => messages.push(ChatMessage::user(text.clone())),
            Message::FinalAnswer { text } => messages.push(ChatMessage::assistant(text.clone())),
            Message::ToolObservation { call_id, output, .. } => messages.push(ChatMessage {
                role: Role::Tool,
                content: match output {
                    ToolOutput::Success { value } => value.clone(),
                    ToolOutput::Failure { reason } => format!("Error: {}", reason),
                },
                tool_call_id: Some(call_id.clone()),
                tool_calls: None,
            }),
            Message::AgentAction { .. } => {}
        }
    }
    flush_calls(&mut messages, &mut pending_calls);

    messages
}

fn flush_calls(messages: &mut Vec<ChatMessage>, pending: &mut Vec<ToolCall>) {
    if pending.is_empty() {
        return;
    }
    messages.push(ChatMessage {
        role: Role::Assistant,
        content: String::new(),
        tool_call_id: None,
        tool_calls: Some(std::mem::take(pending)),
    });
}

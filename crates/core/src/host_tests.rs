// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn message(role: &str, parts: Vec<(&str, &str)>) -> SessionMessage {
    SessionMessage {
        info: MessageInfo { role: role.to_owned(), model: None, model_id: None, provider_id: None },
        parts: parts.into_iter().map(|(kind, text)| MessagePart { kind: kind.to_owned(), text: Some(text.to_owned()) }).collect(),
    }
}

#[test]
fn extracts_text_and_reasoning_parts_joined_by_blank_lines() {
    let messages = vec![message("user", vec![("text", "ignored")]), message("assistant", vec![("reasoning", "thinking"), ("text", "the answer")])];
    let result = extract_last_assistant_message(&messages).unwrap();
    assert_eq!(result, "thinking\n\nthe answer");
}

#[test]
fn uses_the_last_assistant_message_when_several_exist() {
    let messages = vec![message("assistant", vec![("text", "first")]), message("user", vec![("text", "reply")]), message("assistant", vec![("text", "second")])];
    let result = extract_last_assistant_message(&messages).unwrap();
    assert_eq!(result, "second");
}

#[test]
fn no_assistant_message_yields_none() {
    let messages = vec![message("user", vec![("text", "hi")])];
    assert!(extract_last_assistant_message(&messages).is_none());
}

#[test]
fn whitespace_only_content_falls_back_to_no_output_literal() {
    let messages = vec![message("assistant", vec![("text", "   ")])];
    let result = extract_last_assistant_message(&messages).unwrap();
    assert_eq!(result, "(No output)");
}

#[test]
fn non_text_parts_are_ignored() {
    let messages = vec![message("assistant", vec![("tool_call", "irrelevant"), ("text", "kept")])];
    let result = extract_last_assistant_message(&messages).unwrap();
    assert_eq!(result, "kept");
}

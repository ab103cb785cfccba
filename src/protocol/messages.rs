use serde::{Deserialize, Serialize};

/// Chat role accepted by the upstream chat-completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Inbound chat request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
}

/// Collapse runs of same-role turns into one turn, joining contents with `\n`.
///
/// The upstream API rejects back-to-back turns with the same role.
#[must_use]
pub fn merge_consecutive_turns(turns: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
    let mut merged: Vec<ConversationTurn> = Vec::with_capacity(turns.len());
    for turn in turns {
        match merged.last_mut() {
            Some(last) if last.role == turn.role => {
                last.content.push('\n');
                last.content.push_str(&turn.content);
            }
            _ => merged.push(turn),
        }
    }
    merged
}

/// Build the outbound turn list: system prompt first, then the merged
/// client turns.
///
/// Client-supplied system turns are dropped so the prepended prompt stays the
/// only system turn; merging runs after the drop so the turns around a removed
/// system entry still collapse.
#[must_use]
pub fn build_upstream_turns(
    system_prompt: &str,
    turns: Vec<ConversationTurn>,
) -> Vec<ConversationTurn> {
    let client_turns: Vec<ConversationTurn> = turns
        .into_iter()
        .filter(|turn| {
            let keep = turn.role != Role::System;
            if !keep {
                tracing::debug!("dropping client-supplied system turn");
            }
            keep
        })
        .collect();

    let mut out = Vec::with_capacity(client_turns.len() + 1);
    out.push(ConversationTurn::new(Role::System, system_prompt));
    out.extend(merge_consecutive_turns(client_turns));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn::new(role, content)
    }

    #[test]
    fn test_merge_consecutive_user_turns() {
        let merged = merge_consecutive_turns(vec![
            turn(Role::User, "a"),
            turn(Role::User, "b"),
            turn(Role::Assistant, "c"),
        ]);
        assert_eq!(
            merged,
            vec![turn(Role::User, "a\nb"), turn(Role::Assistant, "c")]
        );
    }

    #[test]
    fn test_merge_empty_input() {
        assert!(merge_consecutive_turns(Vec::new()).is_empty());
    }

    #[test]
    fn test_merge_preserves_alternation() {
        let input = vec![
            turn(Role::User, "q1"),
            turn(Role::Assistant, "a1"),
            turn(Role::User, "q2"),
        ];
        assert_eq!(merge_consecutive_turns(input.clone()), input);
    }

    #[test]
    fn test_merge_long_runs() {
        let merged = merge_consecutive_turns(vec![
            turn(Role::Assistant, "x"),
            turn(Role::User, "1"),
            turn(Role::User, "2"),
            turn(Role::User, "3"),
            turn(Role::Assistant, "y"),
            turn(Role::Assistant, "z"),
        ]);
        assert_eq!(
            merged,
            vec![
                turn(Role::Assistant, "x"),
                turn(Role::User, "1\n2\n3"),
                turn(Role::Assistant, "y\nz"),
            ]
        );
    }

    #[test]
    fn test_build_upstream_turns_prepends_single_system() {
        let turns = build_upstream_turns(
            "sys",
            vec![
                turn(Role::User, "a"),
                turn(Role::System, "ignored"),
                turn(Role::User, "b"),
            ],
        );
        assert_eq!(
            turns,
            vec![turn(Role::System, "sys"), turn(Role::User, "a\nb")]
        );
    }

    #[test]
    fn test_no_adjacent_roles_after_build() {
        let turns = build_upstream_turns(
            "sys",
            vec![
                turn(Role::Assistant, "hi"),
                turn(Role::User, "q"),
                turn(Role::User, "q again"),
                turn(Role::Assistant, "a"),
            ],
        );
        assert!(turns.windows(2).all(|pair| pair[0].role != pair[1].role));
        assert_eq!(turns.iter().filter(|t| t.role == Role::System).count(), 1);
    }

    #[test]
    fn test_chat_request_deserialize() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hello","id":"x"},{"role":"assistant"}]}"#,
        )
        .unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content, "");
    }
}

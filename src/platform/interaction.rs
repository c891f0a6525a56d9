//! Inbound interaction payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::unit::OptionType;

/// One entry of an interaction's option tree.
///
/// `kind` stays the raw discriminator so that an option type this crate
/// does not know about surfaces as an argument error instead of a decode
/// failure of the whole interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Value>,
}

impl OptionEntry {
    /// A scalar entry carrying a plain value.
    pub fn scalar(kind: OptionType, name: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::bare(kind, name)
        }
    }

    /// A subcommand or group entry wrapping nested entries.
    pub fn nested(kind: OptionType, name: impl Into<String>, options: Vec<OptionEntry>) -> Self {
        Self {
            options,
            ..Self::bare(kind, name)
        }
    }

    /// An entry with no value or bindings.
    pub fn bare(kind: OptionType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            value: None,
            options: Vec::new(),
            user: None,
            member: None,
            channel: None,
            role: None,
            attachment: None,
        }
    }

    pub fn option_type(&self) -> Option<OptionType> {
        OptionType::try_from(self.kind).ok()
    }
}

/// Interaction body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionData {
    /// A slash command with its option tree.
    ChatInput {
        #[serde(default)]
        options: Vec<OptionEntry>,
    },
    /// A context-menu command on a resolved user or message.
    ContextMenu { target: Value },
}

/// An inbound command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Platform id of the interaction, used for the reply callback.
    #[serde(default)]
    pub id: String,
    /// Callback token.
    #[serde(default)]
    pub token: String,
    pub target_id: String,
    pub command_name: String,
    pub invoker_id: String,
    pub data: InteractionData,
}

impl Interaction {
    pub fn chat_input(
        target_id: impl Into<String>,
        command_name: impl Into<String>,
        invoker_id: impl Into<String>,
        options: Vec<OptionEntry>,
    ) -> Self {
        Self {
            id: String::new(),
            token: String::new(),
            target_id: target_id.into(),
            command_name: command_name.into(),
            invoker_id: invoker_id.into(),
            data: InteractionData::ChatInput { options },
        }
    }

    pub fn context_menu(
        target_id: impl Into<String>,
        command_name: impl Into<String>,
        invoker_id: impl Into<String>,
        target: Value,
    ) -> Self {
        Self {
            data: InteractionData::ContextMenu { target },
            ..Self::chat_input(target_id, command_name, invoker_id, Vec::new())
        }
    }

    /// The subcommand group and subcommand the invocation selected.
    pub fn selectors(&self) -> (Option<&str>, Option<&str>) {
        let InteractionData::ChatInput { options } = &self.data else {
            return (None, None);
        };
        let Some(first) = options.first() else {
            return (None, None);
        };

        match first.option_type() {
            Some(OptionType::SubcommandGroup) => {
                let sub = first
                    .options
                    .iter()
                    .find(|o| o.option_type() == Some(OptionType::Subcommand))
                    .map(|o| o.name.as_str());
                (Some(first.name.as_str()), sub)
            }
            Some(OptionType::Subcommand) => (None, Some(first.name.as_str())),
            _ => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selectors() {
        let plain = Interaction::chat_input(
            "g",
            "echo",
            "u",
            vec![OptionEntry::scalar(OptionType::String, "text", json!("hi"))],
        );
        assert_eq!(plain.selectors(), (None, None));

        let sub = Interaction::chat_input(
            "g",
            "config",
            "u",
            vec![OptionEntry::nested(OptionType::Subcommand, "show", vec![])],
        );
        assert_eq!(sub.selectors(), (None, Some("show")));

        let grouped = Interaction::chat_input(
            "g",
            "config",
            "u",
            vec![OptionEntry::nested(
                OptionType::SubcommandGroup,
                "role",
                vec![OptionEntry::nested(OptionType::Subcommand, "add", vec![])],
            )],
        );
        assert_eq!(grouped.selectors(), (Some("role"), Some("add")));
    }

    #[test]
    fn test_decode_from_json() {
        let interaction: Interaction = serde_json::from_value(json!({
            "target_id": "g1",
            "command_name": "echo",
            "invoker_id": "42",
            "data": {"kind": "chat_input", "options": [{"name": "text", "type": 3, "value": "hey"}]}
        }))
        .unwrap();

        let InteractionData::ChatInput { options } = &interaction.data else {
            panic!("expected chat input");
        };
        assert_eq!(options[0].option_type(), Some(OptionType::String));
        assert_eq!(options[0].value, Some(json!("hey")));
    }
}

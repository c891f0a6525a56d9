//! Command descriptors as sent to the platform.
//!
//! A descriptor is the declarative half of a command unit: name, type,
//! options tree. Validation mirrors what the platform enforces so that a
//! malformed unit is rejected at load time instead of failing a push.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::platform::TargetContext;

const MAX_NAME_LEN: usize = 32;
const MAX_DESCRIPTION_LEN: usize = 100;
const MAX_OPTIONS: usize = 25;
const MAX_CHOICES: usize = 25;

static CHAT_INPUT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-_\p{L}\p{N}]{1,32}$").expect("valid name pattern"));

/// Application command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommandType {
    ChatInput,
    User,
    Message,
}

impl CommandType {
    fn chat_input() -> Self {
        CommandType::ChatInput
    }

    /// Context-menu commands act on a user or message instead of taking options.
    pub fn is_context_menu(self) -> bool {
        matches!(self, CommandType::User | CommandType::Message)
    }
}

impl TryFrom<u8> for CommandType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandType::ChatInput),
            2 => Ok(CommandType::User),
            3 => Ok(CommandType::Message),
            other => Err(format!("unknown command type {other}")),
        }
    }
}

impl From<CommandType> for u8 {
    fn from(value: CommandType) -> Self {
        match value {
            CommandType::ChatInput => 1,
            CommandType::User => 2,
            CommandType::Message => 3,
        }
    }
}

/// Option type discriminator shared by descriptors and inbound option trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OptionType {
    Subcommand,
    SubcommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

impl OptionType {
    pub fn is_subcommand_like(self) -> bool {
        matches!(self, OptionType::Subcommand | OptionType::SubcommandGroup)
    }
}

impl TryFrom<u8> for OptionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => OptionType::Subcommand,
            2 => OptionType::SubcommandGroup,
            3 => OptionType::String,
            4 => OptionType::Integer,
            5 => OptionType::Boolean,
            6 => OptionType::User,
            7 => OptionType::Channel,
            8 => OptionType::Role,
            9 => OptionType::Mentionable,
            10 => OptionType::Number,
            11 => OptionType::Attachment,
            other => return Err(format!("unknown option type {other}")),
        })
    }
}

impl From<OptionType> for u8 {
    fn from(value: OptionType) -> Self {
        match value {
            OptionType::Subcommand => 1,
            OptionType::SubcommandGroup => 2,
            OptionType::String => 3,
            OptionType::Integer => 4,
            OptionType::Boolean => 5,
            OptionType::User => 6,
            OptionType::Channel => 7,
            OptionType::Role => 8,
            OptionType::Mentionable => 9,
            OptionType::Number => 10,
            OptionType::Attachment => 11,
        }
    }
}

/// A fixed choice for a string, integer or number option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: Value,
}

/// One node of a descriptor's options tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<bool>,
}

/// A command descriptor in the platform's JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    #[serde(rename = "type", default = "CommandType::chat_input")]
    pub kind: CommandType,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dm_permission: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfw: Option<bool>,
}

impl CommandDescriptor {
    /// Chat-input command with a name and description.
    pub fn slash(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: CommandType::ChatInput,
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            default_member_permissions: None,
            dm_permission: None,
            nsfw: None,
        }
    }

    /// Context-menu command on a user or message.
    pub fn context_menu(kind: CommandType, name: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::slash(name, "")
        }
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    /// Serialize to the canonical JSON value pushed to the platform.
    pub fn to_json(&self) -> Value {
        // Plain derive over strings, numbers and vectors cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Check the descriptor against the platform's structural rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.kind.is_context_menu() {
            let len = self.name.chars().count();
            if len == 0 || len > MAX_NAME_LEN {
                return Err(invalid(format!(
                    "context menu name must be 1-{MAX_NAME_LEN} characters"
                )));
            }
            if !self.description.is_empty() {
                return Err(invalid("context menu commands take no description"));
            }
            if !self.options.is_empty() {
                return Err(invalid("context menu commands take no options"));
            }
            return Ok(());
        }

        validate_chat_name(&self.name)?;
        validate_description(&self.name, &self.description)?;
        validate_options(&self.name, &self.options, Level::Command)
    }
}

impl CommandOption {
    pub fn new(kind: OptionType, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            required: false,
            choices: Vec::new(),
            options: Vec::new(),
            min_value: None,
            max_value: None,
            autocomplete: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Command,
    Group,
    Subcommand,
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidDescriptor(reason.into())
}

fn validate_chat_name(name: &str) -> Result<(), ValidationError> {
    if !CHAT_INPUT_NAME.is_match(name) {
        return Err(invalid(format!(
            "'{name}' must be 1-{MAX_NAME_LEN} letters, digits, '-' or '_'"
        )));
    }
    if name.to_lowercase() != name {
        return Err(invalid(format!("'{name}' must be lowercase")));
    }
    Ok(())
}

fn validate_description(name: &str, description: &str) -> Result<(), ValidationError> {
    let len = description.chars().count();
    if len == 0 || len > MAX_DESCRIPTION_LEN {
        return Err(invalid(format!(
            "'{name}' needs a description of 1-{MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_options(
    parent: &str,
    options: &[CommandOption],
    level: Level,
) -> Result<(), ValidationError> {
    if options.len() > MAX_OPTIONS {
        return Err(invalid(format!("'{parent}' has more than {MAX_OPTIONS} options")));
    }

    let mut seen = std::collections::HashSet::new();
    let mut seen_required_after_optional = false;
    let mut saw_optional = false;

    for option in options {
        validate_chat_name(&option.name)?;
        validate_description(&option.name, &option.description)?;

        if !seen.insert(option.name.as_str()) {
            return Err(invalid(format!("'{parent}' repeats option '{}'", option.name)));
        }
        if option.choices.len() > MAX_CHOICES {
            return Err(invalid(format!(
                "'{}' has more than {MAX_CHOICES} choices",
                option.name
            )));
        }

        match (level, option.kind) {
            (Level::Command, OptionType::SubcommandGroup) => {
                validate_options(&option.name, &option.options, Level::Group)?;
            }
            (Level::Command | Level::Group, OptionType::Subcommand) => {
                validate_options(&option.name, &option.options, Level::Subcommand)?;
            }
            (Level::Group, _) => {
                return Err(invalid(format!(
                    "group '{parent}' may only contain subcommands"
                )));
            }
            (Level::Subcommand, kind) if kind.is_subcommand_like() => {
                return Err(invalid(format!(
                    "subcommand '{parent}' cannot nest '{}'",
                    option.name
                )));
            }
            (_, _) => {
                if !option.options.is_empty() {
                    return Err(invalid(format!(
                        "'{}' is not a subcommand and cannot have options",
                        option.name
                    )));
                }
                if option.required {
                    seen_required_after_optional |= saw_optional;
                } else {
                    saw_optional = true;
                }
            }
        }
    }

    if seen_required_after_optional {
        return Err(invalid(format!(
            "'{parent}' lists a required option after an optional one"
        )));
    }

    let mixes_subcommands = options.iter().any(|o| o.kind.is_subcommand_like())
        && options.iter().any(|o| !o.kind.is_subcommand_like());
    if mixes_subcommands {
        return Err(invalid(format!(
            "'{parent}' mixes subcommands with plain options"
        )));
    }

    Ok(())
}

/// Builds a descriptor for one target; `None` keeps the command off that target.
pub type DescriptorFn = Arc<dyn Fn(&TargetContext) -> Option<CommandDescriptor> + Send + Sync>;

/// Where a command's descriptor comes from.
#[derive(Clone)]
pub enum DescriptorSource {
    Static(CommandDescriptor),
    PerTarget(DescriptorFn),
}

impl DescriptorSource {
    /// Evaluate the descriptor for a target.
    pub fn realize(&self, target: &TargetContext) -> Option<CommandDescriptor> {
        match self {
            DescriptorSource::Static(descriptor) => Some(descriptor.clone()),
            DescriptorSource::PerTarget(build) => build(target),
        }
    }

    /// The static descriptor, if this source does not depend on the target.
    pub fn as_static(&self) -> Option<&CommandDescriptor> {
        match self {
            DescriptorSource::Static(descriptor) => Some(descriptor),
            DescriptorSource::PerTarget(_) => None,
        }
    }
}

impl fmt::Debug for DescriptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorSource::Static(descriptor) => {
                f.debug_tuple("Static").field(&descriptor.name).finish()
            }
            DescriptorSource::PerTarget(_) => f.write_str("PerTarget(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_descriptor_json() {
        let descriptor: CommandDescriptor =
            serde_json::from_value(json!({"name": "ping", "description": "Show the ping"}))
                .unwrap();
        assert_eq!(descriptor.kind, CommandType::ChatInput);
        assert_eq!(
            descriptor.to_json(),
            json!({"type": 1, "name": "ping", "description": "Show the ping"})
        );
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_unknown_option_type_rejected_on_parse() {
        let result: Result<CommandDescriptor, _> = serde_json::from_value(json!({
            "name": "bad",
            "description": "bad",
            "options": [{"type": 42, "name": "x", "description": "x"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_name_rules() {
        assert!(CommandDescriptor::slash("Ping", "upper").validate().is_err());
        assert!(CommandDescriptor::slash("has space", "x").validate().is_err());
        assert!(CommandDescriptor::slash("a".repeat(33), "x").validate().is_err());
        assert!(CommandDescriptor::slash("ok-name_1", "x").validate().is_ok());
        assert!(CommandDescriptor::slash("ping", "").validate().is_err());
    }

    #[test]
    fn test_context_menu_rules() {
        let menu = CommandDescriptor::context_menu(CommandType::User, "Show Avatar");
        assert!(menu.validate().is_ok());
        assert_eq!(menu.to_json(), json!({"type": 2, "name": "Show Avatar"}));

        let with_options = menu.with_option(CommandOption::new(OptionType::String, "x", "x"));
        assert!(with_options.validate().is_err());
    }

    #[test]
    fn test_subcommand_structure_rules() {
        let ok = CommandDescriptor::slash("config", "Configure").with_option(
            CommandOption::new(OptionType::SubcommandGroup, "role", "Roles").with_option(
                CommandOption::new(OptionType::Subcommand, "add", "Add a role").with_option(
                    CommandOption::new(OptionType::Role, "role", "The role").required(),
                ),
            ),
        );
        assert!(ok.validate().is_ok());

        let group_with_scalar = CommandDescriptor::slash("config", "Configure").with_option(
            CommandOption::new(OptionType::SubcommandGroup, "role", "Roles")
                .with_option(CommandOption::new(OptionType::String, "x", "x")),
        );
        assert!(group_with_scalar.validate().is_err());

        let mixed = CommandDescriptor::slash("config", "Configure")
            .with_option(CommandOption::new(OptionType::Subcommand, "add", "Add"))
            .with_option(CommandOption::new(OptionType::String, "x", "x"));
        assert!(mixed.validate().is_err());
    }

    #[test]
    fn test_required_after_optional_rejected() {
        let descriptor = CommandDescriptor::slash("echo", "Echo")
            .with_option(CommandOption::new(OptionType::String, "a", "a"))
            .with_option(CommandOption::new(OptionType::String, "b", "b").required());
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_per_target_source() {
        let source = DescriptorSource::PerTarget(Arc::new(|target: &TargetContext| {
            (target.id != "hidden")
                .then(|| CommandDescriptor::slash("hello", format!("Hello {}", target.name)))
        }));
        let shown = TargetContext::new("g1", "Guild One");
        let hidden = TargetContext::new("hidden", "Hidden");

        assert_eq!(
            source.realize(&shown).unwrap().description,
            "Hello Guild One"
        );
        assert!(source.realize(&hidden).is_none());
        assert!(source.as_static().is_none());
    }
}

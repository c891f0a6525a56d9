//! Option tree to argument object.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::platform::OptionEntry;
use crate::unit::OptionType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Unsupported option type {kind} for '{name}'")]
    UnsupportedType { kind: u8, name: String },
}

/// Flatten an interaction's option entries into a nested object.
///
/// Subcommands and groups become sub-objects under their own name; every
/// other entry maps its name to its resolved value.
pub fn resolve(options: &[OptionEntry]) -> Result<Map<String, Value>, ArgumentError> {
    let mut args = Map::new();
    for entry in options {
        let kind = entry
            .option_type()
            .ok_or_else(|| ArgumentError::UnsupportedType {
                kind: entry.kind,
                name: entry.name.clone(),
            })?;

        let value = match kind {
            OptionType::Subcommand | OptionType::SubcommandGroup => {
                Value::Object(resolve(&entry.options)?)
            }
            OptionType::String | OptionType::Integer | OptionType::Boolean | OptionType::Number => {
                scalar(entry)
            }
            OptionType::User => first_of(&[&entry.member, &entry.user], entry),
            OptionType::Channel => first_of(&[&entry.channel], entry),
            OptionType::Role => first_of(&[&entry.role], entry),
            OptionType::Mentionable => {
                first_of(&[&entry.role, &entry.member, &entry.user], entry)
            }
            OptionType::Attachment => first_of(&[&entry.attachment], entry),
        };
        args.insert(entry.name.clone(), value);
    }
    Ok(args)
}

fn scalar(entry: &OptionEntry) -> Value {
    entry.value.clone().unwrap_or(Value::Null)
}

/// The first resolved binding present, else the raw value (usually an id).
fn first_of(bindings: &[&Option<Value>], entry: &OptionEntry) -> Value {
    bindings
        .iter()
        .find_map(|b| (*b).clone())
        .unwrap_or_else(|| scalar(entry))
}

/// Narrow resolved arguments to the selected group and subcommand.
pub fn narrow(args: Map<String, Value>, group: Option<&str>, sub: Option<&str>) -> Value {
    let mut current = Value::Object(args);
    for key in [group, sub].into_iter().flatten() {
        current = match current {
            Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

//! Reduce authored unit shapes to canonical handlers.
//!
//! Shape detection happens once here; nothing downstream looks at the raw
//! document again.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::ModuleExports;
use crate::client::Client;
use crate::error::ValidationError;
use crate::unit::{
    Bindings, CommandDescriptor, CommandExecutor, CommandHandler, CommandUnit, DescriptorSource,
    EventHandler, ExecutorNode, Handler, ListenMode,
};

/// Authoring shapes a command unit's `default` export may take.
enum CommandShape<'a> {
    /// `default` is the executor, `build` the descriptor.
    Canonical { executor: &'a Value },
    /// `[descriptor, executor]`.
    Pair {
        descriptor: &'a Value,
        executor: &'a Value,
    },
    /// `[executor]`, descriptor in `build`.
    Singleton { executor: &'a Value },
    /// `{"unit": factory}`.
    Constructible(&'a str),
    /// `{"instance": name}`.
    Instance(&'a str),
}

impl<'a> CommandShape<'a> {
    fn classify(default: &'a Value) -> Result<Self, ValidationError> {
        match default {
            Value::Array(items) => match items.as_slice() {
                [executor] => Ok(CommandShape::Singleton { executor }),
                [descriptor, executor] => Ok(CommandShape::Pair {
                    descriptor,
                    executor,
                }),
                _ => Err(ValidationError::InvalidStructure),
            },
            Value::Object(map) if map.len() == 1 => {
                match (map.get("unit"), map.get("instance")) {
                    (Some(Value::String(name)), _) => Ok(CommandShape::Constructible(name)),
                    (_, Some(Value::String(name))) => Ok(CommandShape::Instance(name)),
                    _ => Ok(CommandShape::Canonical { executor: default }),
                }
            }
            Value::String(_) | Value::Object(_) => Ok(CommandShape::Canonical { executor: default }),
            _ => Err(ValidationError::ExecutorNotFound),
        }
    }
}

/// Resolves unit documents against the compiled-in [`Bindings`].
pub struct HandlerNormalizer {
    bindings: Bindings,
    client: Client,
}

impl HandlerNormalizer {
    pub fn new(bindings: Bindings, client: Client) -> Self {
        Self { bindings, client }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn normalize_command(&self, exports: &ModuleExports) -> Result<Handler, ValidationError> {
        let default = exports
            .default_export()
            .ok_or(ValidationError::ExecutorNotFound)?;

        let handler = match CommandShape::classify(default)? {
            CommandShape::Canonical { executor } | CommandShape::Singleton { executor } => {
                let build = exports.build().ok_or(ValidationError::BuilderNotFound)?;
                CommandHandler {
                    descriptor: self.descriptor(build)?,
                    executor: self.executor(executor)?,
                }
            }
            CommandShape::Pair {
                descriptor,
                executor,
            } => CommandHandler {
                descriptor: self.descriptor(descriptor)?,
                executor: self.executor(executor)?,
            },
            CommandShape::Constructible(name) => {
                let factory = self
                    .bindings
                    .factory(name)
                    .ok_or_else(|| unknown("unit", name))?;
                from_unit(factory(&self.client))?
            }
            CommandShape::Instance(name) => {
                let unit = self
                    .bindings
                    .instance(name)
                    .ok_or_else(|| unknown("instance", name))?;
                from_unit(unit.clone())?
            }
        };

        Ok(Handler::Command(handler))
    }

    pub fn normalize_event(&self, exports: &ModuleExports) -> Result<Handler, ValidationError> {
        let default = exports
            .default_export()
            .ok_or(ValidationError::ExecutorNotFound)?;

        let (event, listener_name) = match default {
            Value::Array(items) => match items.as_slice() {
                [Value::String(event), Value::String(listener)] => (event.clone(), listener),
                [Value::String(listener)] => (event_name(exports), listener),
                [] | [_, _, _, ..] => return Err(ValidationError::InvalidStructure),
                _ => return Err(ValidationError::ExecutorNotFound),
            },
            Value::String(listener) => (event_name(exports), listener),
            _ => return Err(ValidationError::ExecutorNotFound),
        };

        let listener = self
            .bindings
            .listener(listener_name)
            .ok_or_else(|| unknown("listener", listener_name))?
            .clone();
        let mode = if exports.once() {
            ListenMode::Once
        } else {
            ListenMode::On
        };

        Ok(Handler::Event(EventHandler {
            event,
            mode,
            listener,
        }))
    }

    fn descriptor(&self, value: &Value) -> Result<DescriptorSource, ValidationError> {
        let Value::Object(map) = value else {
            return Err(ValidationError::BuilderNotFound);
        };

        if let Some(builder) = map.get("builder") {
            let name = builder.as_str().ok_or(ValidationError::BuilderNotFound)?;
            let build = self
                .bindings
                .builder(name)
                .ok_or_else(|| unknown("builder", name))?;
            return Ok(DescriptorSource::PerTarget(build.clone()));
        }

        if !map.contains_key("name") {
            return Err(ValidationError::BuilderNotFound);
        }
        let descriptor: CommandDescriptor = serde_json::from_value(value.clone())
            .map_err(|e| ValidationError::InvalidDescriptor(e.to_string()))?;
        descriptor.validate()?;
        Ok(DescriptorSource::Static(descriptor))
    }

    fn executor(&self, value: &Value) -> Result<CommandExecutor, ValidationError> {
        match value {
            Value::String(name) => Ok(CommandExecutor::Function(self.function(name)?)),
            Value::Object(map) if !map.is_empty() => {
                let mut routes = BTreeMap::new();
                for (key, node) in map {
                    let node = match node {
                        Value::String(name) => ExecutorNode::Function(self.function(name)?),
                        Value::Object(subs) if !subs.is_empty() => {
                            ExecutorNode::Map(self.function_map(subs)?)
                        }
                        _ => return Err(ValidationError::ExecutorNotFound),
                    };
                    routes.insert(key.clone(), node);
                }
                Ok(CommandExecutor::Map(routes))
            }
            _ => Err(ValidationError::ExecutorNotFound),
        }
    }

    fn function_map(
        &self,
        subs: &Map<String, Value>,
    ) -> Result<BTreeMap<String, crate::unit::ExecutorFn>, ValidationError> {
        subs.iter()
            .map(|(key, value)| {
                let name = value.as_str().ok_or(ValidationError::ExecutorNotFound)?;
                Ok((key.clone(), self.function(name)?))
            })
            .collect()
    }

    fn function(&self, name: &str) -> Result<crate::unit::ExecutorFn, ValidationError> {
        self.bindings
            .executor(name)
            .cloned()
            .ok_or_else(|| unknown("executor", name))
    }
}

fn from_unit(unit: Arc<dyn CommandUnit>) -> Result<CommandHandler, ValidationError> {
    let descriptor = unit.build();
    if let Some(descriptor) = descriptor.as_static() {
        descriptor.validate()?;
    }
    Ok(CommandHandler {
        descriptor,
        executor: unit.executor(),
    })
}

fn event_name(exports: &ModuleExports) -> String {
    exports
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| exports.stem())
}

fn unknown(kind: &'static str, name: &str) -> ValidationError {
    ValidationError::UnknownBinding {
        kind,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DryRunPlatform, TargetContext};
    use crate::unit::CommandType;
    use serde_json::json;

    struct Avatar;

    impl CommandUnit for Avatar {
        fn build(&self) -> DescriptorSource {
            DescriptorSource::Static(CommandDescriptor::context_menu(CommandType::User, "Avatar"))
        }

        fn executor(self: Arc<Self>) -> CommandExecutor {
            CommandExecutor::Function(crate::unit::executor(|_| async { Ok(()) }))
        }
    }

    fn normalizer() -> HandlerNormalizer {
        let bindings = Bindings::new()
            .with_executor("ping", |_| async { Ok(()) })
            .with_executor("add", |_| async { Ok(()) })
            .with_listener("log", |_| async { Ok(()) })
            .with_builder("hello", |t: &TargetContext| {
                Some(CommandDescriptor::slash("hello", format!("Hi {}", t.name)))
            })
            .with_factory("avatar", |_| Arc::new(Avatar) as Arc<dyn CommandUnit>)
            .with_instance("avatar-shared", Arc::new(Avatar));
        HandlerNormalizer::new(bindings, Client::new(Arc::new(DryRunPlatform::default())))
    }

    fn exports(doc: Value) -> ModuleExports {
        let Value::Object(map) = doc else { panic!("object") };
        ModuleExports::new("/units/message.json", map)
    }

    fn command(doc: Value) -> Result<CommandHandler, ValidationError> {
        match normalizer().normalize_command(&exports(doc))? {
            Handler::Command(c) => Ok(c),
            Handler::Event(_) => panic!("expected command"),
        }
    }

    fn ping() -> Value {
        json!({"name": "ping", "description": "Ping"})
    }

    #[test]
    fn test_all_command_shapes_reduce() {
        assert!(command(json!({"default": "ping", "build": ping()})).is_ok());
        assert!(command(json!({"default": [ping(), "ping"]})).is_ok());
        assert!(command(json!({"default": ["ping"], "build": ping()})).is_ok());
        assert!(command(json!({"default": {"unit": "avatar"}})).is_ok());
        assert!(command(json!({"default": {"instance": "avatar-shared"}})).is_ok());

        let per_target = command(json!({"default": "ping", "build": {"builder": "hello"}})).unwrap();
        assert!(per_target.descriptor.as_static().is_none());
    }

    #[test]
    fn test_nested_executor_map() {
        let handler = command(json!({
            "default": {"show": "ping", "role": {"add": "add"}},
            "build": {
                "name": "config",
                "description": "Configure",
                "options": [
                    {"type": 1, "name": "show", "description": "Show"},
                    {"type": 2, "name": "role", "description": "Roles", "options": [
                        {"type": 1, "name": "add", "description": "Add"}
                    ]}
                ]
            }
        }))
        .unwrap();
        assert!(handler.executor.route(Some("role"), Some("add")).is_some());
        assert!(handler.executor.route(None, Some("show")).is_some());
    }

    #[test]
    fn test_structural_failures() {
        assert_eq!(
            command(json!({"default": [ping(), "ping", "extra"]})).unwrap_err(),
            ValidationError::InvalidStructure
        );
        assert_eq!(
            command(json!({"default": []})).unwrap_err(),
            ValidationError::InvalidStructure
        );
        assert_eq!(
            command(json!({"default": "ping"})).unwrap_err(),
            ValidationError::BuilderNotFound
        );
        assert_eq!(
            command(json!({"default": [42, "ping"]})).unwrap_err(),
            ValidationError::BuilderNotFound
        );
        assert_eq!(
            command(json!({"default": 7, "build": ping()})).unwrap_err(),
            ValidationError::ExecutorNotFound
        );
        assert_eq!(
            command(json!({"default": {"show": 1}, "build": ping()})).unwrap_err(),
            ValidationError::ExecutorNotFound
        );
        assert!(matches!(
            command(json!({"default": "nope", "build": ping()})).unwrap_err(),
            ValidationError::UnknownBinding { kind: "executor", .. }
        ));
        assert!(matches!(
            command(json!({"default": "ping", "build": {"name": "Bad Name", "description": "x"}}))
                .unwrap_err(),
            ValidationError::InvalidDescriptor(_)
        ));
    }

    #[test]
    fn test_event_shapes() {
        let n = normalizer();

        let named = n
            .normalize_event(&exports(json!({"default": ["messageCreate", "log"]})))
            .unwrap();
        let Handler::Event(event) = named else { panic!("event") };
        assert_eq!(event.event, "messageCreate");
        assert_eq!(event.mode, ListenMode::On);

        let from_stem = n
            .normalize_event(&exports(json!({"default": "log", "once": true})))
            .unwrap();
        let Handler::Event(event) = from_stem else { panic!("event") };
        assert_eq!(event.event, "message");
        assert_eq!(event.mode, ListenMode::Once);

        let from_name = n
            .normalize_event(&exports(json!({"default": ["log"], "name": "ready"})))
            .unwrap();
        let Handler::Event(event) = from_name else { panic!("event") };
        assert_eq!(event.event, "ready");

        assert_eq!(
            n.normalize_event(&exports(json!({"default": ["a", "b", "c"]})))
                .unwrap_err(),
            ValidationError::InvalidStructure
        );
        assert!(matches!(
            n.normalize_event(&exports(json!({"default": "missing"})))
                .unwrap_err(),
            ValidationError::UnknownBinding { kind: "listener", .. }
        ));
    }
}

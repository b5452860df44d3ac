//! Tool registry and JSON-schema generation.
//!
//! Tools are declared with an explicit parameter list instead of runtime
//! reflection; the registry renders each declaration into the draft-07
//! function-schema shape the chat-completion API expects and dispatches
//! invocations by name.
//!
//! Most tools are result emitters: pure projections that accept a flat set
//! of named arguments and hand them back as one structured mapping. They
//! exist so the model can commit structured output through the tool
//! interface. A few tools are impure (news fetches) and return a text blob.

pub mod emitters;
pub mod news;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tracing::debug;

pub type JsonMap = Map<String, Value>;
pub type ToolResult = Result<Value, String>;
type ToolHandler = Arc<dyn Fn(JsonMap) -> BoxFuture<'static, ToolResult> + Send + Sync>;

/// Scalar element types allowed inside array parameters. Anything richer
/// degrades to string at schema level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Integer,
    Number,
    Boolean,
    String,
}

impl ScalarKind {
    fn type_name(self) -> &'static str {
        match self {
            ScalarKind::Integer => "integer",
            ScalarKind::Number => "number",
            ScalarKind::Boolean => "boolean",
            ScalarKind::String => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Number,
    Boolean,
    String,
    Array(ScalarKind),
}

impl ParamKind {
    fn schema(self) -> Value {
        match self {
            ParamKind::Integer => json!({"type": "integer"}),
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Array(element) => {
                json!({"type": "array", "items": {"type": element.type_name()}})
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        ToolParam {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        ToolParam {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
    handler: ToolHandler,
}

impl ToolDef {
    /// A synchronous tool; covers every result emitter.
    pub fn sync(
        name: &str,
        description: &str,
        params: Vec<ToolParam>,
        handler: impl Fn(&JsonMap) -> ToolResult + Send + Sync + 'static,
    ) -> Self {
        ToolDef {
            name: name.to_string(),
            description: description.to_string(),
            params,
            handler: Arc::new(move |args| {
                let out = handler(&args);
                async move { out }.boxed()
            }),
        }
    }

    /// An asynchronous tool (network-backed, e.g. news fetches).
    pub fn asynchronous<F>(
        name: &str,
        description: &str,
        params: Vec<ToolParam>,
        handler: impl Fn(JsonMap) -> F + Send + Sync + 'static,
    ) -> Self
    where
        F: std::future::Future<Output = ToolResult> + Send + 'static,
    {
        ToolDef {
            name: name.to_string(),
            description: description.to_string(),
            params,
            handler: Arc::new(move |args| handler(args).boxed()),
        }
    }

    fn schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut entry = param.kind.schema();
            if !param.description.is_empty() {
                entry["description"] = Value::String(param.description.clone());
            }
            properties.insert(param.name.clone(), entry);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Result of one dispatch. `Failure` carries the message the loop feeds back
/// to the model; it only becomes fatal when the failing tool is the agent's
/// terminal emitter.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Success(Value),
    Failure(String),
    Unknown,
}

/// Read-only after construction; shared freely between agents.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDef>) -> Self {
        let mut registry = ToolRegistry::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: ToolDef) {
        self.by_name.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Advertised schemas, in registration order. Deterministic for a given
    /// set of declarations.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDef::schema).collect()
    }

    pub async fn execute(&self, name: &str, args: JsonMap) -> ToolOutcome {
        let Some(&idx) = self.by_name.get(name) else {
            return ToolOutcome::Unknown;
        };
        debug!(tool = name, "executing tool");
        match (self.tools[idx].handler)(args).await {
            Ok(value) => ToolOutcome::Success(value),
            Err(message) => ToolOutcome::Failure(message),
        }
    }
}

/// Parse a raw tool-call argument string into a mapping. Anything that is
/// not a JSON object becomes an empty mapping, so a malformed call degrades
/// into a tool error message rather than aborting the loop.
pub fn parse_arguments(raw: &str) -> JsonMap {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

// Argument accessors shared by the emitter handlers. The model is not
// guaranteed to send every declared field with the declared type, so these
// coerce leniently.

pub(crate) fn arg_str(args: &JsonMap, key: &str) -> String {
    match args.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub(crate) fn arg_f64(args: &JsonMap, key: &str) -> f64 {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn arg_str_list(args: &JsonMap, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn arg_object(args: &JsonMap, key: &str) -> Value {
    match args.get(key) {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool() -> ToolDef {
        ToolDef::sync(
            "emit_sample",
            "Sample emitter",
            vec![
                ToolParam::required("count", ParamKind::Integer, "how many"),
                ToolParam::required("score", ParamKind::Number, "a score"),
                ToolParam::required("enabled", ParamKind::Boolean, "flag"),
                ToolParam::required(
                    "tags",
                    ParamKind::Array(ScalarKind::String),
                    "labels",
                ),
                ToolParam::optional("note", ParamKind::String, "free text"),
            ],
            |args| Ok(json!({"echo": Value::Object(args.clone())})),
        )
    }

    #[test]
    fn schema_matches_typing_rules() {
        let registry = ToolRegistry::new(vec![sample_tool()]);
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        let function = &schemas[0]["function"];
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(function["name"], "emit_sample");
        let props = &function["parameters"]["properties"];
        assert_eq!(props["count"]["type"], "integer");
        assert_eq!(props["score"]["type"], "number");
        assert_eq!(props["enabled"]["type"], "boolean");
        assert_eq!(props["tags"]["type"], "array");
        assert_eq!(props["tags"]["items"]["type"], "string");
        assert_eq!(props["note"]["type"], "string");
        let required: Vec<&str> = function["parameters"]["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["count", "score", "enabled", "tags"]);
    }

    #[test]
    fn schema_generation_is_deterministic() {
        let a = ToolRegistry::new(vec![sample_tool()]).schemas();
        let b = ToolRegistry::new(vec![sample_tool()]).schemas();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = ToolRegistry::new(vec![sample_tool()]);
        assert!(matches!(
            registry.execute("emit_missing", Map::new()).await,
            ToolOutcome::Unknown
        ));
    }

    #[tokio::test]
    async fn handler_failure_is_captured() {
        let failing = ToolDef::sync("emit_fail", "always fails", vec![], |_| {
            Err("boom".to_string())
        });
        let registry = ToolRegistry::new(vec![failing]);
        match registry.execute("emit_fail", Map::new()).await {
            ToolOutcome::Failure(message) => assert_eq!(message, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn argument_parsing_degrades_to_empty() {
        assert!(parse_arguments("not json").is_empty());
        assert!(parse_arguments("[1,2]").is_empty());
        let parsed = parse_arguments("{\"a\": 1}");
        assert_eq!(parsed.get("a"), Some(&json!(1)));
    }

    #[test]
    fn lenient_accessors() {
        let args = parse_arguments(
            "{\"s\": \"x\", \"n\": \"0.5\", \"l\": [\"a\", 2], \"o\": {\"k\": 1}}",
        );
        assert_eq!(arg_str(&args, "s"), "x");
        assert_eq!(arg_f64(&args, "n"), 0.5);
        assert_eq!(arg_str_list(&args, "l"), vec!["a".to_string(), "2".to_string()]);
        assert_eq!(arg_object(&args, "o"), json!({"k": 1}));
        assert_eq!(arg_str(&args, "missing"), "");
        assert_eq!(arg_f64(&args, "missing"), 0.0);
    }
}

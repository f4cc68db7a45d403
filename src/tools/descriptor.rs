use serde::Serialize;

/// Model-facing description of one tool: name, natural-language description,
/// and a JSON Schema for its arguments. Serialized as the `function` half of
/// the wire tool declaration.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

use crate::error::Result;
use crate::llm::client::GeminiClient;
use crate::llm::prompts::{statement_user_prompt, SYSTEM_PROMPT_STATEMENT};
use crate::llm::types::Content;
use crate::schema::StructuredStatement;
use crate::structuring::{StructuringError, StructuringHints, StructuringService};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Map, Value};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// [`StructuringService`] backed by Gemini structured output.
pub struct GeminiStructurer {
    client: GeminiClient,
    model: String,
    schema: Value,
}

impl GeminiStructurer {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client,
            model: model.into(),
            schema: gemini_response_schema()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl StructuringService for GeminiStructurer {
    async fn structure(
        &self,
        text: &str,
        hints: &StructuringHints,
    ) -> std::result::Result<StructuredStatement, StructuringError> {
        let prompt = statement_user_prompt(text, hints);
        let generation = self
            .client
            .generate_content(
                &self.model,
                SYSTEM_PROMPT_STATEMENT,
                vec![Content::user_text(prompt)],
                Some(self.schema.clone()),
            )
            .await
            .map_err(|e| StructuringError::Transient(e.to_string()))?;

        if generation.is_truncated() {
            warn!(
                "{} stopped at its output token limit after {} bytes",
                self.model,
                generation.text.len()
            );
        }
        debug!("{} returned {} bytes", self.model, generation.text.len());

        parse_statement(&generation.text)
    }
}

/// Validate model output against [`StructuredStatement`]. The raw text is
/// kept on both paths so the pipeline can repair short or broken responses.
pub fn parse_statement(text: &str) -> std::result::Result<StructuredStatement, StructuringError> {
    match serde_json::from_str::<StructuredStatement>(text.trim()) {
        Ok(mut statement) => {
            statement.raw_text = Some(text.to_string());
            Ok(statement)
        }
        Err(e) => Err(StructuringError::Schema {
            raw_text: text.to_string(),
            message: e.to_string(),
        }),
    }
}

/// JSON schema for [`StructuredStatement`] in the OpenAPI subset Gemini
/// accepts: no `$ref`, `$schema` or `definitions`, and `nullable` instead of
/// `["T", "null"]` type unions.
pub fn gemini_response_schema() -> serde_json::Result<Value> {
    let root = serde_json::to_value(schemars::schema_for!(StructuredStatement))?;
    let definitions = root
        .get("definitions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(to_gemini_schema(&root, &definitions))
}

fn to_gemini_schema(node: &Value, definitions: &Map<String, Value>) -> Value {
    let map = match node {
        Value::Object(map) => map,
        // untyped `serde_json::Value` fields (amount, confidence)
        _ => return json!({ "type": "number", "nullable": true }),
    };

    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
        let name = reference.trim_start_matches("#/definitions/");
        return match definitions.get(name) {
            Some(definition) => to_gemini_schema(definition, definitions),
            None => json!({ "type": "object" }),
        };
    }

    let mut out = Map::new();
    for (key, value) in map {
        match key.as_str() {
            "$schema" | "definitions" | "title" | "format" | "minimum" | "default"
            | "additionalProperties" => {}
            "type" => match value {
                Value::Array(types) => {
                    let concrete: Vec<&Value> =
                        types.iter().filter(|t| t.as_str() != Some("null")).collect();
                    if let Some(t) = concrete.first() {
                        out.insert("type".to_string(), (*t).clone());
                    }
                    if concrete.len() < types.len() {
                        out.insert("nullable".to_string(), Value::Bool(true));
                    }
                }
                other => {
                    out.insert("type".to_string(), other.clone());
                }
            },
            "properties" => {
                let properties = value
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, schema)| (name.clone(), to_gemini_schema(schema, definitions)))
                            .collect::<Map<String, Value>>()
                    })
                    .unwrap_or_default();
                out.insert("properties".to_string(), Value::Object(properties));
            }
            "items" => {
                out.insert("items".to_string(), to_gemini_schema(value, definitions));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    if !out.contains_key("type") {
        out.insert("type".to_string(), json!("number"));
        out.insert("nullable".to_string(), Value::Bool(true));
    }
    Value::Object(out)
}

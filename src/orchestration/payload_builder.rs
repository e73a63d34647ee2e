//! # Payload Builder
//!
//! Turns a step's job template into a concrete request body by rendering
//! `{{name}}` placeholders inside JSON strings with minijinja.
//!
//! A string that is exactly one placeholder takes the typed value (a seed
//! stays a number, `variables` stays an object). A placeholder embedded in a
//! longer string is rendered as text. The render context only carries the
//! needs the step declared, so unknown names, undeclared needs and missing
//! run variables all surface as `Validation` errors.

use crate::constants::placeholders;
use crate::error::{GentreeError, Result};
use crate::models::{Candidate, PipelineStep, Run};
use chrono::Utc;
use minijinja::{Environment, UndefinedBehavior};
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Per-submission values that keep output paths unique
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceValues {
    pub timestamp: String,
    pub seed: u64,
    pub nonce: String,
}

impl NonceValues {
    pub fn generate() -> Self {
        Self {
            timestamp: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            seed: u64::from(rand::thread_rng().gen::<u32>()),
            nonce: Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Everything a placeholder may draw from
pub struct PayloadContext<'a> {
    pub run: &'a Run,
    pub step: &'a PipelineStep,
    pub parent: Option<&'a Candidate>,
    pub nonce: &'a NonceValues,
}

/// One environment per payload; templates borrow the step's template strings
fn template_env<'t>() -> Environment<'t> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

impl PayloadContext<'_> {
    /// Render context: fixed values, `var.<key>`, plus each declared need that can be satisfied
    fn template_values(&self) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert(placeholders::RUN_NAME.into(), Value::String(self.run.synthesized_name()));
        values.insert(placeholders::RUN_ID.into(), Value::from(self.run.id));
        values.insert(placeholders::STEP_POSITION.into(), Value::from(self.step.position));
        values.insert(placeholders::TIMESTAMP.into(), Value::String(self.nonce.timestamp.clone()));
        values.insert(placeholders::SEED.into(), Value::from(self.nonce.seed));
        values.insert(placeholders::NONCE.into(), Value::String(self.nonce.nonce.clone()));
        values.insert(placeholders::VARIABLE_NAMESPACE.into(), Value::Object(self.run.variable_map()));

        if self.step.needs_prompt {
            if let Some(prompt) = self.run.variable(placeholders::PROMPT) {
                values.insert(placeholders::PROMPT.into(), prompt.clone());
            }
        }
        if self.step.needs_parent_image {
            if let Some(parent) = self.parent {
                values.insert(placeholders::PARENT_IMAGE.into(), Value::String(parent.artifact_path.clone()));
            }
        }
        if self.step.needs_variables {
            values.insert(placeholders::VARIABLES.into(), Value::Object(self.run.variable_map()));
        }
        values
    }

    /// Explain why a referenced name is absent from the render context
    fn missing_name(&self, name: &str) -> GentreeError {
        let step = &self.step.name;
        match name {
            placeholders::PROMPT if !self.step.needs_prompt => {
                GentreeError::validation(format!("step '{step}' uses '{{{{prompt}}}}' without declaring needs_prompt"))
            }
            placeholders::PROMPT => {
                GentreeError::validation(format!("run {} has no 'prompt' variable", self.run.id))
            }
            placeholders::PARENT_IMAGE if !self.step.needs_parent_image => GentreeError::validation(format!(
                "step '{step}' uses '{{{{parent_image}}}}' without declaring needs_parent_image"
            )),
            placeholders::PARENT_IMAGE => {
                GentreeError::validation(format!("step '{step}' needs a parent image but no parent was given"))
            }
            placeholders::VARIABLES => GentreeError::validation(format!(
                "step '{step}' uses '{{{{variables}}}}' without declaring needs_variables"
            )),
            other => GentreeError::validation(format!("step '{step}' uses unknown placeholder '{{{{{other}}}}}'")),
        }
    }

    fn check_names(&self, referenced: HashSet<String>, values: &Map<String, Value>) -> Result<()> {
        let mut referenced: Vec<String> = referenced.into_iter().collect();
        referenced.sort();
        match referenced.iter().find(|name| !values.contains_key(name.as_str())) {
            Some(name) => Err(self.missing_name(name)),
            None => Ok(()),
        }
    }

    fn render_error(&self, source: &str, err: minijinja::Error) -> GentreeError {
        GentreeError::validation(format!("step '{}' cannot render '{source}': {err}", self.step.name))
    }
}

/// Render every placeholder in the step's template
pub fn build_payload(ctx: &PayloadContext<'_>) -> Result<Value> {
    let env = template_env();
    let values = ctx.template_values();
    substitute(&ctx.step.job_template.0, &env, ctx, &values)
}

fn substitute<'t>(
    value: &'t Value,
    env: &Environment<'t>,
    ctx: &PayloadContext<'_>,
    values: &Map<String, Value>,
) -> Result<Value> {
    match value {
        Value::String(s) => substitute_string(s, env, ctx, values),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, env, ctx, values))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                out.insert(key.clone(), substitute(field, env, ctx, values)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string<'t>(
    s: &'t str,
    env: &Environment<'t>,
    ctx: &PayloadContext<'_>,
    values: &Map<String, Value>,
) -> Result<Value> {
    if !s.contains("{{") {
        return Ok(Value::String(s.to_string()));
    }

    if let Some(expression) = whole_placeholder(s) {
        let expr = env
            .compile_expression(expression)
            .map_err(|e| ctx.render_error(s, e))?;
        ctx.check_names(expr.undeclared_variables(false), values)?;
        let rendered = expr.eval(values).map_err(|e| ctx.render_error(s, e))?;
        if rendered.is_undefined() {
            return Err(GentreeError::validation(format!(
                "step '{}' references '{s}' which run {} does not define",
                ctx.step.name, ctx.run.id
            )));
        }
        return Ok(serde_json::to_value(&rendered)?);
    }

    let template = env.template_from_str(s).map_err(|e| ctx.render_error(s, e))?;
    ctx.check_names(template.undeclared_variables(false), values)?;
    let text = template.render(values).map_err(|e| ctx.render_error(s, e))?;
    Ok(Value::String(text))
}

/// The expression inside a string that is exactly one `{{ ... }}` block
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    (!inner.contains("{{") && !inner.contains("}}")).then(|| inner.trim())
}

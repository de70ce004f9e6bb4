use std::collections::HashMap;

use minijinja::{Environment, Value as MJValue};
use serde_json::Value;

use wagf_core::{Result, WagfError};

/// Minijinja wrapper for agent prompt templates and the reflection batch
/// prompt. Auto-escaping is off; everything rendered here is plain text.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
        Self { env }
    }

    pub fn render(&self, template: &str, context: &HashMap<String, Value>) -> Result<String> {
        let mut ctx: HashMap<&str, MJValue> = HashMap::new();
        for (key, value) in context {
            ctx.insert(key.as_str(), json_to_minijinja(value));
        }

        let tmpl = self
            .env
            .template_from_str(template)
            .map_err(|e| WagfError::Template(e.to_string()))?;

        tmpl.render(&ctx)
            .map_err(|e| WagfError::Template(e.to_string()))
    }
}

fn json_to_minijinja(value: &Value) -> MJValue {
    match value {
        Value::Null => MJValue::from(()),
        Value::Bool(b) => MJValue::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MJValue::from(i)
            } else if let Some(u) = n.as_u64() {
                MJValue::from(u)
            } else if let Some(f) = n.as_f64() {
                MJValue::from(f)
            } else {
                MJValue::from(())
            }
        }
        Value::String(s) => MJValue::from(s.as_str()),
        Value::Array(arr) => {
            let items: Vec<MJValue> = arr.iter().map(json_to_minijinja).collect();
            MJValue::from(items)
        }
        Value::Object(obj) => {
            let map: std::collections::BTreeMap<String, MJValue> = obj
                .iter()
                .map(|(k, v)| (k.clone(), json_to_minijinja(v)))
                .collect();
            MJValue::from_iter(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_placeholders() {
        let renderer = TemplateRenderer::new();
        let mut context = HashMap::new();
        context.insert("agent".to_string(), json!({"id": "hh_3", "funds": 5000}));
        context.insert("year".to_string(), json!(4));

        let template = "You are household {{ agent.id }} in year {{ year }} with ${{ agent.funds }}.";
        let result = renderer.render(template, &context).unwrap();
        assert_eq!(result, "You are household hh_3 in year 4 with $5000.");
    }

    #[test]
    fn test_conditional_block() {
        let renderer = TemplateRenderer::new();
        let mut context = HashMap::new();
        context.insert("agent".to_string(), json!({"elevated": true}));

        let template =
            "{% if agent.elevated %}Your house is elevated.{% else %}Your house is at grade.{% endif %}";
        let result = renderer.render(template, &context).unwrap();
        assert_eq!(result, "Your house is elevated.");
    }

    #[test]
    fn test_loop_over_items() {
        let renderer = TemplateRenderer::new();
        let mut context = HashMap::new();
        context.insert("events".to_string(), json!(["flood", "drought"]));

        let template = "{% for e in events %}[{{ e }}]{% endfor %}";
        let result = renderer.render(template, &context).unwrap();
        assert_eq!(result, "[flood][drought]");
    }

    #[test]
    fn test_bad_template_is_config_error() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("{% broken", &HashMap::new());
        assert!(matches!(result, Err(WagfError::Template(_))));
    }
}

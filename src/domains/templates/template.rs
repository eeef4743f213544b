//! Compiled endpoint templates.
//!
//! A [`Template`] pairs the externally authored [`TemplateDefinition`] with
//! its compiled [`Prototype`]. Only the definition takes part in equality, so
//! re-ingesting an unchanged document never counts as a change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use super::error::TemplateError;
use super::prototype::Prototype;

/// Matches the compact `{{.Name}}` placeholder form.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\.([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("placeholder pattern is valid")
});

/// The raw, externally authored description of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Name of the handler that supplies calculated variables.
    #[serde(rename = "handler-name", default, skip_serializing_if = "String::is_empty")]
    pub handler: String,

    /// Variables the caller must compute and supply at execution time.
    #[serde(
        rename = "calculated-variables",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub calculated_variables: Vec<String>,

    /// Session variable name -> placeholder name.
    #[serde(
        rename = "session-variables",
        alias = "mapped-variables",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub session_variables: BTreeMap<String, String>,

    /// The template source.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prototype: String,
}

/// A compiled template for one endpoint.
#[derive(Debug, Clone)]
pub struct Template {
    endpoint: String,
    definition: TemplateDefinition,
    compiled: Prototype,
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
    }
}

impl Template {
    /// Compile `definition` for `endpoint`.
    pub fn compile(
        endpoint: impl Into<String>,
        definition: TemplateDefinition,
    ) -> Result<Self, TemplateError> {
        let endpoint = endpoint.into();
        let compiled = Prototype::compile(endpoint.clone(), &definition.prototype)?;
        Ok(Self {
            endpoint,
            definition,
            compiled,
        })
    }

    /// Decode an untyped field mapping (as found in a document snapshot) and
    /// compile it.
    pub fn from_map(
        endpoint: impl Into<String>,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, TemplateError> {
        let endpoint = endpoint.into();
        let definition: TemplateDefinition =
            serde_json::from_value(serde_json::Value::Object(fields.clone()))
                .map_err(|e| TemplateError::decode(endpoint.clone(), e))?;
        Self::compile(endpoint, definition)
    }

    /// The endpoint key this template was compiled for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Rebind the template to `endpoint`, keeping the compiled prototype.
    pub(crate) fn with_endpoint(mut self, endpoint: &str) -> Self {
        if self.endpoint != endpoint {
            self.endpoint = endpoint.to_string();
            self.compiled.rename(endpoint);
        }
        self
    }

    /// The source definition.
    pub fn definition(&self) -> &TemplateDefinition {
        &self.definition
    }

    pub fn handler(&self) -> &str {
        &self.definition.handler
    }

    pub fn calculated_variables(&self) -> &[String] {
        &self.definition.calculated_variables
    }

    pub fn session_variables(&self) -> &BTreeMap<String, String> {
        &self.definition.session_variables
    }

    pub fn prototype(&self) -> &str {
        &self.definition.prototype
    }

    /// Structural equality over the definition fields.
    pub fn equals(&self, other: &Template) -> bool {
        self == other
    }

    /// Placeholder names referenced as `{{.Name}}`, in order of first use.
    pub fn infer_args(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        PLACEHOLDER
            .captures_iter(&self.definition.prototype)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    /// Placeholders that must be present in the variable mapping.
    ///
    /// Placeholders fed only by session variables are optional and render as
    /// empty text when the session does not carry them. Names listed in
    /// `calculated-variables` stay required even when a session variable also
    /// targets them.
    pub fn required_args(&self) -> Vec<String> {
        let optional: HashSet<&str> = self
            .definition
            .session_variables
            .values()
            .map(String::as_str)
            .filter(|name| !self.definition.calculated_variables.iter().any(|c| c == name))
            .collect();

        self.infer_args()
            .into_iter()
            .filter(|arg| !optional.contains(arg.as_str()))
            .collect()
    }

    /// Seed a variable mapping from request session parameters.
    ///
    /// Session variables absent from `parameters` are skipped.
    pub fn map_session_variables(
        &self,
        parameters: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        self.definition
            .session_variables
            .iter()
            .filter_map(|(source, placeholder)| {
                parameters
                    .get(source)
                    .map(|value| (placeholder.clone(), value.clone()))
            })
            .collect()
    }

    /// Validate argument completeness and render.
    pub fn execute(&self, variables: &HashMap<String, String>) -> Result<String, TemplateError> {
        if let Some(missing) = self
            .required_args()
            .into_iter()
            .find(|arg| !variables.contains_key(arg))
        {
            return Err(TemplateError::missing_argument(&self.endpoint, missing));
        }

        Ok(self.compiled.render(variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeting() -> TemplateDefinition {
        TemplateDefinition {
            handler: "universal-answer".to_string(),
            calculated_variables: vec!["Answer".to_string()],
            session_variables: BTreeMap::from([("user_name".to_string(), "Name".to_string())]),
            prototype: "Hello {{.Name}}, the answer is {{.Answer}}".to_string(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_end_to_end_render() {
        let template = Template::compile("/greeting", greeting()).unwrap();

        let mut vars = template.map_session_variables(&params(&[("user_name", "Ada")]));
        vars.insert("Answer".to_string(), "42".to_string());

        assert_eq!(template.execute(&vars).unwrap(), "Hello Ada, the answer is 42");
    }

    #[test]
    fn test_end_to_end_missing_calculated_argument() {
        let template = Template::compile("/greeting", greeting()).unwrap();

        let vars = template.map_session_variables(&params(&[]));
        match template.execute(&vars) {
            Err(TemplateError::MissingArgument { endpoint, argument }) => {
                assert_eq!(endpoint, "/greeting");
                assert_eq!(argument, "Answer");
            }
            other => panic!("expected missing argument, got {:?}", other),
        }
    }

    #[test]
    fn test_session_fed_placeholder_renders_empty() {
        let template = Template::compile("/greeting", greeting()).unwrap();
        let vars = params(&[("Answer", "42")]);
        assert_eq!(template.execute(&vars).unwrap(), "Hello , the answer is 42");
    }

    #[test]
    fn test_extra_variables_ignored() {
        let template = Template::compile("/greeting", greeting()).unwrap();
        let vars = params(&[("Name", "Ada"), ("Answer", "42"), ("Unused", "x")]);
        assert_eq!(template.execute(&vars).unwrap(), "Hello Ada, the answer is 42");
    }

    #[test]
    fn test_uncalculated_placeholder_is_required() {
        let definition = TemplateDefinition {
            prototype: "{{.First}} and {{.Second}}".to_string(),
            ..Default::default()
        };
        let template = Template::compile("/pair", definition).unwrap();

        let err = template.execute(&params(&[("Second", "2")])).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("First"));
        assert!(err.to_string().contains("/pair"));
    }

    #[test]
    fn test_infer_args() {
        let definition = TemplateDefinition {
            prototype: "{{.A}} {{ .Spaced }} {{.B}} {{.A}} {{if .C}}c{{end}} {{.snake_case1}}"
                .to_string(),
            ..Default::default()
        };
        let template = Template::compile("/args", definition).unwrap();
        assert_eq!(template.infer_args(), vec!["A", "B", "snake_case1"]);
    }

    #[test]
    fn test_required_args_exclude_session_targets() {
        let template = Template::compile("/greeting", greeting()).unwrap();
        assert_eq!(template.infer_args(), vec!["Name", "Answer"]);
        assert_eq!(template.required_args(), vec!["Answer"]);
    }

    #[test]
    fn test_calculated_name_stays_required_when_session_fed() {
        let definition = TemplateDefinition {
            calculated_variables: vec!["Answer".to_string()],
            session_variables: BTreeMap::from([("answer".to_string(), "Answer".to_string())]),
            prototype: "The answer is {{.Answer}}".to_string(),
            ..Default::default()
        };
        let template = Template::compile("/both", definition).unwrap();
        assert_eq!(template.required_args(), vec!["Answer"]);

        let vars = template.map_session_variables(&params(&[]));
        match template.execute(&vars) {
            Err(TemplateError::MissingArgument { argument, .. }) => assert_eq!(argument, "Answer"),
            other => panic!("expected missing argument, got {:?}", other),
        }

        let vars = template.map_session_variables(&params(&[("answer", "42")]));
        assert_eq!(template.execute(&vars).unwrap(), "The answer is 42");
    }

    #[test]
    fn test_map_session_variables_partial() {
        let definition = TemplateDefinition {
            session_variables: BTreeMap::from([
                ("first".to_string(), "First".to_string()),
                ("last".to_string(), "Last".to_string()),
            ]),
            prototype: "{{.First}} {{.Last}}".to_string(),
            ..Default::default()
        };
        let template = Template::compile("/names", definition).unwrap();

        let mapped = template.map_session_variables(&params(&[("first", "Ada"), ("other", "x")]));
        assert_eq!(mapped, params(&[("First", "Ada")]));
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Template::compile("/a", greeting()).unwrap();
        let b = Template::compile("/b", greeting()).unwrap();
        assert!(a.equals(&b));

        let mut changed = greeting();
        changed.prototype.push('!');
        let c = Template::compile("/a", changed).unwrap();
        assert!(!a.equals(&c));

        let mut rehandled = greeting();
        rehandled.handler = "clock".to_string();
        assert_ne!(a, Template::compile("/a", rehandled).unwrap());
    }

    #[test]
    fn test_from_map() {
        let fields = json!({
            "handler-name": "universal-answer",
            "calculated-variables": ["Answer"],
            "session-variables": { "user_name": "Name" },
            "prototype": "Hello {{.Name}}, the answer is {{.Answer}}"
        });
        let template = Template::from_map("/greeting", fields.as_object().unwrap()).unwrap();

        assert_eq!(template.endpoint(), "/greeting");
        assert_eq!(template.definition(), &greeting());
    }

    #[test]
    fn test_from_map_accepts_mapped_variables_alias() {
        let fields = json!({
            "mapped-variables": { "user_name": "Name" },
            "prototype": "{{.Name}}"
        });
        let template = Template::from_map("/alias", fields.as_object().unwrap()).unwrap();
        assert_eq!(template.session_variables().get("user_name").unwrap(), "Name");
    }

    #[test]
    fn test_from_map_decode_error() {
        let fields = json!({ "calculated-variables": "not-a-list" });
        let err = Template::from_map("/bad", fields.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, TemplateError::Decode { ref name, .. } if name == "/bad"));
    }

    #[test]
    fn test_from_map_compile_error() {
        let fields = json!({ "prototype": "Hello {{.Name" });
        let err = Template::from_map("/bad", fields.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, TemplateError::Compile { .. }));
    }

    #[test]
    fn test_definition_serializes_with_wire_names() {
        let value = serde_json::to_value(greeting()).unwrap();
        assert_eq!(value["handler-name"], "universal-answer");
        assert_eq!(value["calculated-variables"], json!(["Answer"]));
        assert_eq!(value["session-variables"]["user_name"], "Name");
    }
}

//! Caller-supplied snippets.
//!
//! A snippet is JSON in the Earth Engine expression language, never code. It
//! is either a namespace of named bindings
//!
//! ```json
//! { "image": { "functionInvocationValue": { "functionName": "Collection.first", "arguments": {
//!     "collection": { "valueReference": "s2" } } } },
//!   "s2": { "functionInvocationValue": { "functionName": "ImageCollection.load", "arguments": {
//!     "id": { "constantValue": "COPERNICUS/S2_SR_HARMONIZED" } } } } }
//! ```
//!
//! or a serialized expression (`{"result": "0", "values": {...}}`) as written
//! by the Earth Engine client libraries. Evaluation resolves the `result`
//! binding, then `image`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::error::ExportError;
use crate::expression::{Expression, Image, ValueNode};

/// Binding names looked up after evaluation, in order.
pub const RESULT_NAMES: [&str; 2] = ["result", "image"];

/// Placeholder replaced by the snippet in templates.
pub const TEMPLATE_PLACEHOLDER: &str = "{GENERATED_CODE}";

#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    bindings: BTreeMap<String, ValueNode>,
    /// Set when the snippet was a serialized expression.
    entry: Option<String>,
}

impl Snippet {
    pub fn parse(text: &str) -> Result<Self, ExportError> {
        let text = strip_fences(text);
        if text.trim().is_empty() {
            return Err(ExportError::Execution("empty snippet".to_string()));
        }

        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| ExportError::Execution(format!("invalid snippet JSON: {}", e)))?;

        if is_serialized_expression(&doc) {
            let expr: Expression = serde_json::from_value(doc)
                .map_err(|e| ExportError::Execution(format!("invalid expression: {}", e)))?;
            return Ok(Self {
                bindings: expr.values,
                entry: Some(expr.result),
            });
        }

        if !doc.is_object() {
            return Err(ExportError::Execution(
                "snippet must be a JSON object of bindings".to_string(),
            ));
        }
        let bindings: BTreeMap<String, ValueNode> = serde_json::from_value(doc)
            .map_err(|e| ExportError::Execution(format!("invalid binding: {}", e)))?;
        Ok(Self {
            bindings,
            entry: None,
        })
    }

    /// Substitutes `code` into `template` and parses the result.
    pub fn from_template(template: &str, code: &str) -> Result<Self, ExportError> {
        if !template.contains(TEMPLATE_PLACEHOLDER) {
            return Err(ExportError::Execution(format!(
                "template has no {} placeholder",
                TEMPLATE_PLACEHOLDER
            )));
        }
        Self::parse(&template.replace(TEMPLATE_PLACEHOLDER, strip_fences(code).trim()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Resolves the result binding into an image handle.
    ///
    /// Every reference reachable from the result must be bound and acyclic;
    /// bindings the result does not use are dropped.
    pub fn evaluate(self) -> Result<Image, ExportError> {
        let name = match &self.entry {
            Some(entry) => entry.clone(),
            None => RESULT_NAMES
                .iter()
                .find(|n| self.bindings.contains_key(**n))
                .map(|n| n.to_string())
                .ok_or(ExportError::MissingResult)?,
        };

        let keep: BTreeSet<String> = reachable(&name, &self.bindings)?
            .into_iter()
            .map(str::to_string)
            .collect();

        let values: BTreeMap<String, ValueNode> = self
            .bindings
            .into_iter()
            .filter(|(k, _)| keep.contains(k))
            .collect();
        debug!(result = %name, values = values.len(), "snippet evaluated");

        Ok(Image::new(Expression {
            result: name,
            values,
        }))
    }
}

fn is_serialized_expression(doc: &Value) -> bool {
    doc.as_object().is_some_and(|o| {
        o.len() == 2
            && o.get("result").is_some_and(Value::is_string)
            && o.get("values").is_some_and(Value::is_object)
    })
}

/// Walks every binding reachable from `root` and returns their ids.
///
/// Iterative so that long reference chains cannot exhaust the stack.
fn reachable<'a>(
    root: &'a str,
    bindings: &'a BTreeMap<String, ValueNode>,
) -> Result<BTreeSet<&'a str>, ExportError> {
    let lookup = |id: &'a str, parent: Option<&str>| {
        bindings.get(id).ok_or_else(|| match parent {
            Some(parent) => {
                ExportError::Execution(format!("`{}` (used by `{}`) is not defined", id, parent))
            }
            None => ExportError::Execution(format!("`{}` is not defined", id)),
        })
    };

    let mut done: BTreeSet<&'a str> = BTreeSet::new();
    let mut on_path = BTreeSet::from([root]);
    // One frame per binding on the current path, with the references left to visit.
    let mut stack = vec![(root, lookup(root, None)?.references().into_iter())];

    while let Some((id, pending)) = stack.last_mut() {
        let parent = *id;
        match pending.next() {
            Some(next) if done.contains(next) => {}
            Some(next) if on_path.contains(next) => {
                let path: Vec<&str> = stack.iter().map(|(id, _)| *id).collect();
                return Err(ExportError::Execution(format!(
                    "cyclic reference: {} -> {}",
                    path.join(" -> "),
                    next
                )));
            }
            Some(next) => {
                let node = lookup(next, Some(parent))?;
                on_path.insert(next);
                stack.push((next, node.references().into_iter()));
            }
            None => {
                stack.pop();
                on_path.remove(parent);
                done.insert(parent);
            }
        }
    }
    Ok(done)
}

/// Drops Markdown code-fence lines, which generated snippets often carry.
fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const S2: &str = r#"{
        "s2": { "functionInvocationValue": { "functionName": "ImageCollection.load",
                "arguments": { "id": { "constantValue": "COPERNICUS/S2" } } } },
        "image": { "functionInvocationValue": { "functionName": "Collection.first",
                "arguments": { "collection": { "valueReference": "s2" } } } },
        "unused": { "constantValue": 42 }
    }"#;

    #[test]
    fn binds_image_and_prunes_unused() {
        let image = Snippet::parse(S2).unwrap().evaluate().unwrap();
        let expr = image.expression();
        assert_eq!(expr.result, "image");
        let names: Vec<&str> = expr.values.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["image", "s2"]);
    }

    #[test]
    fn result_wins_over_image() {
        let text = r#"{ "image": { "constantValue": 1 }, "result": { "valueReference": "image" } }"#;
        let image = Snippet::parse(text).unwrap().evaluate().unwrap();
        assert_eq!(image.expression().result, "result");
        assert_eq!(image.expression().values.len(), 2);
    }

    #[test]
    fn serialized_expression_uses_its_result() {
        let text = r#"{ "result": "0", "values": {
            "0": { "functionInvocationValue": { "functionName": "Image.load",
                   "arguments": { "id": { "constantValue": "USGS/SRTMGL1_003" } } } } } }"#;
        let snippet = Snippet::parse(text).unwrap();
        assert_eq!(snippet.names().collect::<Vec<_>>(), vec!["0"]);
        let image = snippet.evaluate().unwrap();
        assert_eq!(image.expression().result, "0");
    }

    #[test]
    fn missing_binding_is_reported() {
        let err = Snippet::parse(r#"{ "aoi": { "constantValue": 1 } }"#)
            .unwrap()
            .evaluate()
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingResult));
    }

    #[test]
    fn undefined_reference_names_the_parent() {
        let err = Snippet::parse(r#"{ "image": { "valueReference": "nope" } }"#)
            .unwrap()
            .evaluate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error executing snippet: `nope` (used by `image`) is not defined"
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let text = r#"{ "image": { "valueReference": "a" },
                        "a": { "arrayValue": { "values": [ { "valueReference": "image" } ] } } }"#;
        let err = Snippet::parse(text).unwrap().evaluate().unwrap_err();
        assert!(err.to_string().contains("cyclic reference: image -> a -> image"));
    }

    #[test]
    fn long_reference_chain_is_walked_without_recursion() {
        const LINKS: usize = 200_000;
        let mut text = String::from(r#"{ "image": { "valueReference": "v0" }"#);
        for i in 0..LINKS {
            text.push_str(&format!(r#", "v{}": {{ "valueReference": "v{}" }}"#, i, i + 1));
        }
        text.push_str(&format!(r#", "v{}": {{ "constantValue": 1 }} }}"#, LINKS));

        let image = Snippet::parse(&text).unwrap().evaluate().unwrap();
        assert_eq!(image.expression().values.len(), LINKS + 2);
    }

    #[test]
    fn long_cycle_is_rejected() {
        let mut text = String::from(r#"{ "image": { "valueReference": "v0" }"#);
        for i in 0..1_000 {
            text.push_str(&format!(r#", "v{}": {{ "valueReference": "v{}" }}"#, i, i + 1));
        }
        text.push_str(r#", "v1000": { "valueReference": "v0" } }"#);

        let err = Snippet::parse(&text).unwrap().evaluate().unwrap_err();
        assert!(err.to_string().ends_with("v999 -> v1000 -> v0"), "{err}");
    }

    #[test]
    fn shared_binding_is_not_a_cycle() {
        let text = r#"{ "image": { "arrayValue": { "values": [
                            { "valueReference": "a" }, { "valueReference": "a" } ] } },
                        "a": { "constantValue": 1 } }"#;
        let image = Snippet::parse(text).unwrap().evaluate().unwrap();
        assert_eq!(image.expression().values.len(), 2);
    }

    #[rstest]
    #[case("")]
    #[case("   \n")]
    #[case("image = ee.Image(1)")]
    #[case("[1, 2]")]
    #[case(r#"{ "image": { "pythonValue": "x" } }"#)]
    #[case(r#"{ "image": { "constantValue": 1, "valueReference": "x" } }"#)]
    fn malformed_snippets_are_execution_errors(#[case] text: &str) {
        assert!(matches!(Snippet::parse(text), Err(ExportError::Execution(_))));
    }

    #[test]
    fn code_fences_are_stripped() {
        let fenced = "```json\n{ \"image\": { \"constantValue\": 1 } }\n```";
        let image = Snippet::parse(fenced).unwrap().evaluate().unwrap();
        assert_eq!(image.expression().result, "image");
    }

    #[test]
    fn template_substitution() {
        let template = r#"{ "aoi": { "constantValue": [0, 0] }, {GENERATED_CODE} }"#;
        let code = r#""image": { "valueReference": "aoi" }"#;
        let image = Snippet::from_template(template, code)
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(image.expression().values.len(), 2);
    }

    #[test]
    fn template_without_placeholder_fails() {
        let err = Snippet::from_template("{}", "{}").unwrap_err();
        assert!(err.to_string().contains("{GENERATED_CODE}"));
    }
}

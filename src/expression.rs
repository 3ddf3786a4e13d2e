//! Earth Engine expression graphs and the image handle built on top of them.
//!
//! An [`Expression`] is the REST API's serialized computation: a map of named
//! value nodes plus the id of the node that is the result. [`Image`] wraps an
//! expression whose result is an image and grows it with the invocations the
//! exporter needs (band casting, bounds, reprojection and clipping).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub result: String,
    pub values: BTreeMap<String, ValueNode>,
}

/// One node of an expression. Exactly one kind per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueNode {
    ConstantValue(Value),
    IntegerValue(String),
    BytesValue(String),
    ArrayValue(ArrayValue),
    DictionaryValue(DictionaryValue),
    FunctionDefinitionValue(FunctionDefinition),
    FunctionInvocationValue(FunctionInvocation),
    ArgumentReference(String),
    ValueReference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryValue {
    #[serde(default)]
    pub values: BTreeMap<String, ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    #[serde(default)]
    pub argument_names: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_reference: Option<String>,
    #[serde(default)]
    pub arguments: BTreeMap<String, ValueNode>,
}

impl ValueNode {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::ConstantValue(value.into())
    }

    pub fn reference(id: impl Into<String>) -> Self {
        Self::ValueReference(id.into())
    }

    /// Invocation of a named server-side algorithm.
    pub fn invoke<'a>(
        function: &str,
        arguments: impl IntoIterator<Item = (&'a str, ValueNode)>,
    ) -> Self {
        Self::FunctionInvocationValue(FunctionInvocation {
            function_name: Some(function.to_string()),
            function_reference: None,
            arguments: arguments
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        })
    }

    /// Ids this node points at within its namespace, recursively.
    pub(crate) fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::ValueReference(id) => out.push(id),
            Self::FunctionDefinitionValue(def) => out.push(&def.body),
            Self::ArrayValue(array) => {
                for v in &array.values {
                    v.collect_references(out);
                }
            }
            Self::DictionaryValue(dict) => {
                for v in dict.values.values() {
                    v.collect_references(out);
                }
            }
            Self::FunctionInvocationValue(call) => {
                if let Some(r) = &call.function_reference {
                    out.push(r);
                }
                for v in call.arguments.values() {
                    v.collect_references(out);
                }
            }
            Self::ConstantValue(_)
            | Self::IntegerValue(_)
            | Self::BytesValue(_)
            | Self::ArgumentReference(_) => {}
        }
    }
}

impl Expression {
    /// Adds `node` under a fresh id and makes it the result.
    fn push_result(&mut self, node: ValueNode) {
        let mut n = self.values.len();
        let id = loop {
            let candidate = format!("_{}", n);
            if !self.values.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.values.insert(id.clone(), node);
        self.result = id;
    }

    fn result_ref(&self) -> ValueNode {
        ValueNode::reference(self.result.clone())
    }
}

/// Numeric type every band is cast to before export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BandType {
    #[default]
    Float,
    Uint8,
    Uint16,
    Uint32,
}

impl BandType {
    fn algorithm(self) -> &'static str {
        match self {
            Self::Float => "Image.toFloat",
            Self::Uint8 => "Image.toUint8",
            Self::Uint16 => "Image.toUint16",
            Self::Uint32 => "Image.toUint32",
        }
    }
}

/// Handle to a server-side image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    expression: Expression,
}

impl Image {
    pub fn new(expression: Expression) -> Self {
        Self { expression }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Casts every band to `band_type`, so mixed-type images export cleanly.
    pub fn cast(mut self, band_type: BandType) -> Self {
        let node = ValueNode::invoke(
            band_type.algorithm(),
            [("value", self.expression.result_ref())],
        );
        self.expression.push_result(node);
        self
    }

    /// Expression evaluating to the bounding box of the image footprint.
    pub fn bounds(&self) -> Expression {
        let mut expr = self.expression.clone();
        let footprint = ValueNode::invoke("Image.geometry", [("feature", expr.result_ref())]);
        expr.push_result(ValueNode::invoke("Geometry.bounds", [("geometry", footprint)]));
        expr
    }

    /// Reprojects to `crs` at `scale` and clips to `region`.
    pub fn prepare(mut self, crs: &str, scale: f64, region: &Region) -> Self {
        let projection = ValueNode::invoke("Projection", [("crs", ValueNode::constant(crs))]);
        let reprojected = ValueNode::invoke(
            "Image.reproject",
            [
                ("image", self.expression.result_ref()),
                ("crs", projection),
                ("scale", ValueNode::constant(scale)),
            ],
        );
        self.expression.push_result(reprojected);
        let clipped = ValueNode::invoke(
            "Image.clip",
            [
                ("input", self.expression.result_ref()),
                ("geometry", region.to_node()),
            ],
        );
        self.expression.push_result(clipped);
        self
    }
}

/// Polygon coordinates of an export region, as returned by the bounds call.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    coordinates: Value,
}

impl Region {
    /// Reads `coordinates` out of a GeoJSON geometry.
    pub fn from_geojson(geometry: &Value) -> Option<Self> {
        let coordinates = geometry.get("coordinates")?;
        if !coordinates.is_array() {
            return None;
        }
        Some(Self {
            coordinates: coordinates.clone(),
        })
    }

    pub fn coordinates(&self) -> &Value {
        &self.coordinates
    }

    fn to_node(&self) -> ValueNode {
        ValueNode::invoke(
            "GeometryConstructors.Polygon",
            [
                ("coordinates", ValueNode::constant(self.coordinates.clone())),
                ("evenOdd", ValueNode::constant(true)),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn region_keeps_geojson_coordinates() {
        let ring = json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]);
        let region = Region::from_geojson(&json!({ "type": "Polygon", "coordinates": ring }));
        assert_eq!(region.unwrap().coordinates(), &ring);
    }

    fn collection_first() -> Image {
        let expr: Expression = serde_json::from_value(json!({
            "result": "0",
            "values": {
                "0": {
                    "functionInvocationValue": {
                        "functionName": "Collection.first",
                        "arguments": {
                            "collection": {
                                "functionInvocationValue": {
                                    "functionName": "ImageCollection.load",
                                    "arguments": { "id": { "constantValue": "COPERNICUS/S2" } }
                                }
                            }
                        }
                    }
                }
            }
        }))
        .unwrap();
        Image::new(expr)
    }

    #[test]
    fn value_nodes_use_rest_field_names() {
        let node = ValueNode::invoke("Image.toFloat", [("value", ValueNode::reference("0"))]);
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "functionInvocationValue": {
                    "functionName": "Image.toFloat",
                    "arguments": { "value": { "valueReference": "0" } }
                }
            })
        );
    }

    #[test]
    fn node_with_two_kinds_is_rejected() {
        let parsed = serde_json::from_value::<ValueNode>(json!({
            "constantValue": 1,
            "valueReference": "x"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn cast_wraps_previous_result() {
        let image = collection_first().cast(BandType::Float);
        let expr = image.expression();
        assert_eq!(expr.result, "_1");
        assert_eq!(
            expr.values["_1"],
            ValueNode::invoke("Image.toFloat", [("value", ValueNode::reference("0"))])
        );
    }

    #[test]
    fn cast_uses_requested_integer_width() {
        let image = collection_first().cast(BandType::Uint16);
        let json = serde_json::to_value(image.expression()).unwrap();
        assert_eq!(
            json["values"]["_1"]["functionInvocationValue"]["functionName"],
            "Image.toUint16"
        );
    }

    #[test]
    fn bounds_leaves_image_untouched() {
        let image = collection_first();
        let bounds = image.bounds();
        assert_eq!(image.expression().values.len(), 1);
        let json = serde_json::to_value(&bounds).unwrap();
        let result = &json["values"][bounds.result.as_str()]["functionInvocationValue"];
        assert_eq!(result["functionName"], "Geometry.bounds");
        assert_eq!(
            result["arguments"]["geometry"]["functionInvocationValue"]["functionName"],
            "Image.geometry"
        );
    }

    #[test]
    fn prepare_reprojects_then_clips() {
        let region = Region::from_geojson(&json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        }))
        .unwrap();
        let image = collection_first().prepare("EPSG:4326", 10.0, &region);
        let json = serde_json::to_value(image.expression()).unwrap();
        let clip = &json["values"][image.expression().result.as_str()]["functionInvocationValue"];
        assert_eq!(clip["functionName"], "Image.clip");
        let input = clip["arguments"]["input"]["valueReference"].as_str().unwrap();
        let reproject = &json["values"][input]["functionInvocationValue"];
        assert_eq!(reproject["functionName"], "Image.reproject");
        assert_eq!(reproject["arguments"]["scale"]["constantValue"], 10.0);
        let projection = &reproject["arguments"]["crs"]["functionInvocationValue"];
        assert_eq!(projection["arguments"]["crs"]["constantValue"], "EPSG:4326");
    }

    #[test]
    fn region_requires_coordinate_array() {
        assert!(Region::from_geojson(&json!({ "type": "Polygon" })).is_none());
        assert!(Region::from_geojson(&json!({ "coordinates": "x" })).is_none());
    }

    #[test]
    fn fresh_ids_skip_existing_names() {
        let mut expr: Expression = serde_json::from_value(json!({
            "result": "_1",
            "values": { "_1": { "constantValue": 1 } }
        }))
        .unwrap();
        expr.push_result(ValueNode::constant(2));
        assert_eq!(expr.result, "_2");
    }
}

//! CloudFormation template document builder.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use dbstack_core::RemovalPolicy;

/// Template format version understood by the orchestrator.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A named value published by a unit for consumers outside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    /// Output key inside the template.
    pub logical_id: String,
    /// Stable, account-wide export name.
    pub name: String,
    pub description: String,
    pub value: Value,
}

impl Export {
    pub fn new(logical_id: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            name: name.into(),
            description: String::new(),
            value,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    fn to_output(&self) -> Value {
        let mut output = Map::new();
        if !self.description.is_empty() {
            output.insert("Description".to_string(), json!(self.description));
        }
        output.insert("Value".to_string(), self.value.clone());
        output.insert("Export".to_string(), json!({ "Name": self.name }));
        Value::Object(output)
    }
}

/// `{"Ref": id}`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [id, attr]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::ImportValue": name}`
pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// `{"Fn::Sub": text}`
pub fn sub(text: &str) -> Value {
    json!({ "Fn::Sub": text })
}

/// Declarative template for one unit.
///
/// Resources and outputs are kept in sorted maps so the rendered document
/// is identical for identical input.
#[derive(Debug, Clone, Default)]
pub struct Template {
    description: String,
    transform: Option<String>,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Macro the orchestrator must run before processing the document.
    pub fn with_transform(&mut self, transform: impl Into<String>) -> &mut Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn transform(&self) -> Option<&str> {
        self.transform.as_deref()
    }

    pub fn resource(&mut self, logical_id: &str, resource_type: &str, properties: Value) -> &mut Self {
        self.resources.insert(
            logical_id.to_string(),
            json!({ "Type": resource_type, "Properties": properties }),
        );
        self
    }

    /// Resource carrying `DeletionPolicy` / `UpdateReplacePolicy`.
    pub fn resource_with_policy(
        &mut self,
        logical_id: &str,
        resource_type: &str,
        properties: Value,
        policy: RemovalPolicy,
    ) -> &mut Self {
        self.resources.insert(
            logical_id.to_string(),
            json!({
                "Type": resource_type,
                "Properties": properties,
                "DeletionPolicy": policy.deletion_policy(),
                "UpdateReplacePolicy": policy.deletion_policy(),
            }),
        );
        self
    }

    /// Add a `DependsOn` entry to an already declared resource.
    pub fn depends_on(&mut self, logical_id: &str, on: &str) -> &mut Self {
        if let Some(Value::Object(resource)) = self.resources.get_mut(logical_id) {
            let entry = resource
                .entry("DependsOn")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = entry {
                list.push(json!(on));
            }
        }
        self
    }

    pub fn output(&mut self, export: &Export) -> &mut Self {
        self.outputs.insert(export.logical_id.clone(), export.to_output());
        self
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn has_resource(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("AWSTemplateFormatVersion".to_string(), json!(TEMPLATE_FORMAT_VERSION));
        doc.insert("Description".to_string(), json!(self.description));
        if let Some(transform) = &self.transform {
            doc.insert("Transform".to_string(), json!(transform));
        }
        doc.insert("Resources".to_string(), Value::Object(self.resources.clone()));
        if !self.outputs.is_empty() {
            doc.insert("Outputs".to_string(), Value::Object(self.outputs.clone()));
        }
        Value::Object(doc)
    }
}

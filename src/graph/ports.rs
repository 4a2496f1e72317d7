// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use super::value::{DataKind, FromValue, Value};
use crate::errors::PipelineError;

/// One named, typed slot on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub name: String,
    pub kind: DataKind,
    /// A withheld required input withholds the whole node for the pass.
    pub required: bool,
    /// Only aggregate inputs accept more than one incoming edge.
    pub aggregate: bool,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, kind: DataKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            aggregate: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }
}

/// The fixed interface a node declares once, at graph construction.
#[derive(Debug, Clone, Default)]
pub struct NodeInterface {
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
}

impl NodeInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, port: PortSpec) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: PortSpec) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn find_input(&self, name: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// Values delivered to a node for the current pass.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    node: String,
    values: HashMap<String, Vec<Value>>,
}

impl Inputs {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            values: HashMap::new(),
        }
    }

    /// Name of the node instance these inputs belong to.
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn push(&mut self, port: impl Into<String>, value: Value) {
        self.values.entry(port.into()).or_default().push(value);
    }

    /// Replace whatever a port holds, keeping other ports untouched.
    pub fn replace(&mut self, port: impl Into<String>, values: Vec<Value>) {
        self.values.insert(port.into(), values);
    }

    pub fn contains(&self, port: &str) -> bool {
        self.values.get(port).is_some_and(|v| !v.is_empty())
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port).and_then(|v| v.first())
    }

    /// Every value delivered to an aggregate input, in edge declaration order.
    pub fn all(&self, port: &str) -> &[Value] {
        self.values.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_as<T: FromValue>(&self, port: &str) -> Option<T> {
        self.get(port).and_then(T::from_value)
    }

    pub fn all_as<T: FromValue>(&self, port: &str) -> Vec<T> {
        self.all(port).iter().filter_map(T::from_value).collect()
    }

    /// Fetch a value the node cannot work without.
    pub fn require<T: FromValue>(&self, port: &str) -> Result<T, PipelineError> {
        self.get_as(port).ok_or_else(|| {
            PipelineError::invalid_input(&self.node, format!("missing input '{}'", port))
        })
    }

    pub fn ports(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.values.iter()
    }
}

/// Values a node publishes for the current pass. Ports left unset are withheld.
#[derive(Debug, Default)]
pub struct Outputs {
    values: HashMap<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, port: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(port.into(), value.into());
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_the_node_and_port() {
        let inputs = Inputs::new("trainer");
        let err = inputs.require::<i64>("frame_number").unwrap_err();
        assert!(err.to_string().contains("trainer"));
        assert!(err.to_string().contains("frame_number"));
    }

    #[test]
    fn aggregate_values_keep_delivery_order() {
        let mut inputs = Inputs::new("tester");
        inputs.push("models", Value::FrameNumber(1));
        inputs.push("models", Value::FrameNumber(2));
        assert_eq!(inputs.all_as::<i64>("models"), vec![1, 2]);
        assert_eq!(inputs.get_as::<i64>("models"), Some(1));
    }
}

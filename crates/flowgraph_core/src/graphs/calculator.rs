// SPDX-License-Identifier: MIT OR Apache-2.0
//! Calculator graph: numeric constants combined by arithmetic nodes.
//!
//! The graph result is the pair of values fed into the single output node.

use crate::entry::EntryError;
use crate::graph::{Graph, TopologyError};
use crate::node::{EntryValues, NodeBuilder, NodeCode, NodeError, NodeLogic, OutputWriter};
use crate::registry::{Namespace, NodeRegistry, NodeType, RegistryError};
use crate::widget::{ComboBox, ValueBox};
use serde_json::json;
use std::sync::Arc;

/// Code of the output node
pub const OUTPUT: NodeCode = NodeCode(0);
/// Code of the constant node
pub const CONSTANT: NodeCode = NodeCode(1);
/// Code of the arithmetic operation node
pub const OPERATION: NodeCode = NodeCode(2);
/// Code of the square root node
pub const SQUARE_ROOT: NodeCode = NodeCode(3);

/// Operations offered by the operation node
pub const OPERATIONS: [&str; 4] = ["Add", "Subtract", "Multiply", "Divide"];

/// Create the calculator node registry with all available node types
pub fn create_calculator_registry() -> Result<NodeRegistry, RegistryError> {
    let namespace = Namespace::new()
        .with_type(NodeType::new(CONSTANT, "Constant", constant_logic))
        .with_section(
            "Math",
            Namespace::new()
                .with_type(NodeType::new(OPERATION, "Operation", operation_logic))
                .with_type(NodeType::new(SQUARE_ROOT, "Square root", square_root_logic)),
        )
        .with_type(NodeType::new(OUTPUT, "Output", output_logic));
    NodeRegistry::new(namespace)
}

/// Build the example graph `Constant(5) -> Operation(Add, 3) -> Output`
pub fn example_graph() -> Result<Graph, TopologyError> {
    let registry = Arc::new(create_calculator_registry()?);
    let mut graph = Graph::new(Arc::clone(&registry));
    graph.set_output_type(Some(OUTPUT))?;

    let constant = graph.add_node(registry.create_node(CONSTANT)?.with_position(-300.0, 0.0))?;
    let operation = graph.create_node(OPERATION)?;
    let output = graph.add_node(registry.create_node(OUTPUT)?.with_position(300.0, 0.0))?;

    graph.set_entry_value(constant, "Value", json!(5))?;
    graph.set_entry_value(operation, "Operation", json!("Add"))?;
    graph.set_entry_value(operation, "Value 2", json!(3))?;

    graph.connect_entries(constant, "Value", operation, "Value 1")?;
    graph.connect_entries(operation, "Output", output, "Value 1")?;
    Ok(graph)
}

// ============================================================================
// Output
// ============================================================================

/// Collects the graph result
#[derive(Debug, Default)]
pub struct OutputNode;

/// Factory for [`OutputNode`]
pub fn output_logic() -> Box<dyn NodeLogic> {
    Box::new(OutputNode)
}

impl NodeLogic for OutputNode {
    fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError> {
        node.title("Output");
        node.add_label_input("Value 1")?.add_label_input("Value 2")?;
        Ok(())
    }

    fn evaluate(&self, _: &EntryValues, _: &mut OutputWriter<'_>) -> Result<(), NodeError> {
        Ok(())
    }
}

// ============================================================================
// Constant
// ============================================================================

/// A number typed in by the user
#[derive(Debug, Default)]
pub struct ConstantNode;

/// Factory for [`ConstantNode`]
pub fn constant_logic() -> Box<dyn NodeLogic> {
    Box::new(ConstantNode)
}

impl NodeLogic for ConstantNode {
    fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError> {
        node.title("Constant");
        node.add_value_output("Value", ValueBox::default())?;
        Ok(())
    }

    fn evaluate(&self, values: &EntryValues, outputs: &mut OutputWriter<'_>) -> Result<(), NodeError> {
        outputs.set("Value", NodeError::number(values, "Value")?)
    }
}

// ============================================================================
// Math
// ============================================================================

/// Binary arithmetic on two inputs
#[derive(Debug, Default)]
pub struct OperationNode;

/// Factory for [`OperationNode`]
pub fn operation_logic() -> Box<dyn NodeLogic> {
    Box::new(OperationNode)
}

impl NodeLogic for OperationNode {
    fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError> {
        node.title("Operation");
        node.add_label_output("Output")?
            .add_combo_box_entry("Operation", ComboBox::new(OPERATIONS))?
            .add_value_input("Value 1", ValueBox::default())?
            .add_value_input("Value 2", ValueBox::default())?;
        Ok(())
    }

    fn evaluate(&self, values: &EntryValues, outputs: &mut OutputWriter<'_>) -> Result<(), NodeError> {
        let a = NodeError::number(values, "Value 1")?;
        let b = NodeError::number(values, "Value 2")?;
        let operation = values
            .get("Operation")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NodeError::MissingValue("Operation".into()))?;
        let result = match operation {
            "Add" => a + b,
            "Subtract" => a - b,
            "Multiply" => a * b,
            "Divide" if b == 0.0 => return Err(NodeError::Failed("division by zero".into())),
            "Divide" => a / b,
            other => return Err(NodeError::Failed(format!("unknown operation '{other}'"))),
        };
        outputs.set("Output", result)
    }
}

/// Square root of its input
#[derive(Debug, Default)]
pub struct SquareRootNode;

/// Factory for [`SquareRootNode`]
pub fn square_root_logic() -> Box<dyn NodeLogic> {
    Box::new(SquareRootNode)
}

impl NodeLogic for SquareRootNode {
    fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError> {
        node.title("Square root");
        node.add_label_output("Output")?
            .add_value_input("Value", ValueBox::default())?;
        Ok(())
    }

    fn evaluate(&self, values: &EntryValues, outputs: &mut OutputWriter<'_>) -> Result<(), NodeError> {
        let value = NodeError::number(values, "Value")?;
        if value < 0.0 {
            return Err(NodeError::Failed(format!("square root of negative number {value}")));
        }
        outputs.set("Output", value.sqrt())
    }
}

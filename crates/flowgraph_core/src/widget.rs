// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value sources for entries.
//!
//! A widget is whatever the presentation layer uses to let the user edit an
//! entry. The engine only needs its current value, a way to set it, and a
//! way to save and restore its contents. Four widgets are provided:
//!
//! - [`Label`]: no value, just a name
//! - [`ValueBox`]: a number with a range
//! - [`TextBox`]: a string
//! - [`ComboBox`]: a choice between named items, each optionally carrying data

use serde_json::{Map, Number, Value};
use std::fmt;

/// Saved widget contents, stored under `custom` in the entry state
pub type WidgetState = Map<String, Value>;

/// Error when a widget refuses a value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WidgetError {
    /// The widget has no editable value
    #[error("{widget} widgets have no editable value")]
    ReadOnly {
        /// Widget kind
        widget: &'static str,
    },

    /// The value has the wrong type or is out of the widget's domain
    #[error("{widget} widgets cannot hold {value}")]
    Rejected {
        /// Widget kind
        widget: &'static str,
        /// The refused value
        value: Value,
    },
}

/// Value source of an entry.
///
/// `save` and `load` default to storing nothing, so a widget without
/// persistent contents only has to provide its value.
pub trait EntryWidget: fmt::Debug + Send + Sync {
    /// Short name of the widget kind, used in diagnostics
    fn kind(&self) -> &'static str;

    /// Current value
    fn value(&self) -> Value;

    /// Replace the current value
    fn set_value(&mut self, value: Value) -> Result<(), WidgetError>;

    /// Whether the widget may only be used on static entries
    fn static_only(&self) -> bool {
        false
    }

    /// Contents to persist
    fn save(&self) -> WidgetState {
        WidgetState::new()
    }

    /// Restore persisted contents. Returns `false` if part of the state was unusable.
    fn load(&mut self, state: &WidgetState) -> bool {
        let _ = state;
        true
    }
}

/// Widget showing only the entry name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Label;

impl EntryWidget for Label {
    fn kind(&self) -> &'static str {
        "label"
    }

    fn value(&self) -> Value {
        Value::Null
    }

    fn set_value(&mut self, _value: Value) -> Result<(), WidgetError> {
        Err(WidgetError::ReadOnly { widget: self.kind() })
    }
}

/// Numeric input constrained to a range
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBox {
    value: f64,
    minimum: f64,
    maximum: f64,
    integer: bool,
}

impl ValueBox {
    /// Create a floating point value box with the default range of -100 to 100
    pub fn new(value: f64) -> Self {
        let mut value_box = Self {
            value: 0.0,
            minimum: -100.0,
            maximum: 100.0,
            integer: false,
        };
        value_box.value = value_box.constrain(value);
        value_box
    }

    /// Set the allowed range
    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self.value = self.constrain(self.value);
        self
    }

    /// Only hold whole numbers
    pub fn integer(mut self) -> Self {
        self.integer = true;
        self.value = self.constrain(self.value);
        self
    }

    /// Current value as a float
    pub fn number(&self) -> f64 {
        self.value
    }

    /// Lower bound
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Upper bound
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Whether only whole numbers are held
    pub fn is_integer(&self) -> bool {
        self.integer
    }

    fn constrain(&self, value: f64) -> f64 {
        let value = value.max(self.minimum).min(self.maximum);
        if self.integer {
            value.round()
        } else {
            value
        }
    }

    fn to_json(&self, value: f64) -> Value {
        if self.integer {
            Value::from(value.round() as i64)
        } else {
            Number::from_f64(value).map_or(Value::Null, Value::Number)
        }
    }
}

impl Default for ValueBox {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl EntryWidget for ValueBox {
    fn kind(&self) -> &'static str {
        "value box"
    }

    fn value(&self) -> Value {
        self.to_json(self.value)
    }

    fn set_value(&mut self, value: Value) -> Result<(), WidgetError> {
        let Some(number) = value.as_f64() else {
            return Err(WidgetError::Rejected {
                widget: self.kind(),
                value,
            });
        };
        self.value = self.constrain(number);
        Ok(())
    }

    fn save(&self) -> WidgetState {
        let mut state = WidgetState::new();
        state.insert("value".into(), self.to_json(self.value));
        state.insert("minimum".into(), self.to_json(self.minimum));
        state.insert("maximum".into(), self.to_json(self.maximum));
        state
    }

    fn load(&mut self, state: &WidgetState) -> bool {
        let mut complete = true;
        let mut read = |key: &str, target: &mut f64| match state.get(key) {
            Some(value) => match value.as_f64() {
                Some(number) => *target = number,
                None => complete = false,
            },
            None => {}
        };
        read("minimum", &mut self.minimum);
        read("maximum", &mut self.maximum);
        let mut value = self.value;
        read("value", &mut value);
        self.value = self.constrain(value);
        complete
    }
}

/// Free text input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBox {
    value: String,
    max_length: usize,
}

impl TextBox {
    /// Default maximum length, in characters
    pub const DEFAULT_MAX_LENGTH: usize = 32767;

    /// Create a text box holding `value`
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            max_length: Self::DEFAULT_MAX_LENGTH,
        }
    }

    /// Limit the text length; longer text is truncated
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        let value = std::mem::take(&mut self.value);
        self.value = self.truncate(value);
        self
    }

    /// Current text
    pub fn text(&self) -> &str {
        &self.value
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() <= self.max_length {
            text
        } else {
            text.chars().take(self.max_length).collect()
        }
    }
}

impl Default for TextBox {
    fn default() -> Self {
        Self::new("")
    }
}

impl EntryWidget for TextBox {
    fn kind(&self) -> &'static str {
        "text box"
    }

    fn value(&self) -> Value {
        Value::String(self.value.clone())
    }

    fn set_value(&mut self, value: Value) -> Result<(), WidgetError> {
        match value {
            Value::String(text) => {
                self.value = self.truncate(text);
                Ok(())
            }
            other => Err(WidgetError::Rejected {
                widget: self.kind(),
                value: other,
            }),
        }
    }

    fn save(&self) -> WidgetState {
        let mut state = WidgetState::new();
        state.insert("value".into(), self.value());
        state
    }

    fn load(&mut self, state: &WidgetState) -> bool {
        match state.get("value") {
            Some(Value::String(text)) => {
                self.value = self.truncate(text.clone());
                true
            }
            Some(_) => false,
            None => true,
        }
    }
}

/// An item in a [`ComboBox`]
#[derive(Debug, Clone, PartialEq)]
pub struct ComboItem {
    /// Displayed text
    pub text: String,
    /// Data returned as the value when selected; the text is returned when absent
    pub data: Option<Value>,
}

/// Choice between a fixed list of items
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComboBox {
    items: Vec<ComboItem>,
    index: Option<usize>,
}

impl ComboBox {
    /// Create a combo box whose value is the selected item's text
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_items(items.into_iter().map(|text| ComboItem {
            text: text.into(),
            data: None,
        }))
    }

    /// Create a combo box whose value is the data of the selected item
    pub fn with_data<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self::from_items(items.into_iter().map(|(text, data)| ComboItem {
            text: text.into(),
            data: Some(data),
        }))
    }

    fn from_items(items: impl Iterator<Item = ComboItem>) -> Self {
        let items: Vec<ComboItem> = items.collect();
        let index = if items.is_empty() { None } else { Some(0) };
        Self { items, index }
    }

    /// All items
    pub fn items(&self) -> &[ComboItem] {
        &self.items
    }

    /// Index of the selected item
    pub fn current_index(&self) -> Option<usize> {
        self.index
    }

    /// Select an item by index. Returns `false` if the index is out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.index = Some(index);
            true
        } else {
            false
        }
    }

    /// Selected item
    pub fn current(&self) -> Option<&ComboItem> {
        self.index.and_then(|index| self.items.get(index))
    }
}

impl EntryWidget for ComboBox {
    fn kind(&self) -> &'static str {
        "combo box"
    }

    fn value(&self) -> Value {
        match self.current() {
            Some(ComboItem {
                data: Some(data), ..
            }) => data.clone(),
            Some(item) => Value::String(item.text.clone()),
            None => Value::Null,
        }
    }

    fn set_value(&mut self, value: Value) -> Result<(), WidgetError> {
        let selected = match &value {
            Value::Number(number) => number
                .as_u64()
                .is_some_and(|index| self.select(index as usize)),
            Value::String(text) => match self.items.iter().position(|item| item.text == *text) {
                Some(index) => self.select(index),
                None => false,
            },
            _ => false,
        };
        if selected {
            Ok(())
        } else {
            Err(WidgetError::Rejected {
                widget: self.kind(),
                value,
            })
        }
    }

    fn static_only(&self) -> bool {
        true
    }

    fn save(&self) -> WidgetState {
        let mut state = WidgetState::new();
        let index = self.index.map_or(-1, |index| index as i64);
        state.insert("index".into(), Value::from(index));
        state
    }

    fn load(&mut self, state: &WidgetState) -> bool {
        match state.get("index").map(Value::as_i64) {
            None => true,
            Some(Some(-1)) if self.items.is_empty() => {
                self.index = None;
                true
            }
            Some(Some(index)) if index >= 0 => self.select(index as usize),
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_box_clamps_to_range() {
        let mut value_box = ValueBox::new(5.0).with_range(0.0, 10.0);
        value_box.set_value(json!(25)).unwrap();
        assert_eq!(value_box.value(), json!(10.0));
        value_box.set_value(json!(-3.5)).unwrap();
        assert_eq!(value_box.value(), json!(0.0));
    }

    #[test]
    fn test_integer_value_box_rounds() {
        let mut value_box = ValueBox::new(0.0).integer();
        value_box.set_value(json!(2.6)).unwrap();
        assert_eq!(value_box.value(), json!(3));
    }

    #[test]
    fn test_value_box_rejects_text() {
        let mut value_box = ValueBox::default();
        assert!(value_box.set_value(json!("five")).is_err());
    }

    #[test]
    fn test_value_box_save_and_load() {
        let original = ValueBox::new(4.25).with_range(-5.0, 5.0);
        let state = original.save();
        assert_eq!(state.get("value"), Some(&json!(4.25)));

        let mut restored = ValueBox::default();
        assert!(restored.load(&state));
        assert_eq!(restored, original);
    }

    #[test]
    fn test_value_box_load_reports_bad_fields() {
        let mut value_box = ValueBox::new(1.0);
        let mut state = WidgetState::new();
        state.insert("value".into(), json!("nope"));
        assert!(!value_box.load(&state));
        assert_eq!(value_box.number(), 1.0);
    }

    #[test]
    fn test_text_box_truncates() {
        let mut text_box = TextBox::new("hello").with_max_length(3);
        assert_eq!(text_box.text(), "hel");
        text_box.set_value(json!("world")).unwrap();
        assert_eq!(text_box.value(), json!("wor"));
    }

    #[test]
    fn test_combo_box_value_prefers_data() {
        let mut combo = ComboBox::with_data([("Add", json!("add")), ("Subtract", json!("sub"))]);
        assert_eq!(combo.value(), json!("add"));
        combo.set_value(json!("Subtract")).unwrap();
        assert_eq!(combo.value(), json!("sub"));
        combo.set_value(json!(0)).unwrap();
        assert_eq!(combo.current_index(), Some(0));
        assert!(combo.set_value(json!(7)).is_err());
    }

    #[test]
    fn test_combo_box_without_data_returns_text() {
        let combo = ComboBox::new(["One", "Two"]);
        assert_eq!(combo.value(), json!("One"));
        assert!(combo.static_only());
    }

    #[test]
    fn test_combo_box_save_and_load() {
        let mut combo = ComboBox::new(["a", "b", "c"]);
        combo.select(2);
        let state = combo.save();

        let mut restored = ComboBox::new(["a", "b", "c"]);
        assert!(restored.load(&state));
        assert_eq!(restored.current_index(), Some(2));

        let mut short = ComboBox::new(["a"]);
        assert!(!short.load(&state));
    }

    #[test]
    fn test_label_is_read_only() {
        let mut label = Label;
        assert_eq!(label.value(), Value::Null);
        assert!(label.set_value(json!(1)).is_err());
    }
}

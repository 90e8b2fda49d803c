//! Precondition grammar for conditional writes
//!
//! A `Condition` is a predicate over the current state of one stored item.
//! Backends evaluate it atomically together with the write it guards.

use std::collections::BTreeMap;

use crate::value::{AttributeValue, Item};

/// Predicate over the existence and values of a stored item's attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The attribute is present
    Exists(String),
    /// The attribute is absent (also true when the item is absent)
    NotExists(String),
    /// The attribute is present and equal to the value
    Equals(String, AttributeValue),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn exists(attr: impl Into<String>) -> Self {
        Condition::Exists(attr.into())
    }

    pub fn not_exists(attr: impl Into<String>) -> Self {
        Condition::NotExists(attr.into())
    }

    pub fn equals(attr: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Condition::Equals(attr.into(), value.into())
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate against the current item, `None` meaning no item is stored
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        match self {
            Condition::Exists(attr) => item.is_some_and(|i| i.contains_key(attr)),
            Condition::NotExists(attr) => !item.is_some_and(|i| i.contains_key(attr)),
            Condition::Equals(attr, value) => item.and_then(|i| i.get(attr)) == Some(value),
            Condition::And(l, r) => l.evaluate(item) && r.evaluate(item),
            Condition::Or(l, r) => l.evaluate(item) || r.evaluate(item),
        }
    }

    /// Render as a DynamoDB-style condition expression with placeholders
    pub fn render(&self) -> RenderedCondition {
        let mut rendered = RenderedCondition::default();
        let expression = rendered.render_node(self);
        rendered.expression = expression;
        rendered
    }
}

/// A condition expression plus its attribute name and value placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedCondition {
    pub expression: String,
    /// `#aN` placeholder to attribute name
    pub names: BTreeMap<String, String>,
    /// `:vN` placeholder to value
    pub values: BTreeMap<String, AttributeValue>,
}

impl RenderedCondition {
    fn name_placeholder(&mut self, attr: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, name)| name.as_str() == attr) {
            return placeholder.clone();
        }
        let placeholder = format!("#a{}", self.names.len());
        self.names.insert(placeholder.clone(), attr.to_string());
        placeholder
    }

    fn value_placeholder(&mut self, value: &AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        placeholder
    }

    fn render_node(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Exists(attr) => {
                format!("attribute_exists({})", self.name_placeholder(attr))
            }
            Condition::NotExists(attr) => {
                format!("attribute_not_exists({})", self.name_placeholder(attr))
            }
            Condition::Equals(attr, value) => {
                let name = self.name_placeholder(attr);
                format!("{} = {}", name, self.value_placeholder(value))
            }
            Condition::And(l, r) => {
                let left = self.render_node(l);
                format!("({}) AND ({})", left, self.render_node(r))
            }
            Condition::Or(l, r) => {
                let left = self.render_node(l);
                format!("({}) OR ({})", left, self.render_node(r))
            }
        }
    }
}

//! Attribute values, items, and item keys

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A scalar attribute value as stored in a lock table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// String value
    S(String),
    /// Integral number value
    N(i64),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::N(_) => None,
        }
    }

    pub fn as_n(&self) -> Option<i64> {
        match self {
            AttributeValue::N(n) => Some(*n),
            AttributeValue::S(_) => None,
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::S(s) => write!(f, "{}", s),
            AttributeValue::N(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::S(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::N(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::N(value as i64)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::N(value as i64)
    }
}

/// A stored item: attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// One named component of an item key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyAttribute {
    pub name: String,
    pub value: AttributeValue,
}

/// Primary key of an item: partition component plus optional sort component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub partition: KeyAttribute,
    pub sort: Option<KeyAttribute>,
}

impl ItemKey {
    pub fn new(partition_name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            partition: KeyAttribute {
                name: partition_name.into(),
                value: value.into(),
            },
            sort: None,
        }
    }

    pub fn with_sort(
        mut self,
        sort_name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.sort = Some(KeyAttribute {
            name: sort_name.into(),
            value: value.into(),
        });
        self
    }

    /// Key components in partition, sort order
    pub fn attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition).chain(self.sort.iter())
    }

    /// Key components as an item
    pub fn to_item(&self) -> Item {
        self.attributes()
            .map(|attr| (attr.name.clone(), attr.value.clone()))
            .collect()
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.partition.name, self.partition.value)?;
        if let Some(sort) = &self.sort {
            write!(f, ", {}={}", sort.name, sort.value)?;
        }
        Ok(())
    }
}

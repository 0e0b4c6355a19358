use regex::Regex;
use serde_json::Value;
use tessera_shape::ShapeRef;

use crate::config::MatchRuleConfig;
use crate::error::{PlacementError, PlacementResult};

/// Where a matched shape goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub path: String,
    pub order: String,
}

impl Target {
    pub fn new(path: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: order.into(),
        }
    }
}

/// A shape property a rule can test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Id,
    Type,
    DisplayType,
    Name,
    /// Dotted lookup path, see [`ShapeRef::lookup`].
    Path(String),
}

impl Field {
    fn label(&self) -> &str {
        match self {
            Self::Id => "id",
            Self::Type => "type",
            Self::DisplayType => "displayType",
            Self::Name => "name",
            Self::Path(path) => path,
        }
    }

    /// The field's value on `shape` as text, if it has one.
    pub fn read(&self, shape: &ShapeRef) -> Option<String> {
        match self {
            // Content shapes carry their item's id.
            Self::Id => shape.id().or_else(|| shape.item().map(|item| item.id.clone())),
            Self::Type => Some(shape.type_name()),
            Self::DisplayType => shape.display_type(),
            Self::Name => shape.name(),
            Self::Path(path) => shape.lookup(path).map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        }
    }
}

/// A compiled match rule: every predicate must match.
#[derive(Clone, Debug)]
pub struct MatchRule {
    predicates: Vec<(Field, Regex)>,
    target: Target,
}

impl MatchRule {
    pub fn new(target: Target) -> Self {
        Self {
            predicates: Vec::new(),
            target,
        }
    }

    /// Add a predicate.
    pub fn when(mut self, field: Field, pattern: &str) -> PlacementResult<Self> {
        let regex = Regex::new(pattern).map_err(|source| PlacementError::InvalidPattern {
            field: field.label().to_string(),
            pattern: pattern.to_string(),
            source,
        })?;
        self.predicates.push((field, regex));
        Ok(self)
    }

    pub fn compile(config: &MatchRuleConfig) -> PlacementResult<Self> {
        let mut rule = Self::new(Target::new(&config.path, &config.order));
        let fixed = [
            (Field::Id, &config.id),
            (Field::Type, &config.type_name),
            (Field::DisplayType, &config.display_type),
            (Field::Name, &config.name),
        ];
        for (field, pattern) in fixed {
            if let Some(pattern) = pattern {
                rule = rule.when(field, pattern)?;
            }
        }
        for (path, pattern) in &config.meta {
            rule = rule.when(Field::Path(path.clone()), pattern)?;
        }
        Ok(rule)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn matches(&self, shape: &ShapeRef) -> bool {
        self.predicates.iter().all(|(field, regex)| {
            field
                .read(shape)
                .is_some_and(|value| regex.is_match(&value))
        })
    }
}

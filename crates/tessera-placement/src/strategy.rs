use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tessera_scope::{Contract, Scope};
use tessera_shape::{place, PlacementHint, ShapeRef};
use tracing::{debug, trace};

use crate::config::PlacementConfig;
use crate::error::PlacementResult;
use crate::rule::{MatchRule, Target};

/// Services that place the request's loose shapes into the page tree.
pub const PLACEMENT_STRATEGY: Contract<dyn PlacementStrategy> =
    Contract::new("placement-strategy");

/// Custom placement functions, consulted before any declarative rule.
pub const PLACEMENT_HANDLER: Contract<dyn PlacementHandler> = Contract::new("placement-handler");

/// State threaded through placement: the tree root and the shapes still
/// waiting for a place.
pub struct PlacementContext {
    pub scope: Scope,
    /// Root of the tree shapes are placed into.
    pub shape: ShapeRef,
    /// Shapes not yet placed. Placed shapes are removed.
    pub shapes: Vec<ShapeRef>,
}

impl PlacementContext {
    pub fn new(scope: Scope, shape: ShapeRef, shapes: Vec<ShapeRef>) -> Self {
        Self {
            scope,
            shape,
            shapes,
        }
    }
}

#[async_trait]
pub trait PlacementStrategy: Send + Sync {
    /// Place what it can of `context.shapes` into `context.shape`, removing
    /// every shape it placed from the list.
    async fn place_shapes(&self, context: &mut PlacementContext) -> PlacementResult<()>;
}

/// Arbitrary placement logic. Returns `true` once it has dealt with the shape.
pub trait PlacementHandler: Send + Sync {
    fn place(&self, root: &ShapeRef, shape: &ShapeRef) -> PlacementResult<bool>;
}

impl<F> PlacementHandler for F
where
    F: Fn(&ShapeRef, &ShapeRef) -> PlacementResult<bool> + Send + Sync,
{
    fn place(&self, root: &ShapeRef, shape: &ShapeRef) -> PlacementResult<bool> {
        self(root, shape)
    }
}

/// The standard strategy.
///
/// For each shape, in priority order:
/// 1. custom [`PlacementHandler`]s (own list, then `placement-handler` services);
/// 2. regex [`MatchRule`]s;
/// 3. the type-name table;
/// 4. the shape's own `meta.placement`.
///
/// Shapes nothing matches stay in the list and are never rendered.
#[derive(Default)]
pub struct RulePlacementStrategy {
    handlers: Vec<Arc<dyn PlacementHandler>>,
    rules: Vec<MatchRule>,
    types: IndexMap<String, Target>,
}

impl RulePlacementStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PlacementConfig) -> PlacementResult<Self> {
        let mut strategy = Self::new();
        for rule in &config.matches {
            strategy.rules.push(MatchRule::compile(rule)?);
        }
        for (type_name, hint) in &config.types {
            let (path, order) = hint.target();
            strategy.types.insert(type_name.clone(), Target::new(path, order));
        }
        Ok(strategy)
    }

    pub fn with_handler(mut self, handler: Arc<dyn PlacementHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_rule(mut self, rule: MatchRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>, target: Target) -> Self {
        self.types.insert(type_name.into(), target);
        self
    }

    /// The declarative target for `shape`, if any.
    fn target_for(&self, shape: &ShapeRef) -> Option<Target> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(shape)) {
            return Some(rule.target().clone());
        }
        if let Some(target) = self.types.get(&shape.type_name()) {
            return Some(target.clone());
        }
        shape.placement().map(|hint: PlacementHint| {
            let (path, order) = hint.target();
            Target::new(path, order)
        })
    }

    fn place_one(
        &self,
        handlers: &[Arc<dyn PlacementHandler>],
        root: &ShapeRef,
        shape: &ShapeRef,
    ) -> PlacementResult<bool> {
        for handler in handlers {
            if handler.place(root, shape)? {
                return Ok(true);
            }
        }
        let Some(target) = self.target_for(shape) else {
            trace!(shape = ?shape, "no placement");
            return Ok(false);
        };
        place(root, &target.path, shape, &target.order)?;
        Ok(true)
    }
}

#[async_trait]
impl PlacementStrategy for RulePlacementStrategy {
    async fn place_shapes(&self, context: &mut PlacementContext) -> PlacementResult<()> {
        let handlers: Vec<Arc<dyn PlacementHandler>> = self
            .handlers
            .iter()
            .cloned()
            .chain(context.scope.get_services(&PLACEMENT_HANDLER))
            .collect();

        let pending = std::mem::take(&mut context.shapes);
        let total = pending.len();
        for shape in pending {
            if !self.place_one(&handlers, &context.shape, &shape)? {
                context.shapes.push(shape);
            }
        }
        debug!(
            placed = total - context.shapes.len(),
            unplaced = context.shapes.len(),
            "placed shapes"
        );
        Ok(())
    }
}

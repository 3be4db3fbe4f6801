use hashbrown::HashMap;
use thiserror::Error;

use crate::{
    index::{Index, IndexVec},
    middle::entity::EntityId,
    simple_index,
};

simple_index! {
    pub struct ScopeId;
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    bindings: HashMap<String, EntityId>,
    in_loop: bool,
    function: Option<EntityId>,
    class: Option<EntityId>,
}

/// Settings for a new child scope. Anything left as `None` is inherited from
/// the enclosing scope.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildScope {
    pub in_loop: Option<bool>,
    pub function: Option<EntityId>,
    pub class: Option<EntityId>,
}

impl ChildScope {
    pub fn block() -> Self {
        Self::default()
    }

    pub fn looping() -> Self {
        Self {
            in_loop: Some(true),
            ..Self::default()
        }
    }

    /// Function bodies reset the loop flag
    pub fn function(function: EntityId) -> Self {
        Self {
            in_loop: Some(false),
            function: Some(function),
            class: None,
        }
    }

    pub fn class(class: EntityId) -> Self {
        Self {
            class: Some(class),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identifier `{0}` already declared in this scope")]
pub struct AlreadyDeclared(pub String);

/// Arena of scope records. Scopes are entered and exited in LIFO order, so
/// exiting simply pops the innermost record.
#[derive(Debug)]
pub struct Scopes {
    scopes: IndexVec<ScopeId, Scope>,
}

impl Scopes {
    /// Creates a root scope holding the given bindings
    pub fn new(root_bindings: impl IntoIterator<Item = (String, EntityId)>) -> Self {
        let mut scopes = IndexVec::new();

        scopes.push(Scope {
            parent: None,
            bindings: root_bindings.into_iter().collect(),
            in_loop: false,
            function: None,
            class: None,
        });

        Self { scopes }
    }

    fn current_id(&self) -> ScopeId {
        ScopeId::new(self.scopes.len() - 1)
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.current_id()]
    }

    /// Looks a name up in the innermost scope, then each enclosing scope
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        let mut scope = Some(self.current_id());

        while let Some(id) = scope {
            let record = &self.scopes[id];

            if let Some(entity) = record.bindings.get(name) {
                return Some(*entity);
            }

            scope = record.parent;
        }

        None
    }

    /// Binds a name in the innermost scope. Shadowing names from enclosing
    /// scopes is allowed.
    pub fn declare(&mut self, name: &str, entity: EntityId) -> Result<(), AlreadyDeclared> {
        let id = self.current_id();
        let bindings = &mut self.scopes[id].bindings;

        if bindings.contains_key(name) {
            return Err(AlreadyDeclared(name.to_string()));
        }

        bindings.insert(name.to_string(), entity);
        Ok(())
    }

    pub fn enter(&mut self, child: ChildScope) {
        let parent = self.current();

        let scope = Scope {
            parent: Some(self.current_id()),
            bindings: HashMap::new(),
            in_loop: child.in_loop.unwrap_or(parent.in_loop),
            function: child.function.or(parent.function),
            class: child.class.or(parent.class),
        };

        self.scopes.push(scope);
    }

    pub fn exit(&mut self) {
        assert!(
            self.scopes.len() > 1,
            "Attempted to exit the root scope"
        );

        self.scopes.pop();
    }

    pub fn in_loop(&self) -> bool {
        self.current().in_loop
    }

    pub fn function(&self) -> Option<EntityId> {
        self.current().function
    }

    pub fn class(&self) -> Option<EntityId> {
        self.current().class
    }
}

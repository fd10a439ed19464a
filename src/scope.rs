use std::collections::HashMap;
use std::rc::Rc;

/// An arena of lexical scopes. Scopes are records addressed by [`ScopeId`]
/// and linked to their parent by index, so there are no reference cycles
/// and the whole chain is dropped with the arena. The type checker binds
/// types, the IR generator binds virtual registers and the interpreter
/// binds values, all through the same container.
pub struct ScopeArena<V> {
    scopes: Vec<Scope<V>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScopeId(u32);

struct Scope<V> {
    bindings: HashMap<Rc<str>, V>,
    parent: Option<ScopeId>,
}

impl<V> ScopeArena<V> {
    pub fn new() -> ScopeArena<V> {
        ScopeArena { scopes: Vec::new() }
    }

    /// Opens a new scope. `parent` is `None` only for the root.
    pub fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("scope arena overflow"));
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent,
        });
        id
    }

    /// Binds `name` in `scope`, returning the previous binding of that
    /// exact scope, if any.
    pub fn insert(&mut self, scope: ScopeId, name: Rc<str>, value: V) -> Option<V> {
        self.scopes[scope.0 as usize].bindings.insert(name, value)
    }

    /// Whether `name` is bound in `scope` itself, ignoring parents.
    pub fn contains_locally(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope.0 as usize].bindings.contains_key(name)
    }

    /// Looks `name` up through the parent chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&V> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.0 as usize];
            if let Some(value) = scope.bindings.get(name) {
                return Some(value);
            }
            current = scope.parent;
        }
        None
    }

    /// The number of live scopes. Pair with [`pop_to`] to tear down every
    /// scope opened after a given point.
    ///
    /// [`pop_to`]: ScopeArena::pop_to
    pub fn checkpoint(&self) -> usize {
        self.scopes.len()
    }

    /// Drops every scope opened since `mark` was taken. Ids handed out
    /// after the checkpoint become invalid; callers rely on evaluation
    /// being strictly nested.
    pub fn pop_to(&mut self, mark: usize) {
        self.scopes.truncate(mark);
    }

    /// Mutable chain lookup, used for assignment.
    pub fn lookup_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut V> {
        let mut current = Some(scope);
        let mut found = None;
        while let Some(id) = current {
            let scope = &self.scopes[id.0 as usize];
            if scope.bindings.contains_key(name) {
                found = Some(id);
                break;
            }
            current = scope.parent;
        }
        let id = found?;
        self.scopes[id.0 as usize].bindings.get_mut(name)
    }
}

impl<V> Default for ScopeArena<V> {
    fn default() -> Self {
        ScopeArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_lookup_and_shadowing() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        let inner = arena.push(Some(root));

        arena.insert(root, "x".into(), 1);
        arena.insert(root, "y".into(), 2);
        arena.insert(inner, "x".into(), 10);

        assert_eq!(arena.lookup(inner, "x"), Some(&10));
        assert_eq!(arena.lookup(inner, "y"), Some(&2));
        assert_eq!(arena.lookup(root, "x"), Some(&1));
        assert_eq!(arena.lookup(inner, "z"), None);

        assert!(arena.contains_locally(inner, "x"));
        assert!(!arena.contains_locally(inner, "y"));
    }

    #[test]
    fn sibling_scopes_are_independent() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        let a = arena.push(Some(root));
        let b = arena.push(Some(root));

        arena.insert(a, "x".into(), 1);
        assert_eq!(arena.lookup(a, "x"), Some(&1));
        assert_eq!(arena.lookup(b, "x"), None);
    }

    #[test]
    fn pop_to_discards_nested_scopes() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        arena.insert(root, "x".into(), 1);

        let mark = arena.checkpoint();
        let inner = arena.push(Some(root));
        arena.insert(inner, "y".into(), 2);
        arena.pop_to(mark);

        assert_eq!(arena.checkpoint(), 1);
        assert_eq!(arena.lookup(root, "x"), Some(&1));
    }

    #[test]
    fn assignment_walks_the_chain() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None);
        let inner = arena.push(Some(root));

        arena.insert(root, "x".into(), 1);
        *arena.lookup_mut(inner, "x").unwrap() = 5;
        assert_eq!(arena.lookup(root, "x"), Some(&5));
        assert!(arena.lookup_mut(inner, "missing").is_none());
    }
}

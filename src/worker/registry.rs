//! State registry: worker-issued handles and free-order enforcement.

use std::collections::{HashMap, HashSet};

use crate::error::Error;

use super::message::{ContextHandle, ModelHandle};

/// Owner of every per-model and per-context state, keyed by small opaque
/// ids issued here (never native addresses). Generic over the stored state
/// so the bookkeeping is testable without a backend.
///
/// Field order matters: contexts are declared before models so registry
/// teardown releases every context before its model.
pub(crate) struct StateRegistry<M, C> {
    contexts: HashMap<u32, C>,
    context_owner: HashMap<u32, u32>,
    models: HashMap<u32, M>,
    contexts_for_model: HashMap<u32, HashSet<u32>>,
    next_model: u32,
    next_context: u32,
}

impl<M, C> StateRegistry<M, C> {
    pub fn new() -> Self {
        Self {
            contexts: HashMap::new(),
            context_owner: HashMap::new(),
            models: HashMap::new(),
            contexts_for_model: HashMap::new(),
            next_model: 1,
            next_context: 1,
        }
    }

    pub fn insert_model(&mut self, state: M) -> ModelHandle {
        let id = self.next_model;
        self.next_model += 1;
        self.models.insert(id, state);
        self.contexts_for_model.insert(id, HashSet::new());
        ModelHandle::from_raw(id)
    }

    pub fn model(&self, handle: ModelHandle) -> Result<&M, Error> {
        self.models
            .get(&handle.id())
            .ok_or_else(|| Error::UnknownHandle(format!("model {}", handle.id())))
    }

    /// Remove a model. Fails while any context still references it.
    pub fn remove_model(&mut self, handle: ModelHandle) -> Result<M, Error> {
        let count = self.contexts_for_model.get(&handle.id()).map_or(0, HashSet::len);
        if count > 0 {
            return Err(Error::HandleStillReferenced { count });
        }
        let state = self
            .models
            .remove(&handle.id())
            .ok_or_else(|| Error::UnknownHandle(format!("model {}", handle.id())))?;
        self.contexts_for_model.remove(&handle.id());
        Ok(state)
    }

    pub fn insert_context(&mut self, model: ModelHandle, state: C) -> Result<ContextHandle, Error> {
        if !self.models.contains_key(&model.id()) {
            return Err(Error::UnknownHandle(format!("model {}", model.id())));
        }
        let id = self.next_context;
        self.next_context += 1;
        self.contexts.insert(id, state);
        self.context_owner.insert(id, model.id());
        self.contexts_for_model.entry(model.id()).or_default().insert(id);
        Ok(ContextHandle::from_raw(id))
    }

    pub fn context_mut(&mut self, handle: ContextHandle) -> Result<&mut C, Error> {
        self.contexts
            .get_mut(&handle.id())
            .ok_or_else(|| Error::UnknownHandle(format!("context {}", handle.id())))
    }

    pub fn remove_context(&mut self, handle: ContextHandle) -> Result<C, Error> {
        let state = self
            .contexts
            .remove(&handle.id())
            .ok_or_else(|| Error::UnknownHandle(format!("context {}", handle.id())))?;
        if let Some(owner) = self.context_owner.remove(&handle.id()) {
            if let Some(siblings) = self.contexts_for_model.get_mut(&owner) {
                siblings.remove(&handle.id());
            }
        }
        Ok(state)
    }

    /// Borrow a context together with the model it belongs to.
    pub fn context_and_model(&mut self, handle: ContextHandle) -> Result<(&mut C, &M), Error> {
        let owner = *self
            .context_owner
            .get(&handle.id())
            .ok_or_else(|| Error::UnknownHandle(format!("context {}", handle.id())))?;
        let context = self
            .contexts
            .get_mut(&handle.id())
            .ok_or_else(|| Error::UnknownHandle(format!("context {}", handle.id())))?;
        let model = self
            .models
            .get(&owner)
            .ok_or_else(|| Error::UnknownHandle(format!("model {owner}")))?;
        Ok((context, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StateRegistry<(), ()> {
        StateRegistry::new()
    }

    #[test]
    fn handles_are_distinct_and_nonzero() {
        let mut reg = registry();
        let a = reg.insert_model(());
        let b = reg.insert_model(());
        assert_ne!(a, b);
        assert!(a.id() > 0);
    }

    #[test]
    fn free_order_is_enforced() {
        let mut reg = registry();
        let model = reg.insert_model(());
        let ctx = reg.insert_context(model, ()).unwrap();

        let err = reg.remove_model(model).unwrap_err();
        assert!(matches!(err, Error::HandleStillReferenced { count: 1 }));

        reg.remove_context(ctx).unwrap();
        reg.remove_model(model).unwrap();
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let mut reg = registry();
        assert!(matches!(
            reg.remove_model(ModelHandle::from_raw(9)),
            Err(Error::UnknownHandle(_))
        ));
        assert!(matches!(
            reg.context_mut(ContextHandle::from_raw(9)),
            Err(Error::UnknownHandle(_))
        ));
        assert!(matches!(
            reg.insert_context(ModelHandle::from_raw(9), ()),
            Err(Error::UnknownHandle(_))
        ));
    }

    #[test]
    fn context_and_model_resolve_together() {
        let mut reg = registry();
        let model = reg.insert_model(());
        let ctx = reg.insert_context(model, ()).unwrap();
        assert!(reg.context_and_model(ctx).is_ok());

        reg.remove_context(ctx).unwrap();
        assert!(reg.context_and_model(ctx).is_err());
    }

    #[test]
    fn freed_model_id_is_not_reused() {
        let mut reg = registry();
        let a = reg.insert_model(());
        reg.remove_model(a).unwrap();
        let b = reg.insert_model(());
        assert_ne!(a, b);
    }
}

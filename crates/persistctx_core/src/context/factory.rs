//! Per-type entity factories backing `create_entity`.

use crate::model::entity::Entity;
use std::any::{Any, TypeId};
use std::collections::HashMap;

type Factory = Box<dyn Fn() -> Box<dyn Any>>;

#[derive(Default)]
pub(crate) struct EntityFactories {
    factories: HashMap<TypeId, Factory>,
}

impl EntityFactories {
    pub(crate) fn register<T: Entity>(&mut self, factory: impl Fn() -> T + 'static) {
        self.factories.insert(
            TypeId::of::<T>(),
            Box::new(move || Box::new(factory()) as Box<dyn Any>),
        );
    }

    pub(crate) fn create<T: Entity>(&self) -> Option<T> {
        let factory = self.factories.get(&TypeId::of::<T>())?;
        factory().downcast::<T>().ok().map(|boxed| *boxed)
    }
}

use {crate::module::Module, model::ModuleKind, std::{collections::HashMap, sync::Arc}};

/// Looks up the one `Module` instance for a given `ModuleKind`. Modules are
/// stateless w.r.t. any individual tenant or send-config, so one instance
/// per kind is shared by every chunk the processor handles.
pub struct ModuleRegistry {
    modules: HashMap<ModuleKind, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }

    pub fn get(&self, kind: ModuleKind) -> Option<Arc<dyn Module>> {
        self.modules.get(&kind).cloned()
    }
}

#[derive(Default)]
pub struct ModuleRegistryBuilder {
    modules: HashMap<ModuleKind, Arc<dyn Module>>,
}

impl ModuleRegistryBuilder {
    pub fn register(mut self, kind: ModuleKind, module: Arc<dyn Module>) -> Self {
        self.modules.insert(kind, module);
        self
    }

    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry { modules: self.modules }
    }
}

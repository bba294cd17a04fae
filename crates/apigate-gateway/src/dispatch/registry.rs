//! Action name → module factory registry.

use apigate_kernel::gateway::{ApiModule, RegistryError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Creates a fresh module instance per request.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn ApiModule> + Send + Sync>;

/// Registry of API modules keyed by action name.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn ApiModule> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Instantiate the module registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<Box<dyn ApiModule>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigate_kernel::gateway::{ModuleContext, ModuleError};

    struct Named(&'static str);

    impl ApiModule for Named {
        fn module_name(&self) -> &str {
            self.0
        }

        fn execute(&self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_resolve() {
        let mut reg = ModuleRegistry::new();
        reg.register("ping", || Box::new(Named("ping"))).unwrap();
        assert_eq!(reg.resolve("ping").unwrap().module_name(), "ping");
        assert!(reg.resolve("unknown").is_none());
    }

    #[test]
    fn duplicate_register_returns_error() {
        let mut reg = ModuleRegistry::new();
        reg.register("ping", || Box::new(Named("ping"))).unwrap();
        assert_eq!(
            reg.register("ping", || Box::new(Named("ping"))),
            Err(RegistryError::DuplicateModule("ping".into()))
        );
    }

    #[test]
    fn empty_name_rejected() {
        let mut reg = ModuleRegistry::new();
        assert_eq!(
            reg.register("", || Box::new(Named("x"))),
            Err(RegistryError::EmptyName)
        );
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = ModuleRegistry::new();
        reg.register("siteinfo", || Box::new(Named("siteinfo"))).unwrap();
        reg.register("ping", || Box::new(Named("ping"))).unwrap();
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["ping", "siteinfo"]);
        assert_eq!(reg.len(), 2);
    }
}

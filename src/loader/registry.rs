//! In-memory test registry

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use super::Loader;
use crate::models::{ClassHooks, StageResult, Test, TestContext};

/// Loader over tests registered in code; the test path is ignored
#[derive(Clone, Debug, Default)]
pub struct Registry {
    tests: Vec<Test>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prebuilt test
    pub fn register(&mut self, test: Test) -> &mut Self {
        self.tests.push(test);
        self
    }

    /// Start registering tests of a class
    pub fn class(&mut self, name: impl Into<String>) -> ClassBuilder<'_> {
        ClassBuilder {
            registry: self,
            name: name.into(),
            hooks: Arc::new(ClassHooks::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }
}

impl Loader for Registry {
    fn load(&self, _path: &Path) -> Result<Vec<Test>> {
        Ok(self.tests.clone())
    }
}

/// Registers tests sharing one class name and one set of class hooks.
///
/// Set hooks before adding tests; tests added earlier keep the hooks they were added with.
pub struct ClassBuilder<'a> {
    registry: &'a mut Registry,
    name: String,
    hooks: Arc<ClassHooks>,
}

impl ClassBuilder<'_> {
    pub fn hooks(mut self, hooks: ClassHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestContext) -> StageResult + Send + Sync + 'static,
    {
        let test = Test::new(self.name.clone(), name, body).with_hooks(Arc::clone(&self.hooks));
        self.registry.tests.push(test);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_register_classes() {
        let mut registry = Registry::new();
        registry
            .class("Cart")
            .hooks(ClassHooks::new().before_each(|_| Ok(Value::Null)))
            .test("add", |_| Ok(Value::Null))
            .test("remove", |_| Ok(Value::Null));
        registry.class("Login").test("ok", |_| Ok(Value::Null));

        let tests = registry.load(Path::new("ignored")).unwrap();
        let names: Vec<_> = tests.iter().map(|t| t.properties().to_string()).collect();
        assert_eq!(names, vec!["Cart::add", "Cart::remove", "Login::ok"]);
        assert!(tests[0].before_each().is_some());
        assert!(tests[2].before_each().is_none());
        assert_eq!(registry.len(), 3);
    }
}

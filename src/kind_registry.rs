//! Kind Registry (spec §4.1): a process-wide mapping from string kind to a
//! decoder factory, one registry each for sources, auth services, and
//! tools.
//!
//! Per the design note in §9, registration is an explicit builder rather
//! than init-time side effects: each backend module exposes a kind string
//! and a factory function, and `main` registers a fixed list of them.
//! Registering the same kind twice is fatal — caught before startup
//! continues, never silently overwritten.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A deferred YAML decoder: still-undecoded catalog body for one document.
pub type RawBody = serde_yaml::Value;

/// Factory signature shared by all three kind registries: take the raw,
/// not-yet-typed document body and strict-decode it into the kind's
/// specific config type, boxed behind the registry's trait object `T`.
pub type Factory<T> = fn(RawBody) -> Result<Box<T>>;

/// A kind → factory registry for one config trait object `T`.
pub struct KindRegistry<T: ?Sized> {
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized> KindRegistry<T> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `kind`'s factory. Fatal (panics) on duplicate registration
    /// — misconfiguration of the binary itself, not the catalog, so it is
    /// caught before the process can start serving (§4.1, §8 "Duplicate
    /// kind registration").
    pub fn register(&mut self, kind: &str, factory: Factory<T>) {
        if self.factories.insert(kind.to_string(), factory).is_some() {
            panic!("duplicate kind registration: `{kind}`");
        }
    }

    /// Decode `body` via `kind`'s registered factory.
    pub fn decode(&self, kind: &str, body: RawBody) -> Result<Box<T>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::Config(format!("unknown kind `{kind}`")))?;
        factory(body)
    }

    /// Whether `kind` has a registered factory.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

impl<T: ?Sized> Default for KindRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Strict-decode `body` into `D`, rejecting unknown fields, wrapping the
/// result for the registry's factory signature. `D` must derive
/// `#[serde(deny_unknown_fields)]` so the loader's "strict decoding"
/// invariant (§6.1, §8) holds uniformly across kinds.
pub fn strict_decode<D: serde::de::DeserializeOwned>(body: RawBody) -> Result<D> {
    serde_yaml::from_value(body).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Dummy {
        fn tag(&self) -> &str;
    }

    struct A;
    impl Dummy for A {
        fn tag(&self) -> &str {
            "a"
        }
    }

    fn make_a(_body: RawBody) -> Result<Box<dyn Dummy>> {
        Ok(Box::new(A))
    }

    #[test]
    fn decode_dispatches_to_registered_factory() {
        let mut reg: KindRegistry<dyn Dummy> = KindRegistry::new();
        reg.register("a", make_a);
        let decoded = reg.decode("a", serde_yaml::Value::Null).unwrap();
        assert_eq!(decoded.tag(), "a");
    }

    #[test]
    fn decode_unknown_kind_is_config_error() {
        let reg: KindRegistry<dyn Dummy> = KindRegistry::new();
        let err = reg.decode("ghost", serde_yaml::Value::Null).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[should_panic(expected = "duplicate kind registration")]
    fn duplicate_registration_is_fatal() {
        let mut reg: KindRegistry<dyn Dummy> = KindRegistry::new();
        reg.register("a", make_a);
        reg.register("a", make_a);
    }
}

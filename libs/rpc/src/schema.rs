use std::any::type_name;
use std::collections::HashSet;

/// Identity of one method: name plus ordered parameter-type descriptors.
///
/// Descriptors come from `std::any::type_name`, so client and server must be
/// built against the same argument types with the same toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub name: String,
    pub param_types: Vec<String>,
}

impl MethodKey {
    pub fn new(name: impl Into<String>, param_types: Vec<String>) -> Self {
        Self {
            name: name.into(),
            param_types,
        }
    }

    pub fn arity0(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn arity1<A1>(name: impl Into<String>) -> Self {
        Self::new(name, vec![type_name::<A1>().to_string()])
    }

    pub fn arity2<A1, A2>(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vec![type_name::<A1>().to_string(), type_name::<A2>().to_string()],
        )
    }

    pub fn arity3<A1, A2, A3>(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vec![
                type_name::<A1>().to_string(),
                type_name::<A2>().to_string(),
                type_name::<A3>().to_string(),
            ],
        )
    }
}

/// Client-side description of a service interface: its canonical identity and
/// the set of methods it declares.
///
/// The proxy consults the schema before any network traffic, so a call to an
/// undeclared method fails fast without a round trip. Declaring methods here
/// with the same `arityN` helpers the server-side dispatcher uses keeps the
/// two from drifting.
#[derive(Debug, Clone)]
pub struct Schema {
    service: String,
    methods: HashSet<MethodKey>,
}

impl Schema {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            methods: HashSet::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Declare a niladic method.
    pub fn method0(mut self, name: &str) -> Self {
        self.methods.insert(MethodKey::arity0(name));
        self
    }

    /// Declare a one-argument method.
    pub fn method1<A1>(mut self, name: &str) -> Self {
        self.methods.insert(MethodKey::arity1::<A1>(name));
        self
    }

    /// Declare a two-argument method.
    pub fn method2<A1, A2>(mut self, name: &str) -> Self {
        self.methods.insert(MethodKey::arity2::<A1, A2>(name));
        self
    }

    /// Declare a three-argument method.
    pub fn method3<A1, A2, A3>(mut self, name: &str) -> Self {
        self.methods.insert(MethodKey::arity3::<A1, A2, A3>(name));
        self
    }

    pub fn declares(&self, key: &MethodKey) -> bool {
        self.methods.contains(key)
    }
}

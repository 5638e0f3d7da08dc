use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::call::{Call, Fault};
use crate::schema::MethodKey;

type Handler = Box<dyn Fn(&[Vec<u8>]) -> Result<Vec<u8>, Fault> + Send + Sync>;

/// Server-side dispatch table for one service interface.
///
/// Built once at registration time: each `methodN` call binds a typed handler
/// closure (capturing the owned implementation) under a method key, replacing
/// runtime reflection with an explicit table keyed by name and parameter
/// signature.
pub struct ServiceDispatcher {
    service: String,
    table: HashMap<MethodKey, Handler>,
}

impl ServiceDispatcher {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            table: HashMap::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Bind a niladic method.
    pub fn method0<R, F>(mut self, name: &str, f: F) -> Self
    where
        R: Serialize,
        F: Fn() -> Result<R, Fault> + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(move |args| {
            if !args.is_empty() {
                return Err(arity_mismatch(0, args.len()));
            }
            encode_return(&f()?)
        });
        self.bind(MethodKey::arity0(name), handler);
        self
    }

    /// Bind a one-argument method.
    pub fn method1<A1, R, F>(mut self, name: &str, f: F) -> Self
    where
        A1: DeserializeOwned,
        R: Serialize,
        F: Fn(A1) -> Result<R, Fault> + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(move |args| {
            let [a1] = args else {
                return Err(arity_mismatch(1, args.len()));
            };
            encode_return(&f(decode_arg(0, a1)?)?)
        });
        self.bind(MethodKey::arity1::<A1>(name), handler);
        self
    }

    /// Bind a two-argument method.
    pub fn method2<A1, A2, R, F>(mut self, name: &str, f: F) -> Self
    where
        A1: DeserializeOwned,
        A2: DeserializeOwned,
        R: Serialize,
        F: Fn(A1, A2) -> Result<R, Fault> + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(move |args| {
            let [a1, a2] = args else {
                return Err(arity_mismatch(2, args.len()));
            };
            encode_return(&f(decode_arg(0, a1)?, decode_arg(1, a2)?)?)
        });
        self.bind(MethodKey::arity2::<A1, A2>(name), handler);
        self
    }

    /// Bind a three-argument method.
    pub fn method3<A1, A2, A3, R, F>(mut self, name: &str, f: F) -> Self
    where
        A1: DeserializeOwned,
        A2: DeserializeOwned,
        A3: DeserializeOwned,
        R: Serialize,
        F: Fn(A1, A2, A3) -> Result<R, Fault> + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(move |args| {
            let [a1, a2, a3] = args else {
                return Err(arity_mismatch(3, args.len()));
            };
            encode_return(&f(decode_arg(0, a1)?, decode_arg(1, a2)?, decode_arg(2, a3)?)?)
        });
        self.bind(MethodKey::arity3::<A1, A2, A3>(name), handler);
        self
    }

    // First binding of a key wins, same as service registration.
    fn bind(&mut self, key: MethodKey, handler: Handler) {
        self.table.entry(key).or_insert(handler);
    }

    /// Resolve and run the method named by `call`, attaching the outcome.
    ///
    /// Never propagates: a missing method, undecodable arguments, a handler
    /// fault, or a handler panic all end up as `call.fault`.
    pub fn invoke(&self, call: &mut Call) {
        let key = MethodKey::new(call.method.clone(), call.param_types.clone());
        let Some(handler) = self.table.get(&key) else {
            call.fault = Some(Fault::method_not_found(format!(
                "{}.{}({})",
                self.service,
                call.method,
                call.param_types.join(", ")
            )));
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(&call.args))) {
            Ok(Ok(bytes)) => call.result = Some(bytes),
            Ok(Err(fault)) => call.fault = Some(fault),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                warn!(service = %self.service, method = %call.method, %message, "handler panicked");
                call.fault = Some(Fault::handler(message));
            }
        }
    }
}

fn arity_mismatch(expected: usize, got: usize) -> Fault {
    Fault::bad_arguments(format!("expected {expected} arguments, got {got}"))
}

fn decode_arg<T: DeserializeOwned>(position: usize, bytes: &[u8]) -> Result<T, Fault> {
    bincode::deserialize(bytes)
        .map_err(|e| Fault::bad_arguments(format!("argument {position}: {e}")))
}

fn encode_return<T: Serialize>(value: &T) -> Result<Vec<u8>, Fault> {
    bincode::serialize(value).map_err(|e| Fault::handler(format!("return value: {e}")))
}

/// Map from interface identity to its one bound dispatcher.
///
/// Populated before the server starts and shared read-only across connection
/// tasks afterwards.
#[derive(Default)]
pub struct Registry {
    services: HashMap<String, ServiceDispatcher>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a dispatcher under its interface identity.
    ///
    /// Registration is first-wins: a second dispatcher for the same identity
    /// is dropped, not swapped in. Returns whether the binding took effect.
    pub fn register(&mut self, dispatcher: ServiceDispatcher) -> bool {
        match self.services.entry(dispatcher.service().to_string()) {
            Entry::Occupied(entry) => {
                debug!(service = %entry.key(), "service already registered, ignoring");
                false
            }
            Entry::Vacant(entry) => {
                debug!(service = %entry.key(), "service registered");
                entry.insert(dispatcher);
                true
            }
        }
    }

    /// Dispatch one received call against the registered services.
    ///
    /// An unregistered service leaves the call untouched (neither result nor
    /// fault); the client side turns that into an explicit error.
    pub fn dispatch(&self, call: &mut Call) {
        match self.services.get(&call.service) {
            Some(dispatcher) => dispatcher.invoke(call),
            None => {
                warn!(service = %call.service, "call for unregistered service");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{encode_value, FaultKind};
    use crate::schema::MethodKey;

    fn echo_dispatcher() -> ServiceDispatcher {
        ServiceDispatcher::new("Echo").method1("echo", |s: String| Ok(s))
    }

    fn echo_call(payload: &str) -> Call {
        Call::new(
            "Echo",
            "echo",
            MethodKey::arity1::<String>("echo").param_types,
            vec![encode_value(&payload.to_string()).unwrap()],
        )
    }

    #[test]
    fn dispatch_attaches_result() {
        let mut registry = Registry::new();
        registry.register(echo_dispatcher());

        let mut call = echo_call("ping");
        registry.dispatch(&mut call);

        assert!(call.fault.is_none());
        let result: String = bincode::deserialize(&call.result.unwrap()).unwrap();
        assert_eq!(result, "ping");
    }

    #[test]
    fn unregistered_service_leaves_call_untouched() {
        let registry = Registry::new();
        let mut call = echo_call("ping");
        registry.dispatch(&mut call);
        assert!(!call.is_completed());
    }

    #[test]
    fn registration_is_first_wins() {
        let mut registry = Registry::new();
        assert!(registry.register(
            ServiceDispatcher::new("Echo").method1("echo", |s: String| Ok(s))
        ));
        assert!(!registry.register(
            ServiceDispatcher::new("Echo")
                .method1("echo", |_: String| Ok("usurper".to_string()))
        ));

        let mut call = echo_call("ping");
        registry.dispatch(&mut call);
        let result: String = bincode::deserialize(&call.result.unwrap()).unwrap();
        assert_eq!(result, "ping");
    }

    #[test]
    fn unknown_signature_is_method_not_found() {
        let mut registry = Registry::new();
        registry.register(echo_dispatcher());

        let mut call = Call::new(
            "Echo",
            "echo",
            MethodKey::arity1::<i64>("echo").param_types,
            vec![encode_value(&7i64).unwrap()],
        );
        registry.dispatch(&mut call);

        assert_eq!(call.fault.unwrap().kind, FaultKind::MethodNotFound);
        assert!(call.result.is_none());
    }

    #[test]
    fn handler_fault_is_attached() {
        let mut registry = Registry::new();
        registry.register(
            ServiceDispatcher::new("Echo")
                .method1("echo", |_: String| -> Result<String, Fault> {
                    Err(Fault::handler("refused"))
                }),
        );

        let mut call = echo_call("ping");
        registry.dispatch(&mut call);

        let fault = call.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::Handler);
        assert_eq!(fault.message, "refused");
    }

    #[test]
    fn handler_panic_is_contained() {
        let mut registry = Registry::new();
        registry.register(ServiceDispatcher::new("Echo").method1(
            "echo",
            |_: String| -> Result<String, Fault> { panic!("kaboom") },
        ));

        let mut call = echo_call("ping");
        registry.dispatch(&mut call);

        let fault = call.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::Handler);
        assert_eq!(fault.message, "kaboom");
    }
}

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::call::{decode_value, encode_value, Call};
use crate::client::{Connection, Timeouts};
use crate::error::{Error, Result};
use crate::schema::{MethodKey, Schema};

/// Client-side stand-in for a remote service.
///
/// Bound to one schema and one connection; every `callN` builds a fresh
/// envelope, round-trips it, and unpacks the outcome, so the remote call
/// reads like a local one at the call site. Calls to methods the schema does
/// not declare fail before any network traffic.
pub struct Proxy {
    schema: Schema,
    connection: Connection,
}

impl Proxy {
    /// Connect to `host:port` with no timeouts.
    pub async fn connect(schema: Schema, host: &str, port: u16) -> Result<Self> {
        Self::builder(schema).connect(host, port).await
    }

    pub fn builder(schema: Schema) -> ProxyBuilder {
        ProxyBuilder {
            schema,
            timeouts: Timeouts::default(),
        }
    }

    pub fn service(&self) -> &str {
        self.schema.service()
    }

    /// Invoke a niladic method.
    pub async fn call0<R>(&mut self, method: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        self.call(MethodKey::arity0(method), Vec::new()).await
    }

    /// Invoke a one-argument method.
    pub async fn call1<A1, R>(&mut self, method: &str, a1: A1) -> Result<R>
    where
        A1: Serialize,
        R: DeserializeOwned,
    {
        self.call(MethodKey::arity1::<A1>(method), vec![encode_value(&a1)?])
            .await
    }

    /// Invoke a two-argument method.
    pub async fn call2<A1, A2, R>(&mut self, method: &str, a1: A1, a2: A2) -> Result<R>
    where
        A1: Serialize,
        A2: Serialize,
        R: DeserializeOwned,
    {
        self.call(
            MethodKey::arity2::<A1, A2>(method),
            vec![encode_value(&a1)?, encode_value(&a2)?],
        )
        .await
    }

    /// Invoke a three-argument method.
    pub async fn call3<A1, A2, A3, R>(&mut self, method: &str, a1: A1, a2: A2, a3: A3) -> Result<R>
    where
        A1: Serialize,
        A2: Serialize,
        A3: Serialize,
        R: DeserializeOwned,
    {
        self.call(
            MethodKey::arity3::<A1, A2, A3>(method),
            vec![encode_value(&a1)?, encode_value(&a2)?, encode_value(&a3)?],
        )
        .await
    }

    async fn call<R: DeserializeOwned>(&mut self, key: MethodKey, args: Vec<Vec<u8>>) -> Result<R> {
        if !self.schema.declares(&key) {
            return Err(Error::UnknownMethod {
                service: self.schema.service().to_string(),
                method: key.name,
            });
        }

        let call = Call::new(self.schema.service(), key.name, key.param_types, args);
        let completed = self.connection.invoke(call).await?;

        if let Some(fault) = completed.fault {
            return Err(Error::Remote(fault));
        }
        match completed.result {
            Some(bytes) => decode_value(&bytes),
            // The server answered but had no implementation bound: an
            // explicit error, never a silent default.
            None => Err(Error::ServiceNotRegistered(
                self.schema.service().to_string(),
            )),
        }
    }
}

/// Builder threading timeouts into the proxy's connection.
pub struct ProxyBuilder {
    schema: Schema,
    timeouts: Timeouts,
}

impl ProxyBuilder {
    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.timeouts.connect = Some(limit);
        self
    }

    /// Bound the wait for each call's response.
    pub fn call_timeout(mut self, limit: Duration) -> Self {
        self.timeouts.call = Some(limit);
        self
    }

    pub async fn connect(self, host: &str, port: u16) -> Result<Proxy> {
        let connection = Connection::dial(host, port, self.timeouts).await?;
        Ok(Proxy {
            schema: self.schema,
            connection,
        })
    }
}

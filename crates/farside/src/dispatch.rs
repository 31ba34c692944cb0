//! # Method Dispatch
//!
//! Which methods of a type may be called remotely, and local callables that
//! forward to them.
//!
//! The method surface of a type is enumerated statically through
//! [`RemoteObject`] (usually via [`remote_object!`](crate::remote_object)).
//! Names starting with an underscore are private and never callable. The
//! resulting [`MethodTable`] is computed once per Rust type and shared by
//! every proxy of that type.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::LazyLock;

use dashmap::DashMap;
use serde::de::DeserializeOwned;

use farside_wire::CallArgs;
use farside_wire::Value;

use crate::proxy;
use crate::proxy::Inner;

/// A type whose instances can be hosted remotely.
pub trait RemoteObject: 'static {
    /// Name the server knows the type by.
    const TYPE_NAME: &'static str;
    /// Every method name of the type, public or not.
    const METHODS: &'static [&'static str];
}

/// Implements [`RemoteObject`] for a type.
///
/// ```
/// struct Counter;
/// farside::remote_object!(Counter, [increment, get, _reset]);
///
/// struct Room;
/// farside::remote_object!(Room => "chat.Room", [join, speak]);
/// ```
#[macro_export]
macro_rules! remote_object {
    ($ty:ident, [$($method:ident),* $(,)?]) => {
        $crate::remote_object!($ty => stringify!($ty), [$($method),*]);
    };
    ($ty:ty => $name:expr, [$($method:ident),* $(,)?]) => {
        impl $crate::dispatch::RemoteObject for $ty {
            const TYPE_NAME: &'static str = $name;
            const METHODS: &'static [&'static str] = &[$(stringify!($method)),*];
        }
    };
}

/// Whether `name` may be called remotely.
pub fn is_public(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('_')
}

/// The public method names of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTable {
    type_name: String,
    methods: BTreeSet<String>,
}

impl MethodTable {
    /// Builds a table, dropping private names.
    pub fn from_names<I, S>(type_name: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let methods = names
            .into_iter()
            .filter(|name| is_public(name.as_ref()))
            .map(|name| name.as_ref().to_string())
            .collect();
        Self {
            type_name: type_name.to_string(),
            methods,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

// keyed by Rust type; `TYPE_NAME` is only the name sent over the wire and
// may repeat across modules
static TABLES: LazyLock<DashMap<TypeId, Arc<MethodTable>>> = LazyLock::new(DashMap::new);

/// The shared method table of `T`, computed on first use.
pub fn table_of<T: RemoteObject>() -> Arc<MethodTable> {
    let entry = TABLES
        .entry(TypeId::of::<T>())
        .or_insert_with(|| Arc::new(MethodTable::from_names(T::TYPE_NAME, T::METHODS)));
    Arc::clone(entry.value())
}

/// A local callable bound to one validated method of one proxy.
///
/// Holds the proxy's shared state, so it stays usable after being moved into
/// another task and keeps an owned server alive while it exists.
#[derive(Clone)]
pub struct RemoteMethod {
    inner: Arc<Inner>,
    name: String,
}

impl RemoteMethod {
    pub(crate) fn new(inner: Arc<Inner>, name: String) -> Self {
        Self { inner, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwards to [`RemoteObjectProxy::invoke`](crate::RemoteObjectProxy::invoke).
    pub async fn call(&self, args: CallArgs) -> proxy::Result<Value> {
        self.inner.invoke(&self.name, args).await
    }

    /// Forwards and decodes the result into `R`.
    pub async fn call_as<R: DeserializeOwned>(&self, args: CallArgs) -> proxy::Result<R> {
        let value = self.call(args).await?;
        proxy::decode_value(value)
    }
}

impl std::fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("object_id", self.inner.object_id())
            .field("name", &self.name)
            .finish()
    }
}

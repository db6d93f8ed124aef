// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client operators: named backend computations with numbered pins.
//!
//! Connecting an input either latches a value on the backend or records a
//! lazy edge to another operator's output. Nothing runs until an output is
//! requested; the backend caches each output until an input changes.
//!
//! ```text
//! let a = Remote::create(&server, field_a).await?;
//! let add = Operator::new(&server, "add").await?;
//! add.connect(0, &a).await?;
//! add.connect(1, 2.5).await?;
//! let sum: Field = add.get_output(0).await?;
//! ```

pub mod math;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::backends::local::LocalOperatorFactory;
use crate::data::{
    Collection, DataType, Field, GenericDataContainer, MeshedRegion, ObjectId, PropertyField,
    Scoping, StringField, TimeFreqSupport, TypeSet, Value, ValueType,
};
use crate::errors::{DpfError, Result};
use crate::expect_reply;
use crate::observability::messages::operator::SpecificationCached;
use crate::observability::messages::StructuredLog;
use crate::protocol::{
    OperatorRequest, OperatorState, OperatorStats, PinSource, Reply, Request, Specification,
    Version,
};
use crate::remote::{adopt_output, ensure_self_contained, resolve_output, ObjectHandle, Remote};
use crate::server::Server;

/// Built-ins are shared by every server of a version; plug-in operators
/// are cached per session, since two sessions may load different plug-ins
/// under one alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SpecKey {
    version: Version,
    session: Option<u64>,
    name: String,
}

impl SpecKey {
    fn new(server: &Server, name: &str) -> Self {
        let session = (!LocalOperatorFactory::is_builtin(name)).then(|| server.serial());
        Self {
            version: server.version(),
            session,
            name: name.to_string(),
        }
    }
}

type SpecCache = RwLock<HashMap<SpecKey, Arc<Specification>>>;

static SPECIFICATIONS: OnceLock<SpecCache> = OnceLock::new();

fn spec_cache() -> &'static SpecCache {
    SPECIFICATIONS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// The specification of operator `name`, asked of the backend once per
/// backend version (once per session for plug-in operators) and kept for
/// the life of the process.
pub async fn specification(server: &Server, name: &str) -> Result<Arc<Specification>> {
    let key = SpecKey::new(server, name);
    if let Some(spec) = spec_cache()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Ok(spec.clone());
    }

    let reply = server
        .call(Request::Operator(OperatorRequest::Specification {
            name: name.to_string(),
        }))
        .await?;
    let spec = Arc::new(expect_reply!(reply, Reply::Specification(spec) => spec)?);

    let mut cache = spec_cache().write().unwrap_or_else(PoisonError::into_inner);
    let cached = cache.entry(key).or_insert_with(|| {
        SpecificationCached {
            operator: name,
            version: &server.version().to_string(),
        }
        .log();
        spec
    });
    Ok(cached.clone())
}

/// What can be connected to an input pin.
pub enum Input<'a> {
    /// A constant shipped to the backend and latched on the pin.
    Value(Value),
    /// An object already on the backend.
    Object(&'a ObjectHandle),
    /// A lazy edge from another operator's output.
    Output { operator: &'a Operator, pin: u32 },
    /// The operator itself as a value, for operators that drive others.
    OperatorRef(&'a Operator),
}

impl<'a> Input<'a> {
    pub fn operator_ref(operator: &'a Operator) -> Self {
        Input::OperatorRef(operator)
    }

    /// The pin source with only the server checked; whoever receives it
    /// checks the types of the pins it lands on. Constants may not smuggle
    /// object ids past that check.
    pub(crate) fn into_source(self, server: &Server) -> Result<PinSource> {
        Ok(match self {
            Input::Value(value) => {
                ensure_self_contained(&value)?;
                PinSource::Value(value)
            }
            Input::Object(handle) => {
                handle.ensure_on(server)?;
                PinSource::Object(handle.id())
            }
            Input::Output { operator, pin } => {
                operator.handle.ensure_on(server)?;
                PinSource::Output {
                    operator: operator.id(),
                    pin,
                }
            }
            Input::OperatorRef(operator) => {
                operator.handle.ensure_on(server)?;
                PinSource::Value(Value::Operator(operator.id()))
            }
        })
    }

    fn describe(&self) -> String {
        match self {
            Input::Value(value) => value.value_type().to_string(),
            Input::Object(handle) => handle.value_type().to_string(),
            Input::Output { operator, pin } => format!("{} output {pin}", operator.name()),
            Input::OperatorRef(_) => ValueType::Operator.to_string(),
        }
    }
}

macro_rules! input_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Input<'_> {
                fn from(value: $ty) -> Self {
                    Input::Value(value.into())
                }
            }
        )*
    };
}

input_from_value!(
    Value,
    i32,
    i64,
    f64,
    bool,
    &str,
    String,
    Vec<i64>,
    Vec<f64>,
    Scoping,
    Field,
    PropertyField,
    StringField,
    MeshedRegion,
    TimeFreqSupport,
    Collection<Field>,
    Collection<Scoping>,
    GenericDataContainer,
);

impl<'a> From<&'a ObjectHandle> for Input<'a> {
    fn from(handle: &'a ObjectHandle) -> Self {
        Input::Object(handle)
    }
}

impl<'a, T> From<&'a Remote<T>> for Input<'a>
where
    T: DataType,
{
    fn from(remote: &'a Remote<T>) -> Self {
        Input::Object(remote.handle())
    }
}

/// A backend operator instance.
pub struct Operator {
    handle: ObjectHandle,
    name: String,
    spec: Arc<Specification>,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("id", &self.handle.id())
            .finish()
    }
}

impl Operator {
    /// Instantiate operator `name` on `server`; `unknown-operator` if the
    /// backend has no such operator.
    pub async fn new(server: &Server, name: &str) -> Result<Self> {
        let reply = server
            .call(Request::Operator(OperatorRequest::Create {
                name: name.to_string(),
            }))
            .await?;
        let info = expect_reply!(reply, Reply::Object(info) => info)?;
        let handle = ObjectHandle::adopt(server, info);
        let spec = specification(server, name).await?;
        Ok(Self {
            handle,
            name: name.to_string(),
            spec,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ObjectId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    pub fn server(&self) -> Result<Server> {
        self.handle.server()
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    /// Lazy edge from output `pin` of this operator, for [`Operator::connect`].
    pub fn output_ref(&self, pin: u32) -> Input<'_> {
        Input::Output {
            operator: self,
            pin,
        }
    }

    async fn operator_request(&self, request: OperatorRequest) -> Result<Reply> {
        self.server()?.call(Request::Operator(request)).await
    }

    fn pin_source(&self, server: &Server, pin: u32, input: Input<'_>) -> Result<PinSource> {
        let accepted = self
            .spec
            .input_pin(pin)
            .map(|spec| spec.types)
            .ok_or_else(|| {
                DpfError::invalid_argument(format!("no input pin {pin}")).at(&self.name, Some(pin))
            })?;
        let mismatch = |got: &dyn fmt::Display| DpfError::pin_type_mismatch(&self.name, pin, accepted, got);

        match input {
            Input::Value(value) => {
                ensure_self_contained(&value)?;
                if !accepted.contains(value.value_type()) {
                    return Err(mismatch(&value.value_type()));
                }
                Ok(PinSource::Value(value))
            }
            Input::Object(handle) => {
                handle.ensure_on(server)?;
                if !accepted.contains(handle.value_type()) {
                    return Err(mismatch(&handle.value_type()));
                }
                Ok(PinSource::Object(handle.id()))
            }
            Input::Output {
                operator,
                pin: output,
            } => {
                operator.handle.ensure_on(server)?;
                let produced = operator
                    .spec
                    .output_pin(output)
                    .map(|spec| spec.types)
                    .ok_or_else(|| {
                        DpfError::invalid_argument(format!("no output pin {output}"))
                            .at(&operator.name, Some(output))
                    })?;
                if !accepted.intersects(produced) {
                    return Err(mismatch(&produced));
                }
                Ok(PinSource::Output {
                    operator: operator.id(),
                    pin: output,
                })
            }
            Input::OperatorRef(operator) => {
                operator.handle.ensure_on(server)?;
                if !accepted.contains(ValueType::Operator) {
                    return Err(mismatch(&ValueType::Operator));
                }
                Ok(PinSource::Value(Value::Operator(operator.id())))
            }
        }
    }

    /// Bind input `pin`, replacing any previous binding. The type is checked
    /// against the pin's accepted set before anything is sent.
    pub async fn connect<'a>(&self, pin: u32, input: impl Into<Input<'a>>) -> Result<()> {
        let server = self.server()?;
        let input = input.into();
        tracing::trace!(operator = %self.name, pin, input = %input.describe(), "connect");
        let source = self.pin_source(&server, pin, input)?;
        server
            .call(Request::Operator(OperatorRequest::Connect {
                operator: self.id(),
                pin,
                source,
            }))
            .await?;
        Ok(())
    }

    pub async fn disconnect(&self, pin: u32) -> Result<()> {
        self.operator_request(OperatorRequest::Disconnect {
            operator: self.id(),
            pin,
        })
        .await?;
        Ok(())
    }

    fn check_output(&self, pin: u32, expected: Option<ValueType>) -> Result<()> {
        let produced = self.spec.output_pin(pin).map(|spec| spec.types).ok_or_else(|| {
            DpfError::invalid_argument(format!("no output pin {pin}")).at(&self.name, Some(pin))
        })?;
        match expected {
            Some(expected) if !produced.contains(expected) => {
                Err(DpfError::type_mismatch(expected, produced).at(&self.name, Some(pin)))
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn raw_output(&self, pin: u32) -> Result<crate::protocol::OutputValue> {
        let reply = self
            .operator_request(OperatorRequest::Output {
                operator: self.id(),
                pin,
            })
            .await?;
        expect_reply!(reply, Reply::Output(output) => output)
    }

    /// Evaluate as needed and return output `pin` as whatever type it holds.
    pub async fn get_output_value(&self, pin: u32) -> Result<Value> {
        self.check_output(pin, None)?;
        let output = self.raw_output(pin).await?;
        resolve_output(&self.server()?, output).await
    }

    /// Evaluate as needed and return output `pin` as a `T`, fetched to the client.
    pub async fn get_output<T: DataType>(&self, pin: u32) -> Result<T> {
        self.check_output(pin, Some(T::VALUE_TYPE))?;
        let output = self.raw_output(pin).await?;
        resolve_output(&self.server()?, output)
            .await?
            .cast()
            .map_err(|err| err.at(&self.name, Some(pin)))
    }

    /// Evaluate as needed and keep output `pin` on the backend.
    pub async fn get_output_remote<T: DataType>(&self, pin: u32) -> Result<Remote<T>> {
        self.check_output(pin, Some(T::VALUE_TYPE))?;
        let output = self.raw_output(pin).await?;
        Remote::from_handle(adopt_output(&self.server()?, output).await?)
    }

    /// Evaluate every output now.
    pub async fn run(&self) -> Result<()> {
        self.operator_request(OperatorRequest::Run { operator: self.id() })
            .await?;
        Ok(())
    }

    /// Drop cached outputs (and any accumulated incremental state) here and downstream.
    pub async fn reset(&self) -> Result<()> {
        self.operator_request(OperatorRequest::Reset { operator: self.id() })
            .await?;
        Ok(())
    }

    pub async fn set_config(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if let Some(option) = self.spec.config_option(name) {
            if option.value_type() != value.value_type() {
                return Err(DpfError::type_mismatch(option.value_type(), value.value_type())
                    .at(&self.name, None));
            }
        }
        self.operator_request(OperatorRequest::SetConfig {
            operator: self.id(),
            name: name.to_string(),
            value,
        })
        .await?;
        Ok(())
    }

    pub async fn config(&self) -> Result<BTreeMap<String, Value>> {
        let reply = self
            .operator_request(OperatorRequest::Config { operator: self.id() })
            .await?;
        expect_reply!(reply, Reply::Config(config) => config)
    }

    pub async fn stats(&self) -> Result<OperatorStats> {
        let reply = self
            .operator_request(OperatorRequest::Stats { operator: self.id() })
            .await?;
        expect_reply!(reply, Reply::OperatorStats(stats) => stats)
    }

    pub async fn state(&self) -> Result<OperatorState> {
        Ok(self.stats().await?.state)
    }

    /// How many times the backend has run this operator.
    pub async fn evaluation_count(&self) -> Result<u64> {
        Ok(self.stats().await?.evaluations)
    }

    /// A new operator `name` wired exactly like this one.
    pub async fn clone_as(&self, name: &str) -> Result<Operator> {
        let server = self.server()?;
        let reply = server
            .call(Request::Operator(OperatorRequest::CloneWith {
                operator: self.id(),
                name: name.to_string(),
            }))
            .await?;
        let info = expect_reply!(reply, Reply::Object(info) => info)?;
        let handle = ObjectHandle::adopt(&server, info);
        let spec = specification(&server, name).await?;
        Ok(Operator {
            handle,
            name: name.to_string(),
            spec,
        })
    }

    /// Accepted types of input `pin`, if it exists.
    pub fn input_types(&self, pin: u32) -> Option<TypeSet> {
        self.spec.input_pin(pin).map(|spec| spec.types)
    }
}

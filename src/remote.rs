// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client handles to objects living in a backend session.
//!
//! An [`ObjectHandle`] owns one reference to a backend object and queues its
//! release when dropped. [`Remote<T>`] adds the static type and lazy,
//! server-side reads so large payloads never need to be fetched whole.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use tokio::sync::OnceCell;

use crate::data::{
    Collection, DataType, Field, GenericDataContainer, LabelSpace, ObjectId, PropertyField,
    Scoping, StringField, Value, ValueType,
};
use crate::errors::{DpfError, ErrorKind, Result};
use crate::expect_reply;
use crate::protocol::{DataInfo, DataRequest, ObjectInfo, ObjectRequest, OutputValue, Reply, Request};
use crate::server::{Server, WeakServer};

/// Values per `ReadChunk` round-trip when streaming a flat buffer.
pub const READ_CHUNK_LEN: usize = 1 << 16;

/// One reference to a backend object. Dropping it releases the reference
/// with the server's next call.
pub struct ObjectHandle {
    server: WeakServer,
    id: ObjectId,
    value_type: ValueType,
}

impl ObjectHandle {
    /// Take ownership of a reference the backend just handed out.
    pub(crate) fn adopt(server: &Server, info: ObjectInfo) -> Self {
        Self {
            server: server.downgrade(),
            id: info.id,
            value_type: info.value_type,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// The owning server, or `stale-reference` once it is gone.
    pub fn server(&self) -> Result<Server> {
        self.server.upgrade()
    }

    pub fn belongs_to(&self, server: &Server) -> bool {
        self.server.is(server)
    }

    /// Fail with `cross-server-reference` unless this object lives on `server`.
    pub fn ensure_on(&self, server: &Server) -> Result<()> {
        if self.belongs_to(server) {
            Ok(())
        } else {
            Err(DpfError::cross_server(format!("{} {}", self.value_type, self.id)))
        }
    }

    /// Ship `value` to `server`, whatever its type.
    pub async fn create(server: &Server, value: Value) -> Result<ObjectHandle> {
        ensure_self_contained(&value)?;
        let reply = server
            .call(Request::Object(ObjectRequest::Create { value }))
            .await?;
        let info = expect_reply!(reply, Reply::Object(info) => info)?;
        Ok(Self::adopt(server, info))
    }

    /// A second reference to the same backend object.
    pub async fn duplicate(&self) -> Result<ObjectHandle> {
        let server = self.server()?;
        server
            .call(Request::Object(ObjectRequest::AddRef { id: self.id }))
            .await?;
        Ok(Self {
            server: self.server.clone(),
            id: self.id,
            value_type: self.value_type,
        })
    }

    /// Copy the whole value to the client.
    pub async fn fetch(&self) -> Result<Value> {
        let reply = self
            .server()?
            .call(Request::Object(ObjectRequest::Fetch { id: self.id }))
            .await?;
        expect_reply!(reply, Reply::Value(value) => value)
    }

    /// Marshal the object into a self-describing blob.
    pub async fn to_blob(&self) -> Result<Vec<u8>> {
        let reply = self
            .server()?
            .call(Request::Object(ObjectRequest::Serialize { id: self.id }))
            .await?;
        expect_reply!(reply, Reply::Bytes(blob) => blob)
    }

    /// Unmarshal a blob from [`ObjectHandle::to_blob`] into a new object on `server`.
    pub async fn from_blob(server: &Server, blob: Vec<u8>) -> Result<ObjectHandle> {
        let reply = server
            .call(Request::Object(ObjectRequest::Deserialize { blob }))
            .await?;
        let info = expect_reply!(reply, Reply::Object(info) => info)?;
        Ok(Self::adopt(server, info))
    }

    /// Copy through the backend onto `target`, which may be another server.
    pub async fn deep_copy(&self, target: &Server) -> Result<ObjectHandle> {
        let blob = self.to_blob().await?;
        Self::from_blob(target, blob).await
    }

    /// Approximate memory held by the object on the backend.
    pub async fn byte_size(&self) -> Result<u64> {
        let reply = self
            .server()?
            .call(Request::Object(ObjectRequest::ByteSize { id: self.id }))
            .await?;
        expect_reply!(reply, Reply::Size(size) => size)
    }

    pub(crate) async fn data_request(&self, request: DataRequest) -> Result<Reply> {
        self.server()?.call(Request::Data(request)).await
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.server.release_later(self.id);
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("id", &self.id)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Refuse constants that carry bare operator or workflow ids. An id says
/// nothing about which server issued it, so such references must be passed
/// as the handle itself, where [`ObjectHandle::ensure_on`] applies.
pub(crate) fn ensure_self_contained(value: &Value) -> Result<()> {
    if value.has_object_refs() {
        return Err(DpfError::new(
            ErrorKind::CrossServerReference,
            format!(
                "{} carries a bare object id; connect the operator or workflow handle instead",
                value.value_type()
            ),
        ));
    }
    Ok(())
}

/// Turn an output reply into a client value, fetching it if it was left on
/// the backend. The temporary reference is released afterwards.
pub(crate) async fn resolve_output(server: &Server, output: OutputValue) -> Result<Value> {
    match output {
        OutputValue::Inline(value) => Ok(value),
        OutputValue::Object(info) => ObjectHandle::adopt(server, info).fetch().await,
    }
}

/// Turn an output reply into a backend handle, storing inline values first.
pub(crate) async fn adopt_output(server: &Server, output: OutputValue) -> Result<ObjectHandle> {
    match output {
        OutputValue::Object(info) => Ok(ObjectHandle::adopt(server, info)),
        OutputValue::Inline(value) => ObjectHandle::create(server, value).await,
    }
}

/// A typed handle to a `T` on the backend.
pub struct Remote<T> {
    handle: ObjectHandle,
    info: OnceCell<DataInfo>,
    property_types: OnceCell<BTreeMap<String, ValueType>>,
    _type: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Remote<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Remote").field(&self.handle).finish()
    }
}

impl<T: DataType> Remote<T> {
    /// Ship `value` to `server` and keep a handle to it.
    pub async fn create(server: &Server, value: T) -> Result<Self> {
        Self::from_handle(ObjectHandle::create(server, value.into()).await?)
    }

    /// Type an untyped handle; fails with `type-mismatch` if it holds something else.
    pub fn from_handle(handle: ObjectHandle) -> Result<Self> {
        if handle.value_type() != T::VALUE_TYPE {
            return Err(DpfError::type_mismatch(T::VALUE_TYPE, handle.value_type()));
        }
        Ok(Self {
            handle,
            info: OnceCell::new(),
            property_types: OnceCell::new(),
            _type: PhantomData,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    pub fn into_handle(self) -> ObjectHandle {
        self.handle
    }

    pub fn server(&self) -> Result<Server> {
        self.handle.server()
    }

    /// Summary fetched on first use and kept.
    pub async fn info(&self) -> Result<&DataInfo> {
        self.info
            .get_or_try_init(|| async {
                let reply = self
                    .handle
                    .data_request(DataRequest::Info { id: self.id() })
                    .await?;
                expect_reply!(reply, Reply::Info(info) => info)
            })
            .await
    }

    /// Entities, entries or properties, per [`DataInfo::len`].
    pub async fn len(&self) -> Result<usize> {
        Ok(self.info().await?.len)
    }

    pub async fn fetch(&self) -> Result<T> {
        self.handle.fetch().await?.cast()
    }

    pub async fn byte_size(&self) -> Result<u64> {
        self.handle.byte_size().await
    }

    pub async fn duplicate(&self) -> Result<Self> {
        Self::from_handle(self.handle.duplicate().await?)
    }

    pub async fn deep_copy(&self, target: &Server) -> Result<Self> {
        Self::from_handle(self.handle.deep_copy(target).await?)
    }

    pub async fn to_blob(&self) -> Result<Vec<u8>> {
        self.handle.to_blob().await
    }

    pub async fn from_blob(server: &Server, blob: Vec<u8>) -> Result<Self> {
        Self::from_handle(ObjectHandle::from_blob(server, blob).await?)
    }
}

/// Types whose per-entity data can be read without fetching the object.
pub trait EntityData: DataType {
    type Entity;

    fn entity_from(value: Value) -> Result<Self::Entity>;
}

impl EntityData for Field {
    type Entity = Vec<f64>;

    fn entity_from(value: Value) -> Result<Self::Entity> {
        value.cast()
    }
}

impl EntityData for PropertyField {
    type Entity = Vec<i64>;

    fn entity_from(value: Value) -> Result<Self::Entity> {
        value.cast()
    }
}

impl EntityData for StringField {
    type Entity = String;

    fn entity_from(value: Value) -> Result<Self::Entity> {
        value.cast()
    }
}

impl<T: EntityData> Remote<T> {
    /// Components of the entity at `index` in the scoping.
    pub async fn get_entity_data(&self, index: usize) -> Result<T::Entity> {
        let reply = self
            .handle
            .data_request(DataRequest::EntityData {
                id: self.id(),
                index,
            })
            .await?;
        T::entity_from(expect_reply!(reply, Reply::Value(value) => value)?)
    }

    /// Components of the entity with scoping id `entity_id`.
    pub async fn get_entity_data_by_id(&self, entity_id: i32) -> Result<T::Entity> {
        let reply = self
            .handle
            .data_request(DataRequest::EntityDataById {
                id: self.id(),
                entity_id,
            })
            .await?;
        T::entity_from(expect_reply!(reply, Reply::Value(value) => value)?)
    }
}

/// Types with a flat numeric buffer that can be streamed in chunks.
pub trait FlatData: DataType {
    type Item;

    fn chunk_from(value: Value) -> Result<Vec<Self::Item>>;
}

impl FlatData for Field {
    type Item = f64;

    fn chunk_from(value: Value) -> Result<Vec<f64>> {
        value.cast()
    }
}

impl FlatData for PropertyField {
    type Item = i64;

    fn chunk_from(value: Value) -> Result<Vec<i64>> {
        value.cast()
    }
}

impl FlatData for Scoping {
    type Item = i32;

    fn chunk_from(value: Value) -> Result<Vec<i32>> {
        value
            .cast::<Vec<i64>>()?
            .into_iter()
            .map(|id| {
                i32::try_from(id)
                    .map_err(|_| DpfError::transport(format!("scoping id {id} out of range")))
            })
            .collect()
    }
}

impl<T: FlatData> Remote<T> {
    /// The whole flat buffer, read `READ_CHUNK_LEN` values at a time.
    pub async fn data(&self) -> Result<Vec<T::Item>> {
        self.data_in_chunks(READ_CHUNK_LEN).await
    }

    pub async fn data_in_chunks(&self, chunk_len: usize) -> Result<Vec<T::Item>> {
        if chunk_len == 0 {
            return Err(DpfError::invalid_argument("chunk length must be positive"));
        }
        let total = self.info().await?.data_len;
        let mut data = Vec::with_capacity(total);
        while data.len() < total {
            let reply = self
                .handle
                .data_request(DataRequest::ReadChunk {
                    id: self.id(),
                    offset: data.len(),
                    len: chunk_len,
                })
                .await?;
            let chunk = T::chunk_from(expect_reply!(reply, Reply::Value(value) => value)?)?;
            if chunk.is_empty() {
                return Err(DpfError::transport(format!(
                    "buffer ended at {} of {total} values",
                    data.len()
                )));
            }
            data.extend(chunk);
        }
        Ok(data)
    }
}

impl Remote<Scoping> {
    pub async fn id_at(&self, index: usize) -> Result<i32> {
        let reply = self
            .handle
            .data_request(DataRequest::EntityData {
                id: self.id(),
                index,
            })
            .await?;
        let id = expect_reply!(reply, Reply::Value(Value::Int(id)) => id)?;
        i32::try_from(id).map_err(|_| DpfError::transport(format!("scoping id {id} out of range")))
    }

    pub async fn index_of(&self, entity_id: i32) -> Result<usize> {
        let reply = self
            .handle
            .data_request(DataRequest::EntityDataById {
                id: self.id(),
                entity_id,
            })
            .await?;
        let index = expect_reply!(reply, Reply::Value(Value::Int(index)) => index)?;
        usize::try_from(index).map_err(|_| DpfError::transport(format!("negative index {index}")))
    }
}

async fn collection_entries(handle: &ObjectHandle, partial: &LabelSpace) -> Result<Vec<ObjectHandle>> {
    let server = handle.server()?;
    let reply = server
        .call(Request::Data(DataRequest::CollectionQuery {
            id: handle.id(),
            partial: partial.clone(),
        }))
        .await?;
    let infos = expect_reply!(reply, Reply::Objects(infos) => infos)?;
    Ok(infos
        .into_iter()
        .map(|info| ObjectHandle::adopt(&server, info))
        .collect())
}

async fn collection_entry(handle: &ObjectHandle, label_space: &LabelSpace) -> Result<OutputValue> {
    let reply = handle
        .data_request(DataRequest::CollectionEntry {
            id: handle.id(),
            label_space: label_space.clone(),
        })
        .await?;
    expect_reply!(reply, Reply::Output(output) => output)
}

async fn label_scoping(handle: &ObjectHandle, label: &str) -> Result<Scoping> {
    let reply = handle
        .data_request(DataRequest::LabelScoping {
            id: handle.id(),
            label: label.to_string(),
        })
        .await?;
    expect_reply!(reply, Reply::Value(Value::Scoping(scoping)) => scoping)
}

impl<T> Remote<Collection<T>>
where
    T: DataType,
    Collection<T>: DataType,
{
    pub async fn labels(&self) -> Result<Vec<String>> {
        Ok(self.info().await?.labels.clone())
    }

    /// Every entry whose label space contains `partial`.
    pub async fn get_entries(&self, partial: &LabelSpace) -> Result<Vec<Remote<T>>> {
        collection_entries(&self.handle, partial)
            .await?
            .into_iter()
            .map(Remote::from_handle)
            .collect()
    }

    /// The one entry matching `label_space`; `invalid-argument` if none or several.
    pub async fn get_entry(&self, label_space: &LabelSpace) -> Result<Remote<T>> {
        let server = self.server()?;
        let output = collection_entry(&self.handle, label_space).await?;
        Remote::from_handle(adopt_output(&server, output).await?)
    }

    pub async fn get_available_ids_for_label(&self, label: &str) -> Result<Scoping> {
        label_scoping(&self.handle, label).await
    }
}

impl Remote<Collection<Value>> {
    pub async fn labels(&self) -> Result<Vec<String>> {
        Ok(self.info().await?.labels.clone())
    }

    pub async fn get_entries(&self, partial: &LabelSpace) -> Result<Vec<ObjectHandle>> {
        collection_entries(&self.handle, partial).await
    }

    /// The matching entry, fetched.
    pub async fn get_entry(&self, label_space: &LabelSpace) -> Result<Value> {
        let server = self.server()?;
        let output = collection_entry(&self.handle, label_space).await?;
        resolve_output(&server, output).await
    }

    pub async fn get_available_ids_for_label(&self, label: &str) -> Result<Scoping> {
        label_scoping(&self.handle, label).await
    }
}

impl Remote<GenericDataContainer> {
    /// Name → type of every property, read once and kept as a side table.
    pub async fn property_types(&self) -> Result<&BTreeMap<String, ValueType>> {
        self.property_types
            .get_or_try_init(|| async {
                let reply = self
                    .handle
                    .data_request(DataRequest::ContainerTypes { id: self.id() })
                    .await?;
                expect_reply!(reply, Reply::Types(types) => types)
            })
            .await
    }

    async fn property_output(&self, name: &str) -> Result<OutputValue> {
        if !self.property_types().await?.contains_key(name) {
            return Err(DpfError::invalid_argument(format!("no property '{name}'")));
        }
        let reply = self
            .handle
            .data_request(DataRequest::ContainerProperty {
                id: self.id(),
                name: name.to_string(),
            })
            .await?;
        expect_reply!(reply, Reply::Output(output) => output)
    }

    /// A property as whatever type the side table records for it.
    pub async fn get_property(&self, name: &str) -> Result<Value> {
        let output = self.property_output(name).await?;
        resolve_output(&self.server()?, output).await
    }

    /// A property as `U`; `type-mismatch` without a backend call if the side
    /// table says otherwise.
    pub async fn get_property_as<U: DataType>(&self, name: &str) -> Result<U> {
        self.expect_property_type(name, U::VALUE_TYPE).await?;
        self.get_property(name).await?.cast()
    }

    /// A bulky property left on the backend.
    pub async fn get_property_remote<U: DataType>(&self, name: &str) -> Result<Remote<U>> {
        self.expect_property_type(name, U::VALUE_TYPE).await?;
        let output = self.property_output(name).await?;
        Remote::from_handle(adopt_output(&self.server()?, output).await?)
    }

    async fn expect_property_type(&self, name: &str, expected: ValueType) -> Result<()> {
        match self.property_types().await?.get(name) {
            Some(actual) if *actual != expected => Err(DpfError::type_mismatch(expected, *actual)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::data::{Dimensionality, Location};

    async fn server() -> Server {
        Server::start(ServerConfig::in_process().dedicated()).await.unwrap()
    }

    fn vector_field(ids: Vec<i32>) -> Field {
        let data = ids.iter().flat_map(|&id| [id as f64, id as f64 * 10.0, -1.0]).collect();
        Field::new(Dimensionality::vector(3), Scoping::nodal(ids), data).unwrap()
    }

    #[tokio::test]
    async fn test_lazy_entity_reads() {
        let server = server().await;
        let field = Remote::create(&server, vector_field(vec![4, 8, 15])).await.unwrap();
        assert_eq!(field.len().await.unwrap(), 3);
        assert_eq!(field.info().await.unwrap().location, Some(Location::Nodal));
        assert_eq!(field.get_entity_data(1).await.unwrap(), vec![8.0, 80.0, -1.0]);
        assert_eq!(field.get_entity_data_by_id(15).await.unwrap(), vec![15.0, 150.0, -1.0]);
        let err = field.get_entity_data(3).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_data_streams_in_chunks() {
        let server = server().await;
        let ids: Vec<i32> = (1..=100).collect();
        let local = vector_field(ids.clone());
        let field = Remote::create(&server, local.clone()).await.unwrap();
        assert_eq!(field.data_in_chunks(7).await.unwrap(), local.data());
        assert_eq!(field.data().await.unwrap(), local.data());

        let scoping = Remote::create(&server, Scoping::nodal(ids)).await.unwrap();
        assert_eq!(scoping.data_in_chunks(9).await.unwrap().len(), 100);
        assert_eq!(scoping.id_at(4).await.unwrap(), 5);
        assert_eq!(scoping.index_of(5).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_dropped_handles_release_on_next_call() {
        let server = server().await;
        let field = Remote::create(&server, vector_field(vec![1])).await.unwrap();
        let copy = field.duplicate().await.unwrap();
        assert_eq!(server.stats().await.unwrap().live_objects, 1);
        drop(field);
        assert_eq!(copy.fetch().await.unwrap().len(), 1);
        drop(copy);
        assert_eq!(server.stats().await.unwrap().live_objects, 0);
    }

    #[tokio::test]
    async fn test_handles_go_stale_after_shutdown() {
        let server = server().await;
        let field = Remote::create(&server, vector_field(vec![1])).await.unwrap();
        server.shutdown().await.unwrap();
        let err = field.fetch().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::StaleReference);
    }

    #[tokio::test]
    async fn test_typed_handle_refuses_other_types() {
        let server = server().await;
        let scoping = Remote::create(&server, Scoping::nodal(vec![1])).await.unwrap();
        let err = Remote::<Field>::from_handle(scoping.into_handle()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_deep_copy_between_servers() {
        let source = server().await;
        let target = server().await;
        let local = vector_field(vec![2, 3]);
        let field = Remote::create(&source, local.clone()).await.unwrap();
        let copy = field.deep_copy(&target).await.unwrap();
        assert!(copy.handle().belongs_to(&target));
        assert!(copy.handle().ensure_on(&source).is_err());
        assert_eq!(copy.fetch().await.unwrap(), local);
    }

    #[tokio::test]
    async fn test_collection_queries() {
        let server = server().await;
        let mut fc = Collection::new(["time", "zone"]);
        for time in 1..=2 {
            for zone in 1..=2 {
                let label_space = LabelSpace::new().with("time", time).with("zone", zone);
                fc.add_entry(label_space, vector_field(vec![time * 10 + zone]))
                    .unwrap();
            }
        }
        let fc = Remote::create(&server, fc).await.unwrap();
        assert_eq!(fc.labels().await.unwrap(), vec!["time", "zone"]);

        let at_time_two = fc
            .get_entries(&LabelSpace::new().with("time", 2))
            .await
            .unwrap();
        assert_eq!(at_time_two.len(), 2);

        let entry = fc
            .get_entry(&LabelSpace::new().with("time", 1).with("zone", 2))
            .await
            .unwrap();
        assert_eq!(entry.get_entity_data(0).await.unwrap()[0], 12.0);

        let err = fc
            .get_entry(&LabelSpace::new().with("time", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let times = fc.get_available_ids_for_label("time").await.unwrap();
        assert_eq!(times.ids(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_container_properties_use_side_table() {
        let server = server().await;
        let container = GenericDataContainer::new()
            .with_property("count", 3i64)
            .with_property("field", vector_field(vec![7]));
        let container = Remote::create(&server, container).await.unwrap();

        let types = container.property_types().await.unwrap();
        assert_eq!(types.get("count"), Some(&ValueType::Int));
        assert_eq!(container.get_property("count").await.unwrap(), Value::Int(3));
        assert_eq!(container.get_property_as::<i64>("count").await.unwrap(), 3);

        let err = container.get_property_as::<f64>("count").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = container.get_property("missing").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let field = container.get_property_remote::<Field>("field").await.unwrap();
        assert_eq!(field.get_entity_data_by_id(7).await.unwrap(), vec![7.0, 70.0, -1.0]);
    }
}

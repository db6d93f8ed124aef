// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client scenarios run end to end over every transport.
//!
//! The same scenario bodies are driven through a dedicated in-process
//! server and through a loopback `dpf-server` service in both wire layouts.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::service::{spawn_local, ServiceHandle};
use super::Server;
use crate::config::{Protocol, ServerConfig};
use crate::data::{
    Collection, Dimensionality, Field, GenericDataContainer, LabelSpace, PropertyField, Scoping,
    StringField, Value, ValueType,
};
use crate::engine::{Engine, EngineOptions};
use crate::errors::ErrorKind;
use crate::incremental::{split_workflow_in_chunks, ChunkingOptions};
use crate::operator::{Input, Operator};
use crate::protocol::{OperatorRequest, OperatorState, Request};
use crate::remote::{ObjectHandle, Remote};
use crate::traits::Backend;
use crate::workflow::Workflow;

async fn in_process() -> Server {
    Server::start(ServerConfig::in_process().dedicated()).await.unwrap()
}

async fn grpc_with(protocol: Protocol, options: EngineOptions) -> (Server, ServiceHandle) {
    let service = spawn_local(Arc::new(Engine::new(options))).await.unwrap();
    let config = ServerConfig::grpc("127.0.0.1", service.address.port()).with_protocol(protocol);
    let backend = super::grpc::GrpcBackend::connect_when_ready(
        &config.address,
        config.port,
        super::layout_of(protocol),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    let server = Server::with_backend(Arc::new(backend), config, None).await.unwrap();
    (server, service)
}

async fn grpc(protocol: Protocol) -> (Server, ServiceHandle) {
    grpc_with(protocol, EngineOptions::default()).await
}

fn vector_field(ids: Vec<i32>, data: Vec<f64>) -> Field {
    Field::new(Dimensionality::vector_3d(), Scoping::nodal(ids), data).unwrap()
}

fn scalar_field(values: &[f64]) -> Field {
    let ids = (1..=values.len() as i32).collect();
    Field::scalar(Scoping::nodal(ids), values.to_vec()).unwrap()
}

async fn add_two_fields(server: &Server) {
    let f1 = vector_field(vec![1, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let f2 = vector_field(vec![1, 2], vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
    let op = Operator::new(server, "add").await.unwrap();
    op.connect(0, f1).await.unwrap();
    op.connect(1, f2).await.unwrap();
    let out: Field = op.get_output(0).await.unwrap();
    assert_eq!(out.scoping().ids(), &[1, 2]);
    assert_eq!(out.data(), &[11.0, 22.0, 33.0, 44.0, 55.0, 66.0]);
}

async fn partial_collection_query(server: &Server) {
    let f_a = scalar_field(&[1.0]);
    let f_b = scalar_field(&[2.0]);
    let f_c = scalar_field(&[3.0]);
    let mut local = Collection::new(["time", "body"]);
    local.add_entry(LabelSpace::new().with("time", 1).with("body", 10), f_a.clone()).unwrap();
    local.add_entry(LabelSpace::new().with("time", 1).with("body", 20), f_b.clone()).unwrap();
    local.add_entry(LabelSpace::new().with("time", 2).with("body", 10), f_c.clone()).unwrap();
    let remote = Remote::create(server, local).await.unwrap();

    let mut by_time = Vec::new();
    for entry in remote.get_entries(&LabelSpace::new().with("time", 1)).await.unwrap() {
        by_time.push(entry.fetch().await.unwrap());
    }
    assert_eq!(by_time, vec![f_a.clone(), f_b]);

    let mut by_body = Vec::new();
    for entry in remote.get_entries(&LabelSpace::new().with("body", 10)).await.unwrap() {
        by_body.push(entry.fetch().await.unwrap());
    }
    assert_eq!(by_body, vec![f_a, f_c.clone()]);

    let exact = remote
        .get_entry(&LabelSpace::new().with("time", 2).with("body", 10))
        .await
        .unwrap();
    assert_eq!(exact.fetch().await.unwrap(), f_c);

    let err = remote.get_entry(&LabelSpace::new().with("time", 1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

async fn scoping_round_trip(server: &Server) {
    let local = Scoping::nodal(vec![7, 3, 9, 11]);
    assert_eq!(local.index(9), Some(2));
    assert_eq!(local.id(0), Some(7));

    let remote = Remote::create(server, local).await.unwrap();
    assert_eq!(remote.index_of(9).await.unwrap(), 2);
    assert_eq!(remote.id_at(0).await.unwrap(), 7);
}

async fn lazy_recompute_after_reconnect(server: &Server) {
    let a = Operator::new(server, "scale").await.unwrap();
    a.connect(0, scalar_field(&[1.0, 2.0])).await.unwrap();
    a.connect(1, 2.0).await.unwrap();
    let b = Operator::new(server, "scale").await.unwrap();
    b.connect(0, a.output_ref(0)).await.unwrap();
    b.connect(1, 10.0).await.unwrap();

    let first: Field = b.get_output(0).await.unwrap();
    assert_eq!(first.data(), &[20.0, 40.0]);
    assert_eq!((a.evaluation_count().await.unwrap(), b.evaluation_count().await.unwrap()), (1, 1));

    let _: Field = b.get_output(0).await.unwrap();
    assert_eq!((a.evaluation_count().await.unwrap(), b.evaluation_count().await.unwrap()), (1, 1));

    a.connect(1, 3.0).await.unwrap();
    let third: Field = b.get_output(0).await.unwrap();
    assert_eq!(third.data(), &[30.0, 60.0]);
    assert_eq!((a.evaluation_count().await.unwrap(), b.evaluation_count().await.unwrap()), (2, 2));
}

async fn workflow_fan_out(server: &Server) {
    let x = Operator::new(server, "scale").await.unwrap();
    x.connect(1, 2.0).await.unwrap();
    let y = Operator::new(server, "forward").await.unwrap();
    let wf = Workflow::new(server).await.unwrap();
    wf.add_operators(&[&x, &y]).await.unwrap();
    wf.set_input_name("src", &x, 0).await.unwrap();
    wf.set_input_name("src", &y, 0).await.unwrap();
    wf.set_output_name("x", &x, 0).await.unwrap();
    wf.set_output_name("y", &y, 0).await.unwrap();

    let v = scalar_field(&[1.5, -1.0]);
    wf.connect("src", v.clone()).await.unwrap();
    let from_x: Field = wf.get_output("x").await.unwrap();
    let from_y: Field = wf.get_output("y").await.unwrap();
    assert_eq!(from_x.data(), &[3.0, -2.0]);
    assert_eq!(from_y, v);
}

async fn chunked_min_max(server: &Server) {
    let scoping = Scoping::nodal((1..=1000).collect());
    let start = Operator::new(server, "scoping::to_field").await.unwrap();
    start.connect(0, scoping.clone()).await.unwrap();
    let end = Operator::new(server, "min_max").await.unwrap();
    end.connect(0, start.output_ref(0)).await.unwrap();
    let one_shot_min: Field = end.get_output(0).await.unwrap();
    let one_shot_max: Field = end.get_output(1).await.unwrap();
    assert_eq!(one_shot_min.data(), &[1.0]);
    assert_eq!(one_shot_max.data(), &[1000.0]);

    for k in [1, 13, 1000] {
        let graph = split_workflow_in_chunks(
            &start,
            &end,
            &scoping,
            ChunkingOptions::default().with_chunk_size(k),
        )
        .await
        .unwrap();
        assert_eq!(graph.chunk_count, 1000usize.div_ceil(k));
        let min: Field = graph.get_output(0).await.unwrap();
        let max: Field = graph.get_output(1).await.unwrap();
        assert_eq!(min.data(), one_shot_min.data());
        assert_eq!(max.data(), one_shot_max.data());
    }
}

async fn all_scenarios(server: &Server) {
    add_two_fields(server).await;
    partial_collection_query(server).await;
    scoping_round_trip(server).await;
    lazy_recompute_after_reconnect(server).await;
    workflow_fan_out(server).await;
    chunked_min_max(server).await;
}

#[tokio::test]
async fn test_scenarios_in_process() {
    let server = in_process().await;
    all_scenarios(&server).await;
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scenarios_over_grpc() {
    let (server, service) = grpc(Protocol::Grpc).await;
    all_scenarios(&server).await;
    server.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_scenarios_over_legacy_grpc() {
    let (server, service) = grpc(Protocol::LegacyGrpc).await;
    all_scenarios(&server).await;
    server.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

fn candidates() -> Vec<Value> {
    vec![
        Value::Int(1),
        Value::Double(1.0),
        Value::Bool(true),
        Value::String("text".into()),
        Value::Scoping(Scoping::nodal(vec![1])),
        Value::Field(scalar_field(&[1.0])),
    ]
}

#[tokio::test]
async fn test_every_pin_refuses_foreign_types() {
    let server = in_process().await;
    for name in server.available_operator_names().await.unwrap() {
        let op = Operator::new(&server, &name).await.unwrap();
        let pins: Vec<u32> = op.specification().inputs.keys().copied().collect();
        for pin in pins {
            let accepted = op.input_types(pin).unwrap();
            for value in candidates() {
                if accepted.contains(value.value_type()) {
                    continue;
                }
                let err = op.connect(pin, value).await.unwrap_err();
                assert_eq!(err.kind, ErrorKind::PinTypeMismatch, "{name} pin {pin}");
            }
        }
        assert_eq!(op.state().await.unwrap(), OperatorState::Unconfigured, "{name}");
    }
}

#[tokio::test]
async fn test_connecting_never_evaluates() {
    let server = in_process().await;
    let a = Operator::new(&server, "scale").await.unwrap();
    let b = Operator::new(&server, "add").await.unwrap();
    a.connect(0, scalar_field(&[1.0])).await.unwrap();
    a.connect(1, 4.0).await.unwrap();
    b.connect(0, a.output_ref(0)).await.unwrap();
    b.connect(1, a.output_ref(0)).await.unwrap();
    assert_eq!(a.evaluation_count().await.unwrap(), 0);
    assert_eq!(b.evaluation_count().await.unwrap(), 0);

    let sum: Field = b.get_output(0).await.unwrap();
    assert_eq!(sum.data(), &[8.0]);
    assert_eq!(a.evaluation_count().await.unwrap(), 1);
    assert_eq!(b.evaluation_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reconnect_invalidates_downstream() {
    let server = in_process().await;
    let a = Operator::new(&server, "forward").await.unwrap();
    let b = Operator::new(&server, "scale").await.unwrap();
    let c = Operator::new(&server, "min_max").await.unwrap();
    a.connect(0, scalar_field(&[1.0, 5.0])).await.unwrap();
    b.connect(0, a.output_ref(0)).await.unwrap();
    b.connect(1, -1.0).await.unwrap();
    c.connect(0, b.output_ref(0)).await.unwrap();

    let min: Field = c.get_output(0).await.unwrap();
    assert_eq!(min.data(), &[-5.0]);
    assert_eq!(c.state().await.unwrap(), OperatorState::Evaluated);

    a.connect(0, scalar_field(&[2.0, 9.0])).await.unwrap();
    assert_eq!(b.state().await.unwrap(), OperatorState::Wired);
    assert_eq!(c.state().await.unwrap(), OperatorState::Wired);
    let min: Field = c.get_output(0).await.unwrap();
    assert_eq!(min.data(), &[-9.0]);
    assert_eq!(c.evaluation_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_collection_entries_found_by_their_label_space() {
    let server = in_process().await;
    let mut local = Collection::new(["time", "zone"]);
    for time in 1..=3 {
        for zone in [4, 8] {
            let value = f64::from(time * 100 + zone);
            let space = LabelSpace::new().with("time", time).with("zone", zone);
            local.add_entry(space, scalar_field(&[value])).unwrap();
        }
    }
    let remote = Remote::create(&server, local.clone()).await.unwrap();
    for (space, entry) in local.iter() {
        assert_eq!(&remote.get_entry(space).await.unwrap().fetch().await.unwrap(), entry);
    }
    assert_eq!(
        remote.get_available_ids_for_label("zone").await.unwrap().ids(),
        &[4, 8]
    );
}

#[test]
fn test_scoping_index_and_id_agree() {
    let scoping = Scoping::elemental(vec![42, 5, 17, 1000, -3, 8]);
    for i in 0..scoping.len() {
        assert_eq!(scoping.index(scoping.id(i).unwrap()), Some(i));
    }
    for &id in scoping.ids() {
        assert_eq!(scoping.id(scoping.index(id).unwrap()), Some(id));
    }
    assert_eq!(scoping.index(6), None);
}

#[tokio::test]
async fn test_field_buffer_tracks_scoping() {
    let mut field = Field::empty(Dimensionality::vector_3d(), crate::data::Location::Nodal);
    field.append(4, &[1.0, 2.0, 3.0]).unwrap();
    field.append(9, &[4.0, 5.0, 6.0]).unwrap();
    assert!(field.append(10, &[1.0]).is_err());
    field.set_entity_data(0, &[0.0, 0.0, 0.0]).unwrap();
    assert_eq!(field.data().len(), field.scoping().len() * field.component_count());

    let server = in_process().await;
    let op = Operator::new(&server, "scale").await.unwrap();
    op.connect(0, field).await.unwrap();
    op.connect(1, 0.5).await.unwrap();
    let out: Field = op.get_output(0).await.unwrap();
    assert_eq!(out.data().len(), out.scoping().len() * out.component_count());
}

fn deep_copy_samples() -> Vec<Value> {
    let mut fields = Collection::new(["time"]);
    fields.add_entry(LabelSpace::new().with("time", 1), scalar_field(&[1.0, 2.0])).unwrap();
    vec![
        Value::Field(vector_field(vec![3, 1], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).with_name("u")),
        Value::Scoping(Scoping::elemental(vec![5, 6])),
        Value::PropertyField(PropertyField::scalar(Scoping::nodal(vec![1, 2]), vec![10, 20]).unwrap()),
        Value::StringField(StringField::new(Scoping::nodal(vec![1]), vec!["steel".into()]).unwrap()),
        Value::FieldsContainer(fields),
        Value::GenericDataContainer(GenericDataContainer::new().with_property("factor", 2.5)),
        Value::DoubleVector(vec![0.5, 0.25]),
    ]
}

#[tokio::test]
async fn test_deep_copy_preserves_type_and_value() {
    let source = in_process().await;
    let same_kind = in_process().await;
    let (remote, service) = grpc(Protocol::LegacyGrpc).await;

    for value in deep_copy_samples() {
        let expected_type = value.value_type();
        let original = ObjectHandle::create(&source, value.clone()).await.unwrap();
        for target in [&same_kind, &remote] {
            let copy = original.deep_copy(target).await.unwrap();
            assert_eq!(copy.value_type(), expected_type);
            assert!(copy.belongs_to(target));
            assert_eq!(copy.fetch().await.unwrap(), value);
        }
    }
    remote.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_cross_server_inputs_rejected() {
    let a = in_process().await;
    let (b, service) = grpc(Protocol::Grpc).await;

    let foreign = Remote::create(&b, scalar_field(&[1.0])).await.unwrap();
    let on_a = Operator::new(&a, "forward").await.unwrap();
    let err = on_a.connect(0, &foreign).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CrossServerReference);

    let producer = Operator::new(&b, "forward").await.unwrap();
    let err = on_a.connect(0, producer.output_ref(0)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CrossServerReference);
    assert_eq!(on_a.state().await.unwrap(), OperatorState::Unconfigured);

    b.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_bare_object_ids_rejected() {
    let a = in_process().await;
    let b = in_process().await;
    let foreign = Operator::new(&b, "forward").await.unwrap();
    let local = Operator::new(&a, "forward").await.unwrap();
    assert_eq!(foreign.id(), local.id());

    let chunker = Operator::new(&a, "chunk_in_for_each_range").await.unwrap();
    let err = chunker.connect(0, Value::Operator(foreign.id())).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CrossServerReference);
    let err = chunker.connect(0, Input::operator_ref(&foreign)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CrossServerReference);
    assert_eq!(chunker.state().await.unwrap(), OperatorState::Unconfigured);

    let mut gdc = GenericDataContainer::new();
    gdc.set_property("driver", Value::Operator(foreign.id()));
    let workflow = Workflow::new(&a).await.unwrap();
    let err = workflow.connect("driver", gdc.clone()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CrossServerReference);
    let err = ObjectHandle::create(&a, gdc.into()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CrossServerReference);

    chunker.connect(0, Input::operator_ref(&local)).await.unwrap();
}

#[tokio::test]
async fn test_backend_errors_keep_kind_and_location_over_grpc() {
    let (server, service) = grpc(Protocol::Grpc).await;
    let err = Operator::new(&server, "no_such_op").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownOperator);

    let rescope = Operator::new(&server, "rescope").await.unwrap();
    rescope.connect(0, scalar_field(&[1.0])).await.unwrap();
    rescope.connect(1, Scoping::nodal(vec![1, 99])).await.unwrap();
    let err = rescope.get_output_value(0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvaluationFailed);
    assert_eq!(err.operator.as_deref(), Some("rescope"));

    let add = Operator::new(&server, "add").await.unwrap();
    let err = add.get_output_value(0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingInput);

    server.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_releases_reach_remote_backend() {
    let (server, service) = grpc(Protocol::Grpc).await;
    let field = Remote::create(&server, scalar_field(&[1.0, 2.0])).await.unwrap();
    let scoping = Remote::create(&server, Scoping::nodal(vec![1])).await.unwrap();
    assert_eq!(server.stats().await.unwrap().live_objects, 2);
    drop(field);
    drop(scoping);
    server.collect_garbage().await.unwrap();
    assert_eq!(server.stats().await.unwrap().live_objects, 0);
    server.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

fn plugin_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&wat::parse_str(crate::backends::wasm::TEST_PLUGIN_WAT).unwrap())
        .unwrap();
    file
}

#[tokio::test]
async fn test_plugin_operators_through_both_transports() {
    let file = plugin_file();
    let path = file.path().display().to_string();
    let (remote, service) = grpc(Protocol::Grpc).await;
    for server in [in_process().await, remote.clone()] {
        let names = server.load_plugin(&path, "dpf_plugin_init", "demo").await.unwrap();
        assert_eq!(names, vec!["demo::double", "demo::spin"]);
        let double = Operator::new(&server, "demo::double").await.unwrap();
        double.connect(0, scalar_field(&[1.5, -4.0])).await.unwrap();
        let out: Field = double.get_output(0).await.unwrap();
        assert_eq!(out.data(), &[3.0, -8.0]);
    }
    remote.shutdown().await.unwrap();
    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_turns_into_timeout() {
    let options = EngineOptions {
        fuel: crate::config::consts::MAX_FUEL_LEVEL,
        ..EngineOptions::default()
    };
    let (server, service) = grpc_with(Protocol::Grpc, options).await;
    let file = plugin_file();
    server
        .load_plugin(&file.path().display().to_string(), "dpf_plugin_init", "demo")
        .await
        .unwrap();
    let spin = Operator::new(&server, "demo::spin").await.unwrap();
    spin.connect(0, scalar_field(&[1.0])).await.unwrap();

    let output = Request::Operator(OperatorRequest::Output {
        operator: spin.id(),
        pin: 0,
    });
    let err = server
        .inner
        .backend
        .call(server.info().session, output, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(
        matches!(err.kind, ErrorKind::Timeout | ErrorKind::Cancelled),
        "unexpected {err}"
    );
    drop(spin);
    drop(server);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_info_reports_transport_and_version() {
    let (server, service) = grpc(Protocol::LegacyGrpc).await;
    assert!(server.meet_version("8.0"));
    assert_eq!(server.version(), crate::engine::ENGINE_VERSION);
    assert!(server.endpoint().ends_with(&service.address.port().to_string()));
    assert!(server.is_alive());
    server.shutdown().await.unwrap();
    assert!(!server.is_alive());
    service.stop().await.unwrap();

    let local = in_process().await;
    assert_eq!(local.version(), crate::engine::ENGINE_VERSION);
    let ty = Remote::create(&local, Scoping::nodal(vec![1])).await.unwrap();
    assert_eq!(ty.handle().value_type(), ValueType::Scoping);
}

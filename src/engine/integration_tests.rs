// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end tests of the engine through its request interface.

use std::sync::Arc;

use super::{write, Engine, EngineOptions};
use crate::backends::stub::{CountingOperator, FailingOperator};
use crate::data::{Dimensionality, Field, GenericDataContainer, ObjectId, Scoping, Value};
use crate::errors::{DpfError, ErrorKind};
use crate::protocol::{
    ObjectRequest, OperatorRequest, OperatorState, OutputValue, PinSource, Reply, Request,
    SessionId, SessionRequest, Version, WorkflowRequest,
};

struct Harness {
    engine: Engine,
    session: SessionId,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    fn with_options(options: EngineOptions) -> Self {
        let engine = Engine::new(options);
        let session = match engine
            .handle(0, Request::Session(SessionRequest::Open { client: "integration".into() }))
            .unwrap()
        {
            Reply::Session(info) => info.session,
            other => panic!("unexpected reply {other:?}"),
        };
        Self { engine, session }
    }

    fn call(&self, request: Request) -> Result<Reply, DpfError> {
        self.engine.handle(self.session, request)
    }

    fn object(&self, request: Request) -> ObjectId {
        match self.call(request).unwrap() {
            Reply::Object(info) => info.id,
            other => panic!("expected an object, got {other:?}"),
        }
    }

    fn operator(&self, name: &str) -> ObjectId {
        self.object(Request::Operator(OperatorRequest::Create { name: name.into() }))
    }

    fn data(&self, value: impl Into<Value>) -> ObjectId {
        self.object(Request::Object(ObjectRequest::Create { value: value.into() }))
    }

    fn connect(&self, operator: ObjectId, pin: u32, source: PinSource) -> Result<(), DpfError> {
        self.call(Request::Operator(OperatorRequest::Connect {
            operator,
            pin,
            source,
        }))
        .map(|_| ())
    }

    fn wire(&self, operator: ObjectId, pin: u32, upstream: ObjectId, out: u32) {
        self.connect(
            operator,
            pin,
            PinSource::Output {
                operator: upstream,
                pin: out,
            },
        )
        .unwrap();
    }

    fn resolve(&self, output: OutputValue) -> Value {
        match output {
            OutputValue::Inline(value) => value,
            OutputValue::Object(info) => match self
                .call(Request::Object(ObjectRequest::Fetch { id: info.id }))
                .unwrap()
            {
                Reply::Value(value) => value,
                other => panic!("expected a value, got {other:?}"),
            },
        }
    }

    fn output(&self, operator: ObjectId, pin: u32) -> Result<Value, DpfError> {
        match self.call(Request::Operator(OperatorRequest::Output { operator, pin }))? {
            Reply::Output(output) => Ok(self.resolve(output)),
            other => panic!("expected an output, got {other:?}"),
        }
    }

    fn stats(&self, operator: ObjectId) -> (OperatorState, u64) {
        match self
            .call(Request::Operator(OperatorRequest::Stats { operator }))
            .unwrap()
        {
            Reply::OperatorStats(stats) => (stats.state, stats.evaluations),
            other => panic!("expected stats, got {other:?}"),
        }
    }
}

fn vector(ids: Vec<i32>, data: Vec<f64>) -> Field {
    Field::new(Dimensionality::vector_3d(), Scoping::nodal(ids), data).unwrap()
}

#[test]
fn test_add_two_fields() {
    let h = Harness::new();
    let f1 = h.data(vector(vec![1, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    let f2 = h.data(vector(vec![1, 2], vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]));
    let add = h.operator("add");
    h.connect(add, 0, PinSource::Object(f1)).unwrap();
    h.connect(add, 1, PinSource::Object(f2)).unwrap();

    let out = h.output(add, 0).unwrap().cast::<Field>().unwrap();
    assert_eq!(out.scoping().ids(), &[1, 2]);
    assert_eq!(out.data(), &[11.0, 22.0, 33.0, 44.0, 55.0, 66.0]);
}

#[test]
fn test_refused_connection_leaves_operator_untouched() {
    let h = Harness::new();
    let add = h.operator("add");
    let err = h
        .connect(add, 0, PinSource::Value(Value::String("nope".into())))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PinTypeMismatch);
    assert_eq!(err.pin, Some(0));
    assert_eq!(h.stats(add), (OperatorState::Unconfigured, 0));

    h.connect(add, 0, PinSource::Value(Value::Double(1.0))).unwrap();
    assert_eq!(h.stats(add).0, OperatorState::Wired);
}

#[test]
fn test_lazy_recompute_after_reconnect() {
    let h = Harness::new();
    let a = h.operator("forward");
    let b = h.operator("scale");
    let field = Field::scalar(Scoping::nodal(vec![1, 2]), vec![1.0, 2.0]).unwrap();
    h.connect(a, 0, PinSource::Value(field.into())).unwrap();
    h.wire(b, 0, a, 0);
    h.connect(b, 1, PinSource::Value(Value::Double(2.0))).unwrap();
    assert_eq!((h.stats(a).1, h.stats(b).1), (0, 0));

    h.output(b, 0).unwrap();
    assert_eq!((h.stats(a).1, h.stats(b).1), (1, 1));
    h.output(b, 0).unwrap();
    assert_eq!((h.stats(a).1, h.stats(b).1), (1, 1));

    let other = Field::scalar(Scoping::nodal(vec![1]), vec![5.0]).unwrap();
    h.connect(a, 0, PinSource::Value(other.into())).unwrap();
    let out = h.output(b, 0).unwrap().cast::<Field>().unwrap();
    assert_eq!(out.data(), &[10.0]);
    assert_eq!((h.stats(a).1, h.stats(b).1), (2, 2));
}

#[test]
fn test_diamond_evaluates_shared_upstream_once() {
    let h = Harness::new();
    let counter = CountingOperator::default();
    write(&h.engine.registry)
        .register("count", Arc::new(counter.clone()))
        .unwrap();

    let source = h.operator("count");
    let left = h.operator("scale");
    let right = h.operator("scale");
    let add = h.operator("add");
    let field = Field::scalar(Scoping::nodal(vec![1]), vec![1.0]).unwrap();
    h.connect(source, 0, PinSource::Value(field.into())).unwrap();
    for (side, k) in [(left, 2.0), (right, 3.0)] {
        h.wire(side, 0, source, 0);
        h.connect(side, 1, PinSource::Value(Value::Double(k))).unwrap();
    }
    h.wire(add, 0, left, 0);
    h.wire(add, 1, right, 0);

    let out = h.output(add, 0).unwrap().cast::<Field>().unwrap();
    assert_eq!(out.data(), &[5.0]);
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_reconnect_invalidates_downstream_transitively() {
    let h = Harness::new();
    let a = h.operator("forward");
    let b = h.operator("forward");
    let c = h.operator("forward");
    h.connect(a, 0, PinSource::Value(Value::Int(1))).unwrap();
    h.wire(b, 0, a, 0);
    h.wire(c, 0, b, 0);
    assert_eq!(h.output(c, 0).unwrap(), Value::Int(1));
    assert_eq!(h.stats(c).0, OperatorState::Evaluated);

    h.connect(a, 0, PinSource::Value(Value::Int(2))).unwrap();
    assert_eq!(h.stats(b).0, OperatorState::Wired);
    assert_eq!(h.stats(c).0, OperatorState::Wired);
    assert_eq!(h.output(c, 0).unwrap(), Value::Int(2));
    assert_eq!(h.stats(c).1, 2);
}

#[test]
fn test_missing_input_names_operator_and_pin() {
    let h = Harness::new();
    let add = h.operator("add");
    h.connect(add, 0, PinSource::Value(Value::Double(1.0))).unwrap();
    let err = h.output(add, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingInput);
    assert_eq!(err.operator.as_deref(), Some("add"));
    assert_eq!(err.pin, Some(1));
    assert_eq!(h.stats(add).0, OperatorState::Failed);
}

#[test]
fn test_failure_propagates_with_failing_node_name() {
    let h = Harness::new();
    write(&h.engine.registry)
        .register("fail", Arc::new(FailingOperator))
        .unwrap();
    let fail = h.operator("fail");
    let forward = h.operator("forward");
    h.wire(forward, 0, fail, 0);

    let err = h.output(forward, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvaluationFailed);
    assert_eq!(err.operator.as_deref(), Some("fail"));
    assert_eq!(h.stats(fail).0, OperatorState::Failed);

    // A failed node runs again when asked again.
    assert!(h.output(forward, 0).is_err());
    assert_eq!(h.stats(fail).1, 2);
}

#[test]
fn test_dependency_cycle_is_reported() {
    let h = Harness::new();
    let a = h.operator("forward");
    let b = h.operator("forward");
    h.wire(a, 0, b, 0);
    h.wire(b, 0, a, 0);
    let err = h.output(a, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvaluationFailed);
    assert!(err.message.contains("cycle"));
}

#[test]
fn test_unknown_operator() {
    let h = Harness::new();
    let err = h
        .call(Request::Operator(OperatorRequest::Create { name: "nope".into() }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownOperator);
}

fn min_max(h: &Harness, field: &Value) -> (Value, Value) {
    let op = h.operator("min_max");
    h.connect(op, 0, PinSource::Value(field.clone())).unwrap();
    (h.output(op, 0).unwrap(), h.output(op, 1).unwrap())
}

#[test]
fn test_chunked_min_max_matches_one_shot() {
    let h = Harness::new();
    let ids: Vec<i32> = (1..=1000).collect();
    let values: Vec<f64> = ids.iter().map(|id| f64::from((id * 37) % 101) - 50.0).collect();
    let whole = Value::Field(Field::scalar(Scoping::nodal(ids.clone()), values).unwrap());
    let (min, max) = min_max(&h, &whole);

    for k in [1i64, 13, 1000] {
        let start = h.operator("forward");
        let rescope = h.operator("rescope");
        h.connect(start, 0, PinSource::Value(whole.clone())).unwrap();
        h.wire(rescope, 0, start, 0);
        h.connect(rescope, 1, PinSource::Value(Value::Scoping(Scoping::nodal(ids.clone()))))
            .unwrap();
        let end = h.operator("min_max_inc");
        h.wire(end, 0, rescope, 0);

        let chunker = h.operator("chunk_in_for_each_range");
        h.connect(chunker, 0, PinSource::Value(Value::Operator(rescope))).unwrap();
        h.connect(chunker, 1, PinSource::Value(Value::Int(1))).unwrap();
        h.connect(chunker, 2, PinSource::Value(Value::Scoping(Scoping::nodal(ids.clone()))))
            .unwrap();
        h.connect(chunker, 3, PinSource::Value(Value::Int(k))).unwrap();
        let for_each = h.operator("for_each");
        h.wire(for_each, 0, chunker, 0);
        h.connect(for_each, 1, PinSource::Value(Value::Operator(end))).unwrap();

        assert_eq!(h.output(for_each, 0).unwrap(), min, "min with k = {k}");
        assert_eq!(h.output(for_each, 1).unwrap(), max, "max with k = {k}");
        assert_eq!(h.stats(end).1, (1000 / k + i64::from(1000 % k != 0)) as u64);
    }
}

#[test]
fn test_workflow_fan_out_and_outputs() {
    let h = Harness::new();
    let wf = h.object(Request::Workflow(WorkflowRequest::Create));
    let x = h.operator("forward");
    let y = h.operator("scale");
    h.connect(y, 1, PinSource::Value(Value::Double(3.0))).unwrap();
    for op in [x, y] {
        h.call(Request::Workflow(WorkflowRequest::SetInputName {
            workflow: wf,
            name: "src".into(),
            operator: op,
            pin: 0,
        }))
        .unwrap();
    }
    for (name, op) in [("x", x), ("y", y)] {
        h.call(Request::Workflow(WorkflowRequest::SetOutputName {
            workflow: wf,
            name: name.into(),
            operator: op,
            pin: 0,
        }))
        .unwrap();
    }
    let field = Field::scalar(Scoping::nodal(vec![1]), vec![2.0]).unwrap();
    h.call(Request::Workflow(WorkflowRequest::Connect {
        workflow: wf,
        name: "src".into(),
        source: PinSource::Value(field.clone().into()),
    }))
    .unwrap();

    let output = |name: &str| match h
        .call(Request::Workflow(WorkflowRequest::Output {
            workflow: wf,
            name: name.into(),
        }))
        .unwrap()
    {
        Reply::Output(out) => h.resolve(out).cast::<Field>().unwrap(),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(output("x"), field);
    assert_eq!(output("y").data(), &[6.0]);

    let err = h
        .call(Request::Workflow(WorkflowRequest::SetOutputName {
            workflow: wf,
            name: "x".into(),
            operator: y,
            pin: 0,
        }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

fn single_op_workflow(h: &Harness, name: &str, input: &str, output: &str) -> (ObjectId, ObjectId) {
    let wf = h.object(Request::Workflow(WorkflowRequest::Create));
    let op = h.operator(name);
    h.call(Request::Workflow(WorkflowRequest::SetInputName {
        workflow: wf,
        name: input.into(),
        operator: op,
        pin: 0,
    }))
    .unwrap();
    h.call(Request::Workflow(WorkflowRequest::SetOutputName {
        workflow: wf,
        name: output.into(),
        operator: op,
        pin: 0,
    }))
    .unwrap();
    (wf, op)
}

#[test]
fn test_chained_workflow_feeds_first_into_second() {
    let h = Harness::new();
    let (w1, _) = single_op_workflow(&h, "forward", "in", "mid");
    let (w2, scale) = single_op_workflow(&h, "scale", "mid_in", "out");
    h.connect(scale, 1, PinSource::Value(Value::Double(10.0))).unwrap();

    let chained = h.object(Request::Workflow(WorkflowRequest::Chain {
        first: w1,
        second: w2,
        map: vec![("mid".into(), "mid_in".into())],
    }));
    match h
        .call(Request::Workflow(WorkflowRequest::Names { workflow: chained }))
        .unwrap()
    {
        Reply::WorkflowNames { inputs, outputs } => {
            assert_eq!(inputs, vec!["in".to_string()]);
            assert_eq!(outputs, vec!["mid".to_string(), "out".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let field = Field::scalar(Scoping::nodal(vec![3]), vec![1.5]).unwrap();
    h.call(Request::Workflow(WorkflowRequest::Connect {
        workflow: chained,
        name: "in".into(),
        source: PinSource::Value(field.into()),
    }))
    .unwrap();
    let Reply::Output(out) = h
        .call(Request::Workflow(WorkflowRequest::Output {
            workflow: chained,
            name: "out".into(),
        }))
        .unwrap()
    else {
        panic!("expected an output");
    };
    assert_eq!(h.resolve(out).cast::<Field>().unwrap().data(), &[15.0]);
}

#[test]
fn test_chaining_requires_recent_backend() {
    let h = Harness::with_options(EngineOptions {
        version: Version::new(2, 0),
        ..EngineOptions::default()
    });
    let (w1, _) = single_op_workflow(&h, "forward", "in", "out");
    let (w2, _) = single_op_workflow(&h, "forward", "in", "out");
    let err = h
        .call(Request::Workflow(WorkflowRequest::Chain {
            first: w1,
            second: w2,
            map: vec![],
        }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::VersionMismatch);
}

#[test]
fn test_record_and_load_workflow() {
    let h = Harness::new();
    let (wf, _) = single_op_workflow(&h, "forward", "in", "out");
    h.call(Request::Workflow(WorkflowRequest::Record {
        workflow: wf,
        identifier: "passthrough".into(),
    }))
    .unwrap();
    h.call(Request::Object(ObjectRequest::Release { ids: vec![wf] }))
        .unwrap();

    let loaded = h.object(Request::Workflow(WorkflowRequest::Load {
        identifier: "passthrough".into(),
    }));
    h.call(Request::Workflow(WorkflowRequest::Connect {
        workflow: loaded,
        name: "in".into(),
        source: PinSource::Value(Value::Int(7)),
    }))
    .unwrap();
    let Reply::Output(out) = h
        .call(Request::Workflow(WorkflowRequest::Output {
            workflow: loaded,
            name: "out".into(),
        }))
        .unwrap()
    else {
        panic!("expected an output");
    };
    assert_eq!(h.resolve(out), Value::Int(7));

    let err = h
        .call(Request::Workflow(WorkflowRequest::Load {
            identifier: "missing".into(),
        }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_topology_operator_describes_workflow() {
    let h = Harness::new();
    let wf = h.object(Request::Workflow(WorkflowRequest::Create));
    let a = h.operator("forward");
    let b = h.operator("scale");
    h.wire(b, 0, a, 0);
    h.connect(b, 1, PinSource::Value(Value::Double(2.0))).unwrap();
    h.call(Request::Workflow(WorkflowRequest::AddOperators {
        workflow: wf,
        operators: vec![a, b],
    }))
    .unwrap();
    h.call(Request::Workflow(WorkflowRequest::SetInputName {
        workflow: wf,
        name: "in".into(),
        operator: a,
        pin: 0,
    }))
    .unwrap();

    let topology = h.operator("workflow_topology");
    h.connect(topology, 0, PinSource::Value(Value::Workflow(wf))).unwrap();
    let gdc = h.output(topology, 0).unwrap().cast::<GenericDataContainer>().unwrap();
    let count = |name: &str| match gdc.get_property(name) {
        Some(Value::GenericDataContainersContainer(c)) => c.len(),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(count("operators"), 2);
    assert_eq!(count("operator_connections"), 1);
    assert_eq!(count("data_connections"), 1);
    assert_eq!(count("exposed_inputs"), 1);
    assert_eq!(count("exposed_outputs"), 0);
}

#[test]
fn test_release_cascades_through_bindings() {
    let h = Harness::new();
    let field = h.data(Field::scalar(Scoping::nodal(vec![1]), vec![1.0]).unwrap());
    let op = h.operator("forward");
    h.connect(op, 0, PinSource::Object(field)).unwrap();

    h.call(Request::Object(ObjectRequest::Release { ids: vec![field] }))
        .unwrap();
    assert_eq!(h.engine.live_objects(), 2);
    assert!(h.output(op, 0).is_ok());

    h.call(Request::Object(ObjectRequest::Release { ids: vec![op] }))
        .unwrap();
    // The fetched output object is the only thing left.
    assert_eq!(h.engine.live_objects(), 1);
    // Releasing again is harmless.
    h.call(Request::Object(ObjectRequest::Release { ids: vec![op] }))
        .unwrap();
}

#[test]
fn test_deep_copy_between_sessions() {
    let h = Harness::new();
    let original = Field::scalar(Scoping::nodal(vec![4, 5]), vec![0.25, 0.5])
        .unwrap()
        .with_unit("Pa");
    let id = h.data(original.clone());
    let Reply::Bytes(blob) = h.call(Request::Object(ObjectRequest::Serialize { id })).unwrap() else {
        panic!("expected bytes");
    };

    let other = match h
        .engine
        .handle(0, Request::Session(SessionRequest::Open { client: "other".into() }))
        .unwrap()
    {
        Reply::Session(info) => info.session,
        reply => panic!("unexpected {reply:?}"),
    };
    let Reply::Object(copy) = h
        .engine
        .handle(other, Request::Object(ObjectRequest::Deserialize { blob }))
        .unwrap()
    else {
        panic!("expected an object");
    };
    let Reply::Value(value) = h
        .engine
        .handle(other, Request::Object(ObjectRequest::Fetch { id: copy.id }))
        .unwrap()
    else {
        panic!("expected a value");
    };
    assert_eq!(value, Value::Field(original));
}

#[test]
fn test_wasm_plugin_operator_runs_in_graph() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&wat::parse_str(crate::backends::wasm::TEST_PLUGIN_WAT).unwrap())
        .unwrap();

    let h = Harness::new();
    let Reply::Names(names) = h
        .call(Request::Session(SessionRequest::LoadPlugin {
            path: file.path().display().to_string(),
            symbol: "dpf_plugin_init".into(),
            alias: "demo".into(),
        }))
        .unwrap()
    else {
        panic!("expected names");
    };
    assert_eq!(names, vec!["demo::double", "demo::spin"]);

    let Reply::Names(all) = h.call(Request::Session(SessionRequest::OperatorNames)).unwrap() else {
        panic!("expected names");
    };
    assert!(all.contains(&"demo::double".to_string()));

    let double = h.operator("demo::double");
    let field = Field::scalar(Scoping::nodal(vec![1, 2]), vec![1.5, -4.0]).unwrap();
    h.connect(double, 0, PinSource::Value(field.into())).unwrap();
    let out = h.output(double, 0).unwrap().cast::<Field>().unwrap();
    assert_eq!(out.data(), &[3.0, -8.0]);
    assert_eq!(out.scoping().ids(), &[1, 2]);

    let spin = h.operator("demo::spin");
    h.connect(spin, 0, PinSource::Value(Field::scalar(Scoping::nodal(vec![1]), vec![1.0]).unwrap().into()))
        .unwrap();
    let err = h.output(spin, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvaluationFailed);
    assert_eq!(err.operator.as_deref(), Some("demo::spin"));
}

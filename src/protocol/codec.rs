// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Frame encodings of the gRPC transport.

use crate::errors::{DpfError, ErrorKind, Result};
use crate::proto;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// How requests and replies are framed inside a `Call`.
///
/// Both layouts carry the same messages; picking one is a deployment choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireLayout {
    /// Compact binary frames (`bincode`).
    #[default]
    Current,
    /// Self-describing JSON frames, byte payloads base64 encoded.
    Legacy,
}

impl WireLayout {
    pub fn encode<T: Serialize>(self, message: &T) -> Result<Vec<u8>> {
        Ok(match self {
            WireLayout::Current => bincode::serialize(message)?,
            WireLayout::Legacy => serde_json::to_vec(message)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(self, frame: &[u8]) -> Result<T> {
        Ok(match self {
            WireLayout::Current => bincode::deserialize(frame)?,
            WireLayout::Legacy => serde_json::from_slice(frame)?,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireLayout::Current => "current",
            WireLayout::Legacy => "legacy",
        }
    }
}

impl From<WireLayout> for proto::WireLayout {
    fn from(layout: WireLayout) -> Self {
        match layout {
            WireLayout::Current => proto::WireLayout::Current,
            WireLayout::Legacy => proto::WireLayout::Legacy,
        }
    }
}

impl From<proto::WireLayout> for WireLayout {
    fn from(layout: proto::WireLayout) -> Self {
        match layout {
            proto::WireLayout::Legacy => WireLayout::Legacy,
            proto::WireLayout::Current | proto::WireLayout::Unspecified => WireLayout::Current,
        }
    }
}

impl From<&DpfError> for proto::ErrorDetail {
    fn from(err: &DpfError) -> Self {
        proto::ErrorDetail {
            kind: err.kind.as_str().to_string(),
            message: err.message.clone(),
            stack: err.stack.clone(),
            operator: err.operator.clone(),
            pin: err.pin,
        }
    }
}

impl From<proto::ErrorDetail> for DpfError {
    fn from(detail: proto::ErrorDetail) -> Self {
        let kind = detail.kind.parse::<ErrorKind>().unwrap_or(ErrorKind::Transport);
        DpfError {
            kind,
            message: detail.message,
            operator: detail.operator,
            pin: detail.pin,
            stack: detail.stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Field, LabelSpace, ObjectId, Scoping, Value};
    use crate::protocol::{DataRequest, OperatorRequest, PinSource, Request};

    fn sample_requests() -> Vec<Request> {
        let field = Field::scalar(Scoping::nodal(vec![1, 2]), vec![0.5, 2.5]).unwrap();
        vec![
            Request::Operator(OperatorRequest::Connect {
                operator: ObjectId(3),
                pin: 1,
                source: PinSource::Value(Value::Field(field)),
            }),
            Request::Operator(OperatorRequest::Connect {
                operator: ObjectId(3),
                pin: 0,
                source: PinSource::Output {
                    operator: ObjectId(2),
                    pin: 0,
                },
            }),
            Request::Data(DataRequest::CollectionQuery {
                id: ObjectId(9),
                partial: LabelSpace::from([("time", 1)]),
            }),
        ]
    }

    #[test]
    fn test_both_layouts_carry_the_same_requests() {
        for layout in [WireLayout::Current, WireLayout::Legacy] {
            for request in sample_requests() {
                let frame = layout.encode(&request).unwrap();
                let back: Request = layout.decode(&frame).unwrap();
                assert_eq!(back, request, "layout {}", layout.as_str());
            }
        }
    }

    #[test]
    fn test_malformed_frame_is_transport_error() {
        let err = WireLayout::Legacy.decode::<Request>(b"{not json").unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_error_detail_keeps_every_part() {
        let err = DpfError::missing_input("add", 1, "fieldB").with_stack("frame 0");
        let back = DpfError::from(proto::ErrorDetail::from(&err));
        assert_eq!(back, err);
    }

    #[test]
    fn test_unspecified_layout_means_current() {
        assert_eq!(
            WireLayout::from(proto::WireLayout::Unspecified),
            WireLayout::Current
        );
    }
}

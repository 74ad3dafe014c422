//! Messages exchanged between the manager and its workers.
//!
//! In-process workers move these values over channels directly. The JSON
//! helpers exist for process transports; JSON has no encoding for
//! non-finite floats, so such a transport must keep scores finite or use a
//! binary format.

use serde::{Deserialize, Serialize};

pub use crate::bnb::{IncumbentPayload, NodeReport, StatusTag};
use crate::error::{BabError, BabResult};
use crate::search::BabNode;

/// Manager to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManagerMessage {
    /// Process this node.
    Node(BabNode),

    /// A better incumbent is known.
    Incumbent(IncumbentPayload),

    /// Stop. `EverythingFine` is a regular shutdown, `Exception` an abort.
    Status(StatusTag),
}

/// Worker to manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// Result for the node last dispatched to this worker.
    Report(NodeReport),

    /// Processing the last node failed.
    Failed(String),
}

macro_rules! json_codec {
    ($ty:ty) => {
        impl $ty {
            /// Encode as JSON.
            pub fn to_json(&self) -> BabResult<String> {
                serde_json::to_string(self).map_err(|e| BabError::Protocol(format!("encode failed: {e}")))
            }

            /// Decode from JSON.
            pub fn from_json(json: &str) -> BabResult<Self> {
                serde_json::from_str(json).map_err(|e| BabError::Protocol(format!("decode failed: {e}")))
            }
        }
    };
}

json_codec!(ManagerMessage);
json_codec!(WorkerMessage);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_message_json() {
        let mut node = BabNode::new(1.5, vec![0.0, -1.0], vec![2.0, 1.0], 12, 3);
        node.dataset_index = Some(2);
        let message = ManagerMessage::Node(node);

        let json = message.to_json().unwrap();
        assert!(json.contains("\"dataset_index\":2"));
        assert_eq!(ManagerMessage::from_json(&json).unwrap(), message);
    }

    #[test]
    fn test_status_message_json() {
        let json = ManagerMessage::Status(StatusTag::Exception).to_json().unwrap();
        assert_eq!(json, r#"{"Status":"Exception"}"#);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            WorkerMessage::from_json("{\"Report\":"),
            Err(BabError::Protocol(_))
        ));
    }
}

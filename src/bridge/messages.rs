//! Wire envelopes exchanged with the execution sandbox.
//!
//! Field names are part of the protocol and must not change: the sandbox
//! side matches on `origin`, and the bundler reports its lifecycle with the
//! state tokens below.

use serde::{Deserialize, Serialize};

use crate::fileset::Asset;

/// Bundler state token signalling the asset bundle finished building.
pub const BUNDLING_FINISHED: &str = "Symbol(BUNDLING_FINISHED)";

/// Worker state token signalling the execution worker is up.
pub const WORKER_STATE_SUCCESS: &str = "Symbol(WORKER_STATE_SUCCESS)";

/// A package forwarded to the sandbox bundler, ordered as declared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyRef {
    pub package: String,
    pub version: String,
}

/// Editor → sandbox envelope carrying the current file snapshot and the
/// path to execute. `assetBuffer` holds the UTF-8 bytes of a JSON array of
/// assets; exactly one asset is marked as the execution entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorMessage {
    pub origin: String,
    #[serde(rename = "assetBuffer")]
    pub asset_buffer: Vec<u8>,
    pub dependencies: Vec<DependencyRef>,
    #[serde(rename = "isTest")]
    pub is_test: bool,
    #[serde(rename = "runPath")]
    pub run_path: String,
}

impl EditorMessage {
    pub fn new(
        assets: &[Asset],
        dependencies: Vec<DependencyRef>,
        run_path: String,
        is_test: bool,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            origin: "editor".to_string(),
            asset_buffer: serde_json::to_vec(assets)?,
            dependencies,
            is_test,
            run_path,
        })
    }

    /// Decode the asset list back out of the buffer. Used by the sandbox
    /// side and by tests.
    pub fn decode_assets(&self) -> Result<Vec<Asset>, serde_json::Error> {
        serde_json::from_slice(&self.asset_buffer)
    }
}

/// Sandbox → editor messages, discriminated by `origin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "origin")]
pub enum SandboxMessage {
    /// Bundler lifecycle report. Each message carries one of the two state
    /// fields; the flags they feed are independent and arrive in no
    /// guaranteed order.
    #[serde(rename = "bundler")]
    Bundler {
        #[serde(
            rename = "bundlingState",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        bundling_state: Option<String>,
        #[serde(
            rename = "workerState",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        worker_state: Option<String>,
    },
    /// Test run result. `result` is a JSON-encoded array of per-assertion
    /// outcomes; only the last element's status decides the run.
    #[serde(rename = "testRunner")]
    TestRunner {
        #[serde(rename = "type")]
        kind: String,
        result: String,
    },
}

impl SandboxMessage {
    pub fn bundling_finished() -> Self {
        Self::Bundler {
            bundling_state: Some(BUNDLING_FINISHED.to_string()),
            worker_state: None,
        }
    }

    pub fn worker_ready() -> Self {
        Self::Bundler {
            bundling_state: None,
            worker_state: Some(WORKER_STATE_SUCCESS.to_string()),
        }
    }

    pub fn test_result(result: &str) -> Self {
        Self::TestRunner {
            kind: "test".to_string(),
            result: result.to_string(),
        }
    }
}

/// One assertion outcome inside a test runner result payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionOutcome {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

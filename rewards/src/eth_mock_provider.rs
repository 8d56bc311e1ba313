// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A canned-response `JsonRpcClient` for exercising ethers-backed clients without a node.

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, JsonRpcError, MockError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

type ResponseKey = (String, String);

#[derive(Clone, Debug, Default)]
pub struct EthMockProvider {
    responses: Arc<Mutex<HashMap<ResponseKey, Result<Value, JsonRpcError>>>>,
}

impl EthMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` called with exactly `params` with `response`, until replaced.
    pub fn add_response<P: Serialize, R: Serialize>(
        &self,
        method: &str,
        params: P,
        response: R,
    ) -> Result<(), serde_json::Error> {
        let key = (method.to_string(), serde_json::to_string(&params)?);
        let value = serde_json::to_value(response)?;
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Ok(value));
        Ok(())
    }

    pub fn add_error<P: Serialize>(
        &self,
        method: &str,
        params: P,
        error: JsonRpcError,
    ) -> Result<(), serde_json::Error> {
        let key = (method.to_string(), serde_json::to_string(&params)?);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Err(error));
        Ok(())
    }
}

#[async_trait]
impl JsonRpcClient for EthMockProvider {
    type Error = MockError;

    async fn request<T: Serialize + Send + Sync + Debug, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, MockError> {
        let key = (method.to_string(), serde_json::to_string(&params)?);
        let response = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .ok_or(MockError::EmptyResponses)?;
        match response {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(e) => Err(MockError::JsonRpcError(e)),
        }
    }
}

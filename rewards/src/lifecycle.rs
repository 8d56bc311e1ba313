// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::encoder::{ConfidentialEncoder, EncoderError, SimulatedEncoder};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Builds the confidential backend. Real backends typically need network setup (key fetch,
/// gateway handshake), so creation is async and fallible.
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn ConfidentialEncoder>, EncoderError>;
}

#[derive(Debug, Default)]
pub struct SimulatedEncoderFactory;

#[async_trait]
impl EncoderFactory for SimulatedEncoderFactory {
    async fn create(&self) -> Result<Arc<dyn ConfidentialEncoder>, EncoderError> {
        Ok(Arc::new(SimulatedEncoder::new()))
    }
}

/// Holds the encoder backend for the lifetime of a session.
///
/// Concurrent callers of [`EncoderLifecycle::ensure_initialized`] share a single in-flight
/// initialisation. A failed initialisation leaves the cell empty so the next caller retries.
pub struct EncoderLifecycle {
    factory: Box<dyn EncoderFactory>,
    instance: OnceCell<Arc<dyn ConfidentialEncoder>>,
}

impl EncoderLifecycle {
    pub fn new(factory: Box<dyn EncoderFactory>) -> Self {
        Self {
            factory,
            instance: OnceCell::new(),
        }
    }

    pub fn simulated() -> Self {
        Self::new(Box::new(SimulatedEncoderFactory))
    }

    pub async fn ensure_initialized(&self) -> Result<(), EncoderError> {
        self.instance().await.map(|_| ())
    }

    /// Returns the backend, initialising it first if needed.
    pub async fn instance(&self) -> Result<Arc<dyn ConfidentialEncoder>, EncoderError> {
        self.instance
            .get_or_try_init(|| async {
                let encoder = self.factory.create().await?;
                info!(
                    "[EncoderLifecycle] Confidential backend '{}' initialized",
                    encoder.backend_name()
                );
                Ok::<_, EncoderError>(encoder)
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.instance.initialized()
    }
}

impl std::fmt::Debug for EncoderLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderLifecycle")
            .field("instance", &self.instance.get())
            .finish()
    }
}

//! Read access to stored function definitions.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{error::Error, types::FunctionSpec};

#[async_trait]
pub trait FunctionStore: Send + Sync {
    /// `Ok(None)` when no function has this id
    async fn lookup(&self, function_id: &str) -> Result<Option<FunctionSpec>, Error>;
}

/// Function definitions kept in process memory, keyed by id
#[derive(Debug, Default)]
pub struct InMemoryFunctionStore {
    functions: RwLock<HashMap<String, FunctionSpec>>,
}

impl InMemoryFunctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function; names must stay unique
    pub async fn insert(&self, spec: FunctionSpec) -> Result<(), Error> {
        let mut functions = self.functions.write().await;
        if functions
            .values()
            .any(|f| f.name == spec.name && f.id != spec.id)
        {
            return Err(Error::FunctionExists(spec.name));
        }
        functions.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub async fn list(&self) -> Vec<FunctionSpec> {
        self.functions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl FunctionStore for InMemoryFunctionStore {
    async fn lookup(&self, function_id: &str) -> Result<Option<FunctionSpec>, Error> {
        Ok(self.functions.read().await.get(function_id).cloned())
    }
}

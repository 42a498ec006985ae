use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Source of aggregate ids, injected into command handlers
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<String>;
}

/// Time-ordered UUIDv7 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> Result<String> {
        Ok(Uuid::now_v7().simple().to_string())
    }
}

/// Hands out a fixed list of ids in order. Running dry is an internal error.
#[derive(Debug, Default)]
pub struct PresetIdGenerator {
    ids: Mutex<VecDeque<String>>,
}

impl PresetIdGenerator {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Mutex::new(ids.into_iter().map(Into::into).collect()),
        }
    }
}

impl IdGenerator for PresetIdGenerator {
    fn next_id(&self) -> Result<String> {
        let mut ids = self
            .ids
            .lock()
            .map_err(|_| Error::Internal(anyhow::anyhow!("id generator lock poisoned")))?;
        ids.pop_front()
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("no preset ids left")))
    }
}

//! Deterministic LLM stand-ins for tests and embedded use.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::LlmError;
use crate::traits::LlmService;

/// Echoes the prompt back. Deterministic and always long enough to read.
#[derive(Default)]
pub struct EchoLlm;

impl EchoLlm {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmService for EchoLlm {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(format!("echo: {prompt}"))
    }
}

/// Replays a fixed sequence of responses, one per call. Errors when the
/// script runs dry, which makes over-calling visible in tests.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn generate_text(&self, _prompt: &str) -> Result<String, LlmError> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Generation {
                message: "scripted responses exhausted".into(),
            })
    }
}

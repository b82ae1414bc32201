use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use super::{Invocation, SigningEngine};
use crate::invoker::{self, SubprocessOutcome};

/// Runs each signing job in a fresh engine process.
///
/// The engine is normally this same executable, re-invoked with one of its
/// `sign-*` subcommands, so key material never lives in the server process.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Engine backed by the running executable.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl SigningEngine for ProcessEngine {
    fn sign(
        &self,
        invocation: Invocation,
        input: Bytes,
        deadline: Duration,
    ) -> BoxFuture<'_, io::Result<SubprocessOutcome>> {
        let argv = invocation.argv(&self.program);
        Box::pin(async move { invoker::run(&argv, input, deadline).await })
    }
}

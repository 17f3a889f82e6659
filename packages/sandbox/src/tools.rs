// ABOUTME: Python and shell execution tools on top of the session factory
// ABOUTME: One-shot runs use a temporary BASE session that is always closed; failures come back in-band

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::factory::SessionFactory;
use crate::session::SandboxSession;
use crate::types::{ExecutionResult, SandboxType};

#[derive(Debug, Clone, Copy)]
enum Language {
    Python,
    Shell,
}

impl Language {
    fn empty_input_message(self) -> &'static str {
        match self {
            Language::Python => "Python code cannot be empty",
            Language::Shell => "Shell command cannot be empty",
        }
    }
}

async fn run_in(
    session: &SandboxSession,
    language: Language,
    input: &str,
    split_output: bool,
) -> ExecutionResult {
    if input.trim().is_empty() {
        return ExecutionResult::error(language.empty_input_message());
    }

    let outcome = match language {
        Language::Python => session.run_python(input, split_output).await,
        Language::Shell => session.run_shell(input, split_output).await,
    };
    match outcome {
        Ok(result) => {
            info!(
                "{:?} execution in session {} finished, is_error={}",
                language,
                session.session_id(),
                result.is_error
            );
            result
        }
        Err(e) => {
            error!(
                "{:?} execution in session {} failed: {}",
                language,
                session.session_id(),
                e
            );
            ExecutionResult::error(format!("Sandbox error: {}", e))
        }
    }
}

async fn run_once(
    factory: &SessionFactory,
    language: Language,
    input: &str,
    split_output: bool,
) -> ExecutionResult {
    if input.trim().is_empty() {
        return ExecutionResult::error(language.empty_input_message());
    }

    let mut session = match factory.create_session(SandboxType::Base, None).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Could not create a session for {:?} execution: {}", language, e);
            return ExecutionResult::error(format!("Sandbox error: {}", e));
        }
    };
    let result = run_in(&session, language, input, split_output).await;
    session.close().await;
    result
}

/// Runs Python code in sandboxes created by a factory
#[derive(Clone)]
pub struct PythonTool {
    factory: Arc<SessionFactory>,
}

impl PythonTool {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self { factory }
    }

    /// Run `code` in a fresh BASE session that is closed afterwards
    pub async fn execute(&self, code: &str, split_output: bool) -> ExecutionResult {
        run_once(&self.factory, Language::Python, code, split_output).await
    }

    /// Run `code` in a session owned by the caller; the session stays open
    pub async fn execute_in(
        &self,
        session: &SandboxSession,
        code: &str,
        split_output: bool,
    ) -> ExecutionResult {
        run_in(session, Language::Python, code, split_output).await
    }
}

/// Runs shell commands in sandboxes created by a factory
#[derive(Clone)]
pub struct ShellTool {
    factory: Arc<SessionFactory>,
}

impl ShellTool {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self { factory }
    }

    /// Run `command` in a fresh BASE session that is closed afterwards
    pub async fn execute(&self, command: &str, split_output: bool) -> ExecutionResult {
        run_once(&self.factory, Language::Shell, command, split_output).await
    }

    /// Run `command` in a session owned by the caller; the session stays open
    pub async fn execute_in(
        &self,
        session: &SandboxSession,
        command: &str,
        split_output: bool,
    ) -> ExecutionResult {
        run_in(session, Language::Shell, command, split_output).await
    }

    /// Run commands in order inside one shared session, one result per command.
    ///
    /// An empty list or a session that cannot be created yields a single error result.
    pub async fn execute_multiple<S: AsRef<str>>(
        &self,
        commands: &[S],
        split_output: bool,
    ) -> Vec<ExecutionResult> {
        if commands.is_empty() {
            return vec![ExecutionResult::error("Command list cannot be empty")];
        }
        info!("Running {} shell commands in one session", commands.len());

        let mut session = match self.factory.create_session(SandboxType::Base, None).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not create a session for shell commands: {}", e);
                return vec![ExecutionResult::error(format!(
                    "Failed to run commands: {}",
                    e
                ))];
            }
        };

        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(run_in(&session, Language::Shell, command.as_ref(), split_output).await);
        }
        session.close().await;
        results
    }
}

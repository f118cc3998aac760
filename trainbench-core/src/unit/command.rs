//! Worker-subprocess trainable units.
//!
//! One worker process is spawned per configuration and kept alive for all of
//! its steps, so model setup and compilation caches stay inside the worker.
//! The line protocol on stdin/stdout:
//!
//! ```text
//! worker -> harness   ready                    (setup done)
//! worker -> harness   unsupported: <reason>    (cannot run this kind)
//! harness -> worker   step
//! worker -> harness   ok | error: <message>
//! ```
//!
//! The worker is killed when the unit is dropped.

use super::{Configuration, TrainableUnit, UnitError, UnitFactory};
use crate::config::CommandConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

pub struct CommandFactory {
    config: CommandConfig,
    batch_size: usize,
}

impl CommandFactory {
    pub fn new(config: CommandConfig, batch_size: usize) -> Self {
        Self { config, batch_size }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl UnitFactory for CommandFactory {
    async fn construct(
        &self,
        configuration: &Configuration,
    ) -> Result<Box<dyn TrainableUnit>, UnitError> {
        let program = self
            .config
            .program
            .as_ref()
            .ok_or_else(|| UnitError::Unsupported("no worker program configured".to_string()))?;

        debug!(
            program = %program.display(),
            configuration = %configuration.name,
            kind = %configuration.kind,
            "Spawning training worker"
        );

        let mut command = Command::new(program);
        command
            .args(&self.config.args)
            .arg("--kind")
            .arg(configuration.kind.as_str())
            .arg("--name")
            .arg(&configuration.name)
            .arg("--batch-size")
            .arg(self.batch_size.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| UnitError::Failed("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| UnitError::Failed("worker stdout unavailable".to_string()))?;

        let mut unit = CommandUnit {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            timeout: self.timeout(),
        };

        let line = unit.read_reply().await?;
        match line.as_deref().map(str::trim) {
            Some("ready") => Ok(Box::new(unit)),
            Some(other) => match other.strip_prefix("unsupported:") {
                Some(reason) => Err(UnitError::Unsupported(reason.trim().to_string())),
                None => Err(UnitError::Failed(format!(
                    "unexpected handshake from worker: '{other}'"
                ))),
            },
            None => Err(UnitError::Failed(
                "worker exited before signalling ready".to_string(),
            )),
        }
    }
}

pub struct CommandUnit {
    // Held so the worker is killed on drop.
    #[allow(dead_code)]
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    timeout: Duration,
}

impl CommandUnit {
    async fn read_reply(&mut self) -> Result<Option<String>, UnitError> {
        match tokio::time::timeout(self.timeout, self.stdout.next_line()).await {
            Ok(line) => Ok(line?),
            Err(_) => Err(UnitError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl TrainableUnit for CommandUnit {
    async fn step(&mut self) -> Result<(), UnitError> {
        self.stdin.write_all(b"step\n").await?;
        self.stdin.flush().await?;

        match self.read_reply().await?.as_deref().map(str::trim) {
            Some("ok") => Ok(()),
            Some(other) => match other.strip_prefix("error:") {
                Some(message) => Err(UnitError::Failed(message.trim().to_string())),
                None => Err(UnitError::Failed(format!(
                    "unexpected reply from worker: '{other}'"
                ))),
            },
            None => Err(UnitError::Failed("worker exited mid-run".to_string())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::unit::OptimizationKind;

    fn shell_worker(script: &str) -> CommandFactory {
        CommandFactory::new(
            CommandConfig {
                program: Some("sh".into()),
                // Trailing harness flags land in $0.. and are ignored by the script.
                args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
                working_dir: None,
                timeout_secs: 5,
            },
            64,
        )
    }

    fn tf32() -> Configuration {
        Configuration::new("TF32", OptimizationKind::ReducedPrecisionA)
    }

    #[tokio::test]
    async fn test_worker_handshake_and_steps() {
        let factory = shell_worker("echo ready; while read cmd; do echo ok; done");
        let mut unit = factory.construct(&tf32()).await.unwrap();
        unit.step().await.unwrap();
        unit.step().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_reports_unsupported() {
        let factory = shell_worker("echo 'unsupported: compute capability 7.0 < 8.0'");
        let err = factory.construct(&tf32()).await.err().unwrap();
        match err {
            UnitError::Unsupported(reason) => assert!(reason.contains("compute capability")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_worker_step_error() {
        let factory = shell_worker("echo ready; read cmd; echo ok; read cmd; echo 'error: CUDA OOM'");
        let mut unit = factory.construct(&tf32()).await.unwrap();
        unit.step().await.unwrap();
        match unit.step().await {
            Err(UnitError::Failed(message)) => assert_eq!(message, "CUDA OOM"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_exit_before_ready() {
        let factory = shell_worker("exit 3");
        assert!(factory.construct(&tf32()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_program_is_unsupported() {
        let factory = CommandFactory::new(CommandConfig::default(), 64);
        let err = factory.construct(&tf32()).await.err().unwrap();
        assert!(matches!(err, UnitError::Unsupported(_)));
    }
}

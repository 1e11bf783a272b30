//! NodeWarden Agent - node-side heartbeat loop
//!
//! Each cycle: sample lightweight system stats, POST them to the kernel
//! together with any buffered command results, then execute the tasks the
//! kernel returned (their results ride on the next heartbeat). On any
//! transport failure the result buffer is kept for retry on the next tick
//! (at-least-once for results; tasks themselves are at-most-once, the
//! kernel drains its queue when it answers).

mod config;
mod execution;
mod metrics;

use anyhow::{bail, Context, Result};
use config::AgentConfig;
use execution::REBOOT_COMMAND;
use metrics::NodeStats;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::System;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Timeout for ordinary task commands
const TASK_TIMEOUT_SECS: u64 = 30;

/// Heartbeat request body (kernel wire contract)
#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    token: &'a str,
    stats: &'a NodeStats,
    results: &'a [CommandResult],
}

#[derive(Debug, Deserialize)]
struct HeartbeatResponse {
    #[allow(dead_code)]
    status: String,
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
struct Task {
    command: String,
    user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
struct CommandResult {
    command: String,
    user_id: i64,
    result: String,
}

struct Agent {
    config: AgentConfig,
    client: reqwest::Client,
    system: System,
    /// Results awaiting a successful heartbeat; cleared only on a 200
    pending_results: Vec<CommandResult>,
}

impl Agent {
    fn new(config: AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            config,
            client,
            system: System::new(),
            pending_results: Vec::new(),
        })
    }

    async fn run(&mut self) -> Result<()> {
        info!(
            "heartbeat loop started (target: {}, interval: {}s)",
            self.config.base_url, self.config.interval_secs
        );

        let mut timer = interval(Duration::from_secs(self.config.interval_secs));
        loop {
            timer.tick().await;
            self.cycle().await;
        }
    }

    /// One heartbeat cycle. Transport errors are logged and absorbed: the
    /// next scheduled tick retries, never an immediate in-place retry.
    async fn cycle(&mut self) {
        match self.send_heartbeat().await {
            Ok(tasks) => {
                for task in tasks {
                    self.execute_task(task).await;
                }
            }
            Err(e) => {
                error!(
                    "heartbeat failed ({} results buffered for retry): {e:#}",
                    self.pending_results.len()
                );
            }
        }
    }

    async fn send_heartbeat(&mut self) -> Result<Vec<Task>> {
        let stats = NodeStats::sample(&mut self.system);
        let body = HeartbeatRequest {
            token: &self.config.token,
            stats: &stats,
            results: &self.pending_results,
        };

        let response = self
            .client
            .post(self.config.heartbeat_url())
            .json(&body)
            .send()
            .await
            .context("kernel unreachable")?;

        let status = response.status();
        if !status.is_success() {
            bail!("kernel answered {status}");
        }

        let parsed: HeartbeatResponse = response
            .json()
            .await
            .context("invalid heartbeat response")?;

        self.pending_results.clear();
        info!("heartbeat OK (cpu: {:.0}%)", stats.cpu);
        Ok(parsed.tasks)
    }

    async fn execute_task(&mut self, task: Task) {
        info!("received task: {}", task.command);

        if task.command == REBOOT_COMMAND {
            self.pending_results.push(CommandResult {
                command: task.command,
                user_id: task.user_id,
                result: "reboot scheduled".to_string(),
            });

            // Force-flush the confirmation out-of-cycle so the kernel sees
            // it before this node goes dark. Tasks returned by this flush
            // are dropped: the node is about to reboot anyway.
            match self.send_heartbeat().await {
                Ok(_) => {}
                Err(e) => warn!("could not flush reboot confirmation: {e:#}"),
            }

            execution::schedule_reboot().await;
        } else {
            let output = execution::run_shell(&task.command, TASK_TIMEOUT_SECS).await;
            self.pending_results.push(CommandResult {
                command: task.command,
                user_id: task.user_id,
                result: output,
            });
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = AgentConfig::from_env().context("invalid agent configuration")?;
    info!("NodeWarden agent starting");

    let mut agent = Agent::new(config)?;
    agent.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_without_tasks_field_parses_empty() {
        let parsed: HeartbeatResponse = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(parsed.tasks.is_empty());
    }

    #[test]
    fn test_response_with_tasks_parses_in_order() {
        let parsed: HeartbeatResponse = serde_json::from_str(
            r#"{"status":"ok","tasks":[{"command":"selftest","user_id":7},{"command":"top","user_id":42}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[0].command, "selftest");
        assert_eq!(parsed.tasks[1].user_id, 42);
    }
}

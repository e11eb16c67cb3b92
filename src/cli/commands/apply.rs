use anyhow::{anyhow, bail, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{warn, Instrument};

use super::form::apply_form_args;
use super::Command;
use crate::cli::FormArgs;
use crate::forms::VehicleClass;
use crate::observability::create_workflow_span;
use crate::shutdown::ShutdownCoordinator;
use crate::status::ApplyStatus;
use crate::telemetry::generate_correlation_id;
use crate::workflow::{EnrollmentWorkflow, Settlement, WorkflowState};

/// Wrong codes tolerated before the command gives up
const MAX_CODE_ATTEMPTS: usize = 3;

pub struct ApplyCommand {
    workflow: EnrollmentWorkflow,
    class: VehicleClass,
    fields: FormArgs,
    code: Option<String>,
}

impl ApplyCommand {
    pub fn new(workflow: EnrollmentWorkflow, class: VehicleClass, fields: FormArgs) -> Self {
        Self {
            workflow,
            class,
            fields,
            code: None,
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    async fn run(&self) -> Result<()> {
        let workflow = &self.workflow;

        if let Err(e) = workflow.load_defaults(self.class).await {
            warn!(error = %e, "Continuing without default data");
        }
        apply_form_args(workflow, self.class, &self.fields).await?;

        let missing = workflow.form(self.class).await.missing_required_fields();
        if !missing.is_empty() {
            println!("⚠️  Missing required fields: {}", missing.join(", "));
        }

        println!("🚀 Submitting {} application...", self.class);
        let mut updates = workflow.subscribe();
        let envelope = match workflow.submit(self.class).await {
            Ok(envelope) => envelope,
            Err(e) => {
                println!("❌ {}", e.user_message());
                return Err(e.into());
            }
        };
        if !envelope.success {
            let status = workflow.status();
            println!("❌ {}", status.message);
            bail!("{}", status.message);
        }
        print_status(&workflow.status());

        if self.class == VehicleClass::Truck {
            if let Some(task_id) = workflow.status().task_id {
                println!("📋 Task id: {task_id}");
            }
            return Ok(());
        }

        self.follow(&mut updates).await
    }

    /// Watch the run until it settles, asking for the SMS code when the
    /// backend waits for one. Ctrl-C abandons the run.
    async fn follow(&self, updates: &mut tokio::sync::watch::Receiver<ApplyStatus>) -> Result<()> {
        let workflow = &self.workflow;
        let shutdown = ShutdownCoordinator::new();
        let signals = shutdown.install_signal_handlers();
        let mut stop = shutdown.subscribe();
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut code_attempts = 0;
        let recheck = workflow.settings().poll_interval;

        let outcome = loop {
            let state = workflow.state().await;
            if let WorkflowState::Settled(settlement) = state {
                break Ok(settlement);
            }

            if state.awaits_verification() {
                let exhausted = code_attempts >= MAX_CODE_ATTEMPTS
                    || (self.code.is_some() && code_attempts > 0);
                if exhausted {
                    break Err(anyhow!("Verification code was not accepted"));
                }
                code_attempts += 1;

                let code = match &self.code {
                    Some(code) => Some(code.clone()),
                    None => tokio::select! {
                        line = prompt_code(&mut stdin) => line?,
                        _ = ShutdownCoordinator::wait_for_shutdown(&mut stop) => {
                            break Err(anyhow!("Interrupted"));
                        }
                    },
                };
                let Some(code) = code else {
                    break Err(anyhow!("No verification code entered"));
                };

                let envelope = workflow.confirm_verify_code(&code).await?;
                print_status(&workflow.status());
                if !envelope.success {
                    continue;
                }
            } else if !workflow.is_polling().await {
                break Err(anyhow!("Progress updates stopped: {}", workflow.status().message));
            }

            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break Err(anyhow!("Status channel closed"));
                    }
                    print_status(&updates.borrow_and_update());
                }
                _ = ShutdownCoordinator::wait_for_shutdown(&mut stop) => {
                    break Err(anyhow!("Interrupted"));
                }
                _ = tokio::time::sleep(recheck) => {}
            }
        };
        signals.abort();

        match outcome {
            Ok(Settlement::Completed) => {
                println!("🎉 {}", workflow.status().message);
                Ok(())
            }
            Ok(Settlement::Failed) => {
                let status = workflow.status();
                println!("❌ Enrollment failed: {}", status.message);
                bail!("Enrollment failed: {}", status.message)
            }
            Err(e) => {
                ShutdownCoordinator::shutdown_workflow(workflow, false).await?;
                println!("🛑 {e}");
                Err(e)
            }
        }
    }
}

impl Command for ApplyCommand {
    async fn execute(&self) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("apply", &correlation_id, self.class.as_str());
        self.run().instrument(span).await
    }
}

fn print_status(status: &ApplyStatus) {
    let marker = if status.is_applying { "⏳" } else { "•" };
    println!("{marker} [{:>3}%] {}", status.progress, status.message);
}

async fn prompt_code(stdin: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    print!("📱 请输入短信验证码: ");
    std::io::stdout().flush()?;
    let line = stdin.next_line().await?;
    Ok(line.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()))
}

use anyhow::Result;

use super::{print_envelope, read_form_fields, Command};
use crate::cli::FormArgs;
use crate::forms::{MergeReport, VehicleClass};
use crate::workflow::EnrollmentWorkflow;

/// Merge `--form` / `--set` input into the workflow's form, reporting
/// fields the form does not have.
pub async fn apply_form_args(
    workflow: &EnrollmentWorkflow,
    class: VehicleClass,
    args: &FormArgs,
) -> Result<MergeReport> {
    let fields = read_form_fields(args)?;
    let report = workflow.update_form(class, fields).await;
    if !report.ignored.is_empty() {
        println!("⚠️  Unknown {} fields ignored: {}", class, report.ignored.join(", "));
    }
    Ok(report)
}

pub struct ShowFormCommand {
    workflow: EnrollmentWorkflow,
    class: VehicleClass,
    fields: FormArgs,
}

impl ShowFormCommand {
    pub fn new(workflow: EnrollmentWorkflow, class: VehicleClass, fields: FormArgs) -> Self {
        Self {
            workflow,
            class,
            fields,
        }
    }
}

impl Command for ShowFormCommand {
    async fn execute(&self) -> Result<()> {
        apply_form_args(&self.workflow, self.class, &self.fields).await?;
        let form = self.workflow.form(self.class).await;

        println!("{}", serde_json::to_string_pretty(&form)?);
        let missing = form.missing_required_fields();
        if !missing.is_empty() {
            println!("📝 Still required: {}", missing.join(", "));
        }
        Ok(())
    }
}

pub struct SaveCommand {
    workflow: EnrollmentWorkflow,
    class: VehicleClass,
    fields: FormArgs,
}

impl SaveCommand {
    pub fn new(workflow: EnrollmentWorkflow, class: VehicleClass, fields: FormArgs) -> Self {
        Self {
            workflow,
            class,
            fields,
        }
    }
}

impl Command for SaveCommand {
    async fn execute(&self) -> Result<()> {
        apply_form_args(&self.workflow, self.class, &self.fields).await?;
        println!("💾 Saving {} form...", self.class);
        let envelope = self.workflow.save_draft(self.class).await?;
        print_envelope(&envelope)
    }
}

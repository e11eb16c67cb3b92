use anyhow::Result;

use super::{print_envelope, Command};
use crate::forms::VehicleClass;
use crate::workflow::EnrollmentWorkflow;

/// One-shot backend queries that print whatever the backend returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Provinces,
    Defaults(VehicleClass),
    PlateLetters(String),
    Operators(VehicleClass),
    Products {
        class: VehicleClass,
        operator: String,
    },
    ServiceStatus(VehicleClass),
    SendCode(String),
}

pub struct LookupCommand {
    workflow: EnrollmentWorkflow,
    lookup: Lookup,
}

impl LookupCommand {
    pub fn new(workflow: EnrollmentWorkflow, lookup: Lookup) -> Self {
        Self { workflow, lookup }
    }
}

impl Command for LookupCommand {
    async fn execute(&self) -> Result<()> {
        let workflow = &self.workflow;
        match &self.lookup {
            Lookup::Provinces => print_envelope(&workflow.load_provinces().await?),
            Lookup::Defaults(class) => print_envelope(&workflow.load_defaults(*class).await?),
            Lookup::PlateLetters(province) => {
                print_envelope(&workflow.plate_letters(province).await?)
            }
            Lookup::Operators(class) => print_envelope(&workflow.operators(*class).await?),
            Lookup::Products { class, operator } => {
                print_envelope(&workflow.products(*class, operator).await?)
            }
            Lookup::ServiceStatus(class) => print_envelope(&workflow.service_status(*class).await?),
            Lookup::SendCode(phone) => {
                println!("📱 Requesting verification code for {phone}...");
                print_envelope(&workflow.request_verification_code(phone).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mocks::{BackendCall, ScriptedBackend};
    use crate::backend::Envelope;
    use crate::workflow::WorkflowSettings;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_products_lookup_passes_operator() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_raw(Ok(Envelope::ok(serde_json::json!([]))));
        let workflow = EnrollmentWorkflow::new(backend.clone(), WorkflowSettings::default());

        LookupCommand::new(
            workflow,
            Lookup::Products {
                class: VehicleClass::Truck,
                operator: "OP7".to_string(),
            },
        )
        .execute()
        .await
        .unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::Products {
                class: VehicleClass::Truck,
                operator_code: "OP7".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_rejected_lookup_fails_command() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_raw(Ok(Envelope::failure("手机号格式不正确")));
        let workflow = EnrollmentWorkflow::new(backend, WorkflowSettings::default());

        let result = LookupCommand::new(workflow, Lookup::SendCode("123".to_string()))
            .execute()
            .await;
        assert!(result.is_err());
    }
}

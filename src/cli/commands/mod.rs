use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::backend::Envelope;
use crate::cli::{Commands, FormArgs};
use crate::workflow::EnrollmentWorkflow;

pub mod apply;
pub mod form;
pub mod lookup;

use apply::ApplyCommand;
use form::{SaveCommand, ShowFormCommand};
use lookup::{Lookup, LookupCommand};

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Dispatch a parsed subcommand against `workflow`
pub async fn run(command: Commands, workflow: EnrollmentWorkflow) -> Result<()> {
    match command {
        Commands::Provinces => LookupCommand::new(workflow, Lookup::Provinces).execute().await,
        Commands::Defaults { class } => {
            LookupCommand::new(workflow, Lookup::Defaults(class)).execute().await
        }
        Commands::PlateLetters { province } => {
            LookupCommand::new(workflow, Lookup::PlateLetters(province))
                .execute()
                .await
        }
        Commands::Operators { class } => {
            LookupCommand::new(workflow, Lookup::Operators(class)).execute().await
        }
        Commands::Products { class, operator } => {
            LookupCommand::new(workflow, Lookup::Products { class, operator })
                .execute()
                .await
        }
        Commands::Status { class } => {
            LookupCommand::new(workflow, Lookup::ServiceStatus(class))
                .execute()
                .await
        }
        Commands::SendCode { phone } => {
            LookupCommand::new(workflow, Lookup::SendCode(phone)).execute().await
        }
        Commands::ShowForm { class, fields } => {
            ShowFormCommand::new(workflow, class, fields).execute().await
        }
        Commands::Save { class, fields } => {
            SaveCommand::new(workflow, class, fields).execute().await
        }
        Commands::Apply {
            class,
            fields,
            code,
        } => {
            ApplyCommand::new(workflow, class, fields)
                .with_code(code)
                .execute()
                .await
        }
    }
}

/// Print `data` of a successful envelope as pretty JSON; a `success: false`
/// answer becomes an error carrying the server message.
pub fn print_envelope<T: Serialize>(envelope: &Envelope<T>) -> Result<()> {
    if !envelope.success {
        let message = envelope.message().unwrap_or("request was not successful");
        println!("❌ {message}");
        bail!("{message}");
    }
    match &envelope.data {
        Some(data) => println!("{}", serde_json::to_string_pretty(data)?),
        None => println!("✅ {}", envelope.message().unwrap_or("OK")),
    }
    Ok(())
}

/// Collect form fields from `--form` and `--set`, later assignments winning.
pub fn read_form_fields(args: &FormArgs) -> Result<BTreeMap<String, String>> {
    let mut fields = match &args.form {
        Some(path) => read_form_file(path)?,
        None => BTreeMap::new(),
    };
    for assignment in &args.set {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected FIELD=VALUE, got '{assignment}'"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Empty field name in '{assignment}'");
        }
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}

fn read_form_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form file {}", path.display()))?;
    let table: BTreeMap<String, serde_json::Value> =
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?
        };

    table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => bail!("Field '{key}' must be a scalar, got {other}"),
            };
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_set_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "name = \"张三\"\naxleCount = 3").unwrap();

        let args = FormArgs {
            form: Some(file.path().to_path_buf()),
            set: vec!["name=李四".to_string(), "vin=LSVAA4182E2184847".to_string()],
        };
        let fields = read_form_fields(&args).unwrap();
        assert_eq!(fields["name"], "李四");
        assert_eq!(fields["axleCount"], "3");
        assert_eq!(fields["vin"], "LSVAA4182E2184847");
    }

    #[test]
    fn test_json_form_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"phone": "13800138000", "tireCount": 6}}"#).unwrap();

        let args = FormArgs {
            form: Some(file.path().to_path_buf()),
            set: vec![],
        };
        let fields = read_form_fields(&args).unwrap();
        assert_eq!(fields["phone"], "13800138000");
        assert_eq!(fields["tireCount"], "6");
    }

    #[test]
    fn test_malformed_assignment() {
        let args = FormArgs {
            form: None,
            set: vec!["name".to_string()],
        };
        assert!(read_form_fields(&args).is_err());
    }

    #[test]
    fn test_nested_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[owner]\nname = \"x\"").unwrap();
        let args = FormArgs {
            form: Some(file.path().to_path_buf()),
            set: vec![],
        };
        assert!(read_form_fields(&args).is_err());
    }

    #[test]
    fn test_failure_envelope_is_an_error() {
        let envelope: Envelope<serde_json::Value> = Envelope::failure("服务暂不可用");
        let err = print_envelope(&envelope).unwrap_err();
        assert_eq!(err.to_string(), "服务暂不可用");
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::forms::VehicleClass;

pub mod commands;

#[derive(Parser)]
#[command(name = "etc-apply")]
#[command(about = "Fill in and submit ETC applications for passenger cars and trucks")]
#[command(long_about = "etc-apply talks to the ETC application backend: it loads reference data, \
                       keeps the application form, submits it and follows the enrollment run \
                       through SMS verification. Start with 'etc-apply show-form' to see the fields.")]
pub struct Cli {
    /// Extra configuration file layered over etc-apply.toml
    #[arg(long, global = true, help = "Configuration file (TOML or JSON)")]
    pub config: Option<PathBuf>,
    /// Override backend.base_url
    #[arg(long, global = true, help = "Backend base URL, e.g. http://127.0.0.1:5000/api")]
    pub base_url: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

/// Form input shared by the commands that send a form
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FormArgs {
    /// TOML or JSON table of field -> value
    #[arg(long, help = "Read form fields from a TOML or JSON file")]
    pub form: Option<PathBuf>,
    /// Single field assignment, repeatable
    #[arg(long = "set", value_name = "FIELD=VALUE", help = "Set one form field (repeatable)")]
    pub set: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all and frequently used plate provinces
    Provinces,
    /// Show default data for a vehicle class
    Defaults {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
    },
    /// List the plate letters available in a province
    PlateLetters {
        /// Province abbreviation, e.g. 京
        province: String,
    },
    /// List card operators
    Operators {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
    },
    /// List an operator's products
    Products {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
        #[arg(long, help = "Operator code from the operators listing")]
        operator: String,
    },
    /// Show backend service status
    Status {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
    },
    /// Request an SMS verification code
    SendCode {
        /// Mobile number the code is sent to
        phone: String,
    },
    /// Print the form that would be sent, after applying --form and --set
    ShowForm {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
        #[command(flatten)]
        fields: FormArgs,
    },
    /// Store the form without starting an enrollment
    Save {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
        #[command(flatten)]
        fields: FormArgs,
    },
    /// Submit the form and follow the enrollment until it settles
    Apply {
        #[arg(long, default_value = "passenger", help = "Vehicle class: passenger or truck")]
        class: VehicleClass,
        #[command(flatten)]
        fields: FormArgs,
        /// SMS code to confirm with instead of prompting
        #[arg(long, help = "Verification code; prompted on stdin when omitted")]
        code: Option<String>,
    },
}

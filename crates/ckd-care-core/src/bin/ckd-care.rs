//! CKD care command line
//!
//! Usage:
//!   ckd-care [--config <file>] [--database <db>] <command>
//!
//!   register-patient --name <name> --email <email>
//!   register-clinician --name <name> --email <email>
//!   predict --patient <id> --input <file|-> [--clinician <id>] [--language en|kn]
//!   recommend --stage <label> [--language en|kn]
//!   patients [--search <text>] [--gender M|F] [--stage <label>] [--risk <level>] ...
//!   detail --patient <id>
//!   analytics [--date-from <date>] [--date-to <date>] [--stage <label>]
//!   quality

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use serde::Serialize;

use ckd_care_core::registry::{ClinicianRegistration, PatientRegistration};
use ckd_care_core::{
    AnalyticsFilter, CareConfig, CkdCare, ClinicalInput, FilterParams, Language, PageRequest,
    PredictionRequest,
};

#[derive(Debug, Parser)]
#[command(
    name = "ckd-care",
    version,
    about = "Chronic Kidney Disease prediction, patient queries and care analytics"
)]
struct Cli {
    /// JSON config file (every field optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Model bundle file, overriding the config
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Print compact JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a patient
    RegisterPatient(RegisterArgs),
    /// Register a clinician
    RegisterClinician(RegisterArgs),
    /// Predict CKD stage from clinical measurements
    Predict(PredictArgs),
    /// Look up the diet and exercise plan for a stage label
    Recommend {
        /// "Stage 1" .. "Stage 5" or "No CKD"
        #[arg(long)]
        stage: String,

        #[arg(long, default_value = "en")]
        language: Language,
    },
    /// List patients with filters and pagination
    Patients(PatientsArgs),
    /// Patient profile with recent predictions and latest recommendation
    Detail {
        #[arg(long)]
        patient: String,
    },
    /// Prediction analytics
    Analytics(AnalyticsArgs),
    /// Report patients with incomplete records
    Quality,
}

#[derive(Debug, Args)]
struct RegisterArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    email: String,
}

#[derive(Debug, Args)]
struct PredictArgs {
    #[arg(long)]
    patient: String,

    /// JSON clinical input; "-" reads stdin
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    clinician: Option<String>,

    #[arg(long, default_value = "en")]
    language: Language,
}

#[derive(Debug, Args)]
struct PatientsArgs {
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    gender: Option<String>,

    #[arg(long)]
    stage: Option<String>,

    #[arg(long)]
    risk: Option<String>,

    #[arg(long)]
    date_from: Option<String>,

    #[arg(long)]
    date_to: Option<String>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = 10)]
    page_size: u32,
}

#[derive(Debug, Args)]
struct AnalyticsArgs {
    #[arg(long)]
    date_from: Option<String>,

    #[arg(long)]
    date_to: Option<String>,

    #[arg(long)]
    stage: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let care = CkdCare::open(load_config(&cli)?)?;
    debug!("Running {:?}", cli.command);

    match cli.command {
        Command::RegisterPatient(args) => {
            let patient = care.register_patient(&PatientRegistration {
                name: args.name,
                email: args.email,
                ..Default::default()
            })?;
            emit(&patient, cli.compact)
        }
        Command::RegisterClinician(args) => {
            let clinician = care.register_clinician(&ClinicianRegistration {
                name: args.name,
                email: args.email,
                ..Default::default()
            })?;
            emit(&clinician, cli.compact)
        }
        Command::Predict(args) => {
            let input = ClinicalInput::from_json(&read_input(&args.input)?)
                .context("invalid clinical input")?;
            let mut request = PredictionRequest::new(args.patient, input).in_language(args.language);
            if let Some(clinician) = args.clinician {
                request = request.by_clinician(clinician);
            }
            emit(&care.predict(&request)?, cli.compact)
        }
        Command::Recommend { stage, language } => {
            emit(&care.resolve_recommendation(&stage, language), cli.compact)
        }
        Command::Patients(args) => {
            let params = FilterParams {
                search: args.search,
                gender: args.gender,
                stage: args.stage,
                risk: args.risk,
                date_from: args.date_from,
                date_to: args.date_to,
            };
            let page = PageRequest::new(args.page, args.page_size)?;
            emit(&care.query_patients(&params, page)?, cli.compact)
        }
        Command::Detail { patient } => emit(&care.patient_detail(&patient)?, cli.compact),
        Command::Analytics(args) => {
            let filter = AnalyticsFilter {
                date_from: args.date_from,
                date_to: args.date_to,
                stage: args.stage,
            };
            emit(&care.analytics(&filter)?, cli.compact)
        }
        Command::Quality => emit(&care.data_quality()?, cli.compact),
    }
}

fn load_config(cli: &Cli) -> Result<CareConfig> {
    let mut config = match &cli.config {
        Some(path) => CareConfig::load(path)?,
        None => {
            let mut config = CareConfig::default();
            config.apply_env();
            config
        }
    };
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    if let Some(model) = &cli.model {
        config.model_bundle_path = Some(model.clone());
    }
    Ok(config)
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    if !path.exists() {
        bail!("input file {} does not exist", path.display());
    }
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn emit<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}

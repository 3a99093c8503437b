//! # Validate Subcommand
//!
//! Runs one institution access attempt against the configured platform
//! (`PLATFORM_URL`, `PLATFORM_ANON_KEY`, `PLATFORM_SERVICE_KEY`) through the
//! same validator the API uses. The attempt is audited like any other.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use dplus_api::access::{messages, AccessReport, AccessRequest, AccessValidator, ValidationStrategy};
use dplus_api::directory::PlatformDirectory;
use dplus_api::extractors::{ClientContext, Validate};
use dplus_api::middleware::metrics::ApiMetrics;
use dplus_api::middleware::rate_limit::AttemptLimiter;
use dplus_platform_client::{PlatformClient, PlatformConfig};

/// Arguments for the `dplus validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Institution code given by the patient.
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    /// Birth date, `YYYY-MM-DD`.
    #[arg(long)]
    pub birth_date: Option<String>,
    /// Recorded in the audit row.
    #[arg(long, default_value = "dplus-cli")]
    pub accessor_name: String,
    #[arg(long)]
    pub accessor_institution: Option<String>,
    /// hybrid, authority_only or fallback_only.
    #[arg(long, default_value = "hybrid")]
    pub strategy: ValidationStrategy,
}

impl ValidateArgs {
    fn to_request(&self) -> AccessRequest {
        AccessRequest {
            code: self.code.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            birth_date: self.birth_date.clone(),
            accessor_name: Some(self.accessor_name.clone()),
            accessor_institution: self.accessor_institution.clone(),
        }
    }
}

/// Execute the validate subcommand. Exit code 3 means access was refused.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let request = args.to_request();
    request
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid submission: {e}"))?;

    let config = PlatformConfig::from_env().context("platform is not configured")?;
    let client = PlatformClient::new(config).context("building the platform client")?;
    let validator = AccessValidator::new(
        Arc::new(PlatformDirectory::new(client)),
        args.strategy,
        AttemptLimiter::default(),
        ApiMetrics::new(),
        None,
    );

    let report = crate::runtime()?
        .block_on(async { validator.validate(&request, &ClientContext::default()).await });

    println!("{}", serde_json::to_string_pretty(&summarize(&report))?);
    Ok(if report.result.is_ok() { 0 } else { 3 })
}

fn summarize(report: &AccessReport) -> serde_json::Value {
    let path = report.path.map(|p| p.as_str());
    match &report.result {
        Ok(grant) => json!({
            "outcome": report.outcome(),
            "message": messages::granted(grant.patients.len()),
            "validation_path": path,
            "audit_recorded": report.audit_recorded,
            "patients": grant.patients.iter().map(|p| json!({
                "user_id": p.profile.id,
                "first_name": p.profile.first_name,
                "last_name": p.profile.last_name,
                "directives": p.directives.len(),
                "documents": p.documents.len(),
            })).collect::<Vec<_>>(),
        }),
        Err(failure) => {
            let message = messages::for_failure(failure);
            json!({
                "outcome": report.outcome(),
                "message": message.message,
                "hints": message.hints,
                "validation_path": path,
                "audit_recorded": report.audit_recorded,
            })
        }
    }
}

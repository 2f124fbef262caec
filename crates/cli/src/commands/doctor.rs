use std::time::Instant;

use bitrix_mcp_client::{BitrixApi, HttpBitrixClient, Params};
use bitrix_mcp_core::config::{AppConfig, LoadOptions};
use bitrix_mcp_core::Catalog;
use serde::Serialize;

use super::{escape_json, CommandResult};

/// Cheapest authenticated method; answers with the calling user.
const PROBE_METHOD: &str = "profile";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = vec![check_catalog()];

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_portal_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "portal_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog() -> DoctorCheck {
    let catalog = Catalog::standard();
    DoctorCheck {
        name: "tool_catalog",
        status: if catalog.is_empty() { CheckStatus::Fail } else { CheckStatus::Pass },
        details: format!("{} tools registered", catalog.len()),
    }
}

fn check_portal_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "portal_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let auth_mode = config.bitrix.auth().map(|auth| auth.mode()).unwrap_or("unconfigured");
    let started = Instant::now();
    let result = runtime.block_on(async {
        let client = HttpBitrixClient::from_config(&config.bitrix)?;
        client.call(PROBE_METHOD, Params::new()).await
    });
    let elapsed_ms = started.elapsed().as_millis();

    match result {
        Ok(_) => DoctorCheck {
            name: "portal_connectivity",
            status: CheckStatus::Pass,
            details: format!("`{PROBE_METHOD}` answered in {elapsed_ms} ms ({auth_mode} auth)"),
        },
        Err(error) => DoctorCheck {
            name: "portal_connectivity",
            status: CheckStatus::Fail,
            details: format!("`{PROBE_METHOD}` failed after {elapsed_ms} ms: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

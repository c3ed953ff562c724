//! # qgate Probe
//!
//! Wires one rate limiter, one cache and one access client, checks that the
//! configured server is reachable and the token is accepted, then prints a
//! JSON report on stdout.

use std::process::ExitCode;

use qgate_core::ports::QueryParams;
use qgate_core::AccessResult;
use qgate_shared::{ApiResponse, ErrorResponse};
use serde_json::Value;

mod config;
mod report;
mod state;
mod telemetry;

use config::AppConfig;
use report::ProbeReport;
use state::AppState;
use telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            print_json(&ErrorResponse::from_access_error(&e))?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let state = AppState::new(&config).await?;
    let outcome = probe(&state).await;
    state.shutdown().await;

    match outcome {
        Ok(report) => {
            let healthy = report.reachable && report.authenticated;
            print_json(&ApiResponse::ok(report))?;
            Ok(if healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Probe failed");
            print_json(&ErrorResponse::from_access_error(&e))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn probe(state: &AppState) -> AccessResult<ProbeReport> {
    let reachable = state.client.validate_connection().await;
    if !reachable {
        tracing::warn!("Server did not report status UP");
    }

    let authenticated = state.client.authenticate().await?;

    let project_count = if authenticated {
        let query: QueryParams = [("ps".to_string(), "1".to_string())].into_iter().collect();
        let cache_params = report::cache_params(&query);
        let projects: Value = state
            .cache
            .get_or_fetch("projects", "search", Some(&cache_params), None, || {
                state.client.get("projects/search", Some(query))
            })
            .await?;
        report::project_count(&projects)
    } else {
        None
    };

    Ok(ProbeReport {
        checked_at: chrono::Utc::now(),
        base_url: state.client.base_url().to_string(),
        reachable,
        authenticated,
        project_count,
        rate_limit: state.rate_limiter.status(),
        cache: state.cache.stats().await,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! One-shot status check for a provider reference.
//!
//! Usage: `verify_payment <env> <reference>` with the bearer token in
//! `PAYMENT_BEARER_TOKEN` (and optionally `PAYMENT_TENANT_ID`).
//!
//! Exit codes: 0 completed, 1 failed, 2 still pending or inconclusive.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use payment_lifecycle::config::AppConfig;
use payment_lifecycle::payment::PollObservation;
use payment_lifecycle::rail::{HttpRail, PaymentRail, RailStatus};
use payment_lifecycle::session::Session;
use tracing::info;

const TOKEN_VAR: &str = "PAYMENT_BEARER_TOKEN";
const TENANT_VAR: &str = "PAYMENT_TENANT_ID";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args: Vec<String> = std::env::args().collect();
    let (env, reference) = match args.as_slice() {
        [_, env, reference] => (env.as_str(), reference.as_str()),
        _ => bail!("usage: verify_payment <env> <reference>"),
    };

    let config = AppConfig::load(env).with_context(|| format!("loading config for {}", env))?;
    let _log_guard = payment_lifecycle::logging::init_logging(&config);
    info!(git_hash = env!("GIT_HASH"), env, "verify_payment starting");

    let token = std::env::var(TOKEN_VAR).with_context(|| format!("{} is not set", TOKEN_VAR))?;
    let session = Arc::new(Session::new());
    session.init(token, std::env::var(TENANT_VAR).ok());

    let rail = HttpRail::new(&config.rail, session).context("building rail client")?;
    let observation = PollObservation::from_result(rail.payment_status(reference).await);

    let code = match &observation {
        PollObservation::Reported(RailStatus::Succeeded) => {
            println!("{}: COMPLETED", reference);
            0
        }
        PollObservation::Reported(RailStatus::Failed { reason }) => {
            println!("{}: FAILED ({})", reference, reason);
            1
        }
        PollObservation::Reported(RailStatus::InProgress { raw }) => {
            println!("{}: PENDING ({})", reference, raw);
            2
        }
        PollObservation::Inconclusive(error) => {
            println!("{}: UNKNOWN ({})", reference, error);
            2
        }
    };
    info!(reference, ?observation, "verify_payment finished");
    Ok(ExitCode::from(code))
}

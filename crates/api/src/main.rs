use anyhow::{Context, bail};
use serde::Serialize;

use callboard_api::{ApiConfig, Dashboard, HttpBackend, RefreshOutcome};
use callboard_auth::{SessionManager, SqliteSessionStore};
use callboard_core::AgentKey;
use callboard_views::Period;

const USAGE: &str = "usage: callboard <command>

commands:
  show                          refresh and print the dashboard (default)
  login <username> <password>
  logout
  impersonate-team <username>
  impersonate-agent <username>
  return                        go back one impersonation level
  history <today|week|month>
  set-rate <agent-id|name> <rate>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    callboard_observability::init();

    let config = ApiConfig::from_env()?;
    let store = match &config.session_db_path {
        Some(path) => SqliteSessionStore::open(path).await,
        None => SqliteSessionStore::open_default().await,
    }
    .context("opening session store")?;

    let backend = HttpBackend::new(&config)?;
    let session = SessionManager::new(backend.clone(), store);
    session.restore().await;
    let dashboard = Dashboard::new(backend, session.subscribe());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        [] | ["show"] => show(&dashboard).await?,
        ["login", username, password] => {
            let identity = session.login(username, password).await?;
            println!("logged in as {} ({})", identity.username, identity.role);
            show(&dashboard).await?;
        }
        ["logout"] => {
            session.logout().await;
            println!("logged out");
        }
        ["impersonate-team", username] => {
            session.impersonate_team(username).await?;
            show(&dashboard).await?;
        }
        ["impersonate-agent", username] => {
            session.impersonate_agent(username).await?;
            show(&dashboard).await?;
        }
        ["return"] => match session.return_to_previous().await? {
            Some(identity) => {
                println!("back to {} ({})", identity.username, identity.role);
                show(&dashboard).await?;
            }
            None => println!("not impersonating anyone"),
        },
        ["history", period] => {
            let period = match *period {
                "today" => Period::Today,
                "week" => Period::Week,
                "month" => Period::Month,
                other => bail!("unknown period {other:?}\n\n{USAGE}"),
            };
            print_json(&dashboard.history(period).await?)?;
        }
        ["set-rate", agent, rate] => {
            let key = match agent.parse::<u64>() {
                Ok(id) => AgentKey::Id(id),
                Err(_) => AgentKey::Name(agent.to_string()),
            };
            let rate: f64 = rate.parse().with_context(|| format!("invalid rate {rate:?}"))?;
            dashboard.refresh().await;
            dashboard.update_hourly_rate(&key, rate).await?;
            println!("hourly rate for {key} set to {rate}");
        }
        _ => bail!("{USAGE}"),
    }
    Ok(())
}

async fn show<B: callboard_api::Backend>(dashboard: &Dashboard<B>) -> anyhow::Result<()> {
    match dashboard.refresh().await {
        RefreshOutcome::Unauthenticated => bail!("not logged in; run `callboard login`"),
        RefreshOutcome::Degraded(err) => eprintln!("warning: showing stale data: {err}"),
        RefreshOutcome::Applied | RefreshOutcome::Stale => {}
    }
    print_json(&dashboard.state().await)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use crate::{
    operator::Terminal,
    reconciler::{Outcome, Reconciler, Summary},
    registrar::{regru::RegRuClient, ApiResult},
    settings::Settings,
};
use tracing::{error, info};

mod operator;
mod reconciler;
mod registrar;
mod settings;

build_info::build_info!(fn build_info);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Settings::new()?;

    let builder = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(cfg.log_level()?)
        .with_writer(std::io::stderr);
    if cfg.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!(version = %build_info().crate_info.version, "starting");

    if let Err(e) = run(cfg).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(mut cfg: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let desired = cfg.desired_state()?;
    let client = RegRuClient::new(cfg.api_url.as_str(), cfg.request_timeout()?)?;
    info!(api = %client.base_url(), "using registrar API");
    let reconciler = Reconciler::new(client, desired);

    println!("{}", "=".repeat(60));
    println!("🚀 {} DNS Configuration", reconciler.desired().domain.to_uppercase());
    println!("{}", "=".repeat(60));

    let terminal = Terminal;
    let outcome = match cfg.credentials() {
        Some(creds) => reconciler.run(&creds, &terminal).await?,
        None => reconciler.run(&terminal, &terminal).await?,
    };

    match outcome {
        Outcome::Cancelled => Ok(()),
        Outcome::Applied(summary) => {
            report(&reconciler.desired().domain, &summary);
            Ok(())
        }
    }
}

fn report(domain: &str, summary: &Summary) {
    if let ApiResult::Success(records) = &summary.records {
        println!();
        println!("📋 Current DNS Records:");
        for record in records {
            println!("  - {}", record);
        }
    }

    let failed = [&summary.cleared, &summary.root_record, &summary.www_record]
        .iter()
        .filter(|r| !r.is_success())
        .count();
    if failed > 0 {
        println!();
        println!("⚠️  {} of 3 zone changes reported an error, review the records above.", failed);
    }

    println!();
    println!("{}", "=".repeat(60));
    println!("✅ DNS Configuration Complete!");
    println!("{}", "=".repeat(60));
    println!();
    println!("📝 Next Steps:");
    println!("1. Wait 10-30 minutes for DNS propagation");
    println!("2. Add the domain {} in the hosting provider's dashboard", domain);
    println!("3. The provider will provision SSL certificates once DNS resolves");
    println!();
    println!("🌐 Your site will be available at:");
    println!("   https://{}", domain);
    println!("   https://www.{}", domain);
}

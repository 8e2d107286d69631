use clap::Parser;
use psl_stitch::config::{Command, CreateArgs, ServeArgs};
use psl_stitch::domain::model::MetaParameters;
use psl_stitch::utils::{logger, validation::Validate};
use psl_stitch::{CliConfig, ComputeStudioProvider, Settings, StitchEngine};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    match config.command {
        Command::Serve(args) => serve(args, config.verbose).await,
        Command::Create(args) => {
            logger::init_cli_logger(config.verbose);
            create(args).await
        }
    }
}

async fn serve(args: ServeArgs, verbose: bool) -> anyhow::Result<()> {
    logger::init_server_logger(verbose, args.json_logs);
    tracing::info!("Starting psl-stitch API");

    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::from_env()?,
    };
    tracing::debug!("Settings: {:?}", settings);

    // 驗證配置
    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    psl_stitch::server::serve(settings).await
}

async fn create(args: CreateArgs) -> anyhow::Result<()> {
    if let Err(e) = args.validate() {
        tracing::error!("❌ Invalid arguments: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let poll_interval = Duration::from_secs(args.poll_interval);
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let engine = StitchEngine::new(
        ComputeStudioProvider::new(http, &args.cs_base_url),
        MetaParameters { year: args.year },
    );

    let token = Some(args.token.as_str());
    let mut outcome = match engine.create_simulations(&args.raw_params(), token).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("❌ {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    for failure in &outcome.failed {
        eprintln!("⚠️ {}: {}", failure.app, failure.message);
    }

    if args.wait && !outcome.created.is_empty() {
        let deadline = Instant::now() + Duration::from_secs(args.wait_timeout);
        loop {
            engine.update_ready(&mut outcome.created, token).await?;
            let ready = StitchEngine::<ComputeStudioProvider>::is_ready(&outcome.created);
            // FAIL 的模擬不會再變成 ready
            let pending: Vec<String> = outcome
                .created
                .iter()
                .filter(|sim| sim.status != "FAIL")
                .map(|sim| sim.app.to_string())
                .filter(|app| !ready.get(app).copied().unwrap_or(false))
                .collect();
            if pending.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                anyhow::bail!("Timed out waiting for {:?}", pending);
            }
            tracing::info!("⏳ Waiting for {} simulation(s)", pending.len());
            tokio::time::sleep(poll_interval).await;
        }
        engine.update_results(&mut outcome.created, token).await?;
        tracing::info!("✅ All simulations finished");
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use chrono::Utc;
use skyguard_core::config::{load_config, workspace_config_path, write_default_config};
use skyguard_core::incident_log::CountermeasureOutcome;
use skyguard_core::notifier::AlertContext;
use skyguard_core::{
    BoundingBox, DetectionEvent, EdgeEvaluator, Notifier, PipelineStats, ResponseService,
    SkyguardConfig, ThreatClassifier, ThreatLevel, TriggerClient,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => handle_serve(workspace, host, port).await,
        Commands::Evaluate {
            confidence,
            class_name,
            bbox,
            trigger,
        } => handle_evaluate(workspace, confidence, &class_name, &bbox, trigger).await,
        Commands::Watch { file, no_trigger } => {
            handle_watch(workspace, file.as_deref(), no_trigger).await
        }
        Commands::TestAlert => handle_test_alert(workspace).await,
        Commands::Config { action } => handle_config(action, workspace).await,
    }
}

fn load(workspace: &Path) -> anyhow::Result<SkyguardConfig> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config.validate()?;
    for warning in config.warnings() {
        warn!("{warning}");
    }
    Ok(config)
}

async fn handle_serve(
    workspace: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load(workspace)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let orchestrator = Arc::new(config.build_orchestrator()?);
    info!(
        low = config.thresholds.low,
        medium = config.thresholds.medium,
        high = config.thresholds.high,
        workers = orchestrator.max_concurrent(),
        "Response service starting"
    );
    let service = Arc::new(ResponseService::new(orchestrator));
    skyguard_core::gateway::run_gateway(service, &config.gateway).await?;
    info!("Response service stopped");
    Ok(())
}

/// Parse `x1,y1,x2,y2`.
fn parse_bbox(value: &str) -> anyhow::Result<BoundingBox> {
    let coords = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("Invalid bounding box '{value}': {e}"))?;
    let [x1, y1, x2, y2] = coords[..] else {
        anyhow::bail!(
            "Bounding box needs exactly 4 values, got {}",
            coords.len()
        );
    };
    Ok(BoundingBox::new(x1, y1, x2, y2)?)
}

async fn handle_evaluate(
    workspace: &Path,
    confidence: f64,
    class_name: &str,
    bbox: &str,
    trigger: bool,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let classifier = ThreatClassifier::new(config.thresholds)?;
    let event = DetectionEvent::new(class_name, confidence, parse_bbox(bbox)?, Utc::now())?;
    let evaluation = classifier.evaluate(&event);

    println!("Class:      {}", event.class_name());
    println!("Confidence: {:.2}%", event.confidence() * 100.0);
    println!("Location:   {}", event.bbox());
    println!("Level:      {}", evaluation.level());
    println!("Action:     {}", evaluation.action());
    println!("Escalate:   {}", evaluation.escalate());

    if !trigger {
        return Ok(());
    }
    if !evaluation.escalate() {
        println!("Trigger:    not sent (below escalation threshold)");
        return Ok(());
    }

    let client = TriggerClient::new(&config.trigger)?;
    match client.send(&event).await {
        Ok(ack) => {
            println!("Trigger:    {} ({})", ack.status, ack.message);
            if let Some(actions) = ack.actions {
                println!(
                    "Response:   jammer={:?} email_alert={:?}",
                    actions.jammer, actions.email_alert
                );
            }
        }
        // Soft failure: reported, never retried.
        Err(e) => println!("Trigger:    failed ({e})"),
    }
    Ok(())
}

/// Feed JSON-lines detections through `edge`. Returns the number of rejected lines.
async fn run_feed<R>(reader: R, edge: &EdgeEvaluator) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut rejected = 0;
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DetectionEvent>(line) {
            Ok(event) => {
                edge.process(event);
            }
            Err(e) => {
                rejected += 1;
                warn!(line = line_no, error = %e, "Skipping invalid detection");
            }
        }
    }
    edge.drain().await;
    Ok(rejected)
}

async fn handle_watch(
    workspace: &Path,
    file: Option<&Path>,
    no_trigger: bool,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let mut edge = EdgeEvaluator::new(ThreatClassifier::new(config.thresholds)?);
    if !no_trigger {
        edge = edge.with_trigger(TriggerClient::new(&config.trigger)?);
    }

    let rejected = match file {
        Some(path) => {
            let f = tokio::fs::File::open(path)
                .await
                .map_err(|e| anyhow::anyhow!("Cannot open {}: {e}", path.display()))?;
            run_feed(BufReader::new(f), &edge).await?
        }
        None => run_feed(BufReader::new(tokio::io::stdin()), &edge).await?,
    };

    print_stats(&edge.stats(), rejected)?;
    Ok(())
}

fn print_stats(stats: &PipelineStats, rejected: usize) -> anyhow::Result<()> {
    let mut summary = serde_json::to_value(stats)?;
    summary["rejected"] = serde_json::json!(rejected);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn handle_test_alert(workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let notifier = Notifier::smtp(config.notifier.clone());
    let event = DetectionEvent::new(
        "drone",
        0.92,
        BoundingBox::new(150.0, 100.0, 450.0, 400.0)?,
        Utc::now(),
    )?;
    let ctx = AlertContext {
        event: &event,
        level: ThreatLevel::High,
        countermeasure: CountermeasureOutcome::Skipped,
    };

    match notifier.try_send(&ctx).await {
        Ok(_) => {
            println!("Test alert sent to {}", config.notifier.recipient);
            Ok(())
        }
        Err(e) => anyhow::bail!("Test alert failed ({}): {e}", e.category()),
    }
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = write_default_config(workspace)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config.redacted())?;
            println!("{}", toml_str);
            Ok(())
        }
        ConfigAction::Validate => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            config.validate()?;
            let warnings = config.warnings();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration is valid with {} warning(s):", warnings.len());
                for w in warnings {
                    println!("  - {w}");
                }
            }
            Ok(())
        }
    }
}

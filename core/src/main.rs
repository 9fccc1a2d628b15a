use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use obliterator::config::Settings;
use obliterator::crypto::{Certificate, SigningKey};
use obliterator::drives::{CommandEraser, PreflightOptions};
use obliterator::engine::DeviceLockTable;
use obliterator::io::FileDeviceAccess;
use obliterator::ui::{
    human_bytes, progress_channel, Fanout, ProgressFile, ProgressSink, TerminalProgress,
};
use obliterator::wipe_orchestrator::WipeOutcome;
use obliterator::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "obliterator")]
#[command(about = "Media sanitization with signed certificates of destruction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Extra configuration file layered over the system and user files
    #[arg(long, global = true, env = "OBLITERATOR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sanitization plan for a device descriptor without touching it
    Plan {
        /// DeviceDescriptor JSON file
        descriptor: PathBuf,

        /// Overwrite pass count (1-20), applies to overwrite plans only
        #[arg(long)]
        passes: Option<u32>,
    },

    /// Sanitize a device and write its signed certificate
    Wipe {
        /// DeviceDescriptor JSON file
        descriptor: PathBuf,

        /// Overwrite pass count (1-20)
        #[arg(long)]
        passes: Option<u32>,

        /// Fall back to multi-pass overwrite if the hardware method fails
        #[arg(long)]
        allow_fallback: bool,

        /// PKCS#8 private key used to sign the certificate
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Directory for the certificate and detached signature
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Proceed even if the device has mounted partitions
        #[arg(long)]
        allow_mounted: bool,

        /// Accept a regular file as the target (disk images)
        #[arg(long)]
        allow_regular_file: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Sign an unsigned certificate JSON file
    Sign {
        /// Unsigned certificate JSON file
        certificate: PathBuf,

        /// PKCS#8 private key
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Directory for the signed certificate and detached signature
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Verify a signed certificate. Exit code 0 trusted, 1 untrusted, 2 error
    Verify {
        /// Certificate JSON file
        certificate: PathBuf,

        /// Public key to verify against; no other key is tried
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Directory searched for public keys
        #[arg(long)]
        keys_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            2
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let settings = Settings::load(cli.config.as_deref())?;

    // File logging only for destructive runs; the guard flushes on drop
    let log_dir = matches!(cli.command, Commands::Wipe { .. }).then(|| settings.log_dir());
    let _guard = init_tracing(cli.debug, log_dir.as_deref());

    match cli.command {
        Commands::Plan { descriptor, passes } => plan(&descriptor, passes.or(settings.pass_count)),
        Commands::Wipe {
            descriptor,
            passes,
            allow_fallback,
            key,
            output_dir,
            allow_mounted,
            allow_regular_file,
            yes,
        } => {
            let mut settings = settings;
            if passes.is_some() {
                settings.pass_count = passes;
            }
            settings.allow_fallback |= allow_fallback;
            if key.is_some() {
                settings.signing_key = key;
            }
            if let Some(dir) = output_dir {
                settings.output_dir = dir;
            }
            let preflight = PreflightOptions {
                allow_mounted,
                allow_regular_file,
                ..PreflightOptions::default()
            };
            wipe(&descriptor, settings, preflight, yes).await
        }
        Commands::Sign {
            certificate,
            key,
            output_dir,
        } => {
            let key = key
                .or_else(|| settings.signing_key.clone())
                .context("no signing key given (--key or signing_key in config)")?;
            sign(
                &certificate,
                &key,
                output_dir.as_deref().unwrap_or(&settings.output_dir),
            )
        }
        Commands::Verify {
            certificate,
            key,
            keys_dir,
        } => verify(
            &certificate,
            key.as_deref(),
            keys_dir.unwrap_or_else(|| settings.keys_dir.clone()),
        ),
    }
}

fn init_tracing(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir.map(|dir| (dir, std::fs::create_dir_all(dir))) {
        Some((dir, Ok(()))) => {
            let appender = tracing_appender::rolling::daily(dir, "obliterator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Some((dir, Err(e))) => {
            eprintln!(
                "{} cannot create log directory {}: {}",
                "Warning:".yellow(),
                dir.display(),
                e
            );
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .init();
    guard
}

fn read_descriptor(path: &Path) -> Result<DeviceDescriptor> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing descriptor {}", path.display()))
}

fn plan(descriptor: &Path, passes: Option<u32>) -> Result<i32> {
    let device = read_descriptor(descriptor)?;
    let plan = MethodSelector::select_with_passes(&device, passes)?;

    println!("{}", "Sanitization plan".bold());
    println!("  Device:     {} ({} {})", device.path, device.model, device.serial);
    println!("  Media:      {} over {}", device.media_type(), device.interface);
    println!("  Capacity:   {}", human_bytes(device.capacity_bytes as f64));
    println!("  Method:     {} ({:?})", plan.method.to_string().cyan(), plan.method.category());
    println!("  Passes:     {}", plan.total_passes());
    println!("  Confidence: {:?}", plan.confidence);
    println!("  Rationale:  {}", plan.rationale);
    println!();
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(0)
}

async fn wipe(
    descriptor: &Path,
    settings: Settings,
    preflight: PreflightOptions,
    assume_yes: bool,
) -> Result<i32> {
    let device = read_descriptor(descriptor)?;
    let key_path = settings
        .signing_key
        .clone()
        .context("no signing key given (--key or signing_key in config)")?;
    let key = SigningKey::load(&key_path)?;
    let plan = MethodSelector::select_with_passes(&device, settings.pass_count)?;

    println!("{}", "=== Sanitization ===".bold());
    println!("Device:   {} ({} {})", device.path, device.model, device.serial);
    println!("Capacity: {}", human_bytes(device.capacity_bytes as f64));
    println!("Method:   {} x{}", plan.method.to_string().cyan(), plan.total_passes());
    println!("Reason:   {}", plan.rationale);

    if !assume_yes {
        println!(
            "\n{}",
            format!("ALL DATA ON {} WILL BE DESTROYED.", device.path).red().bold()
        );
        print!("Type 'DESTROY' to confirm: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim() != "DESTROY" {
            println!("Aborted.");
            return Ok(1);
        }
    }

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone())?;

    let (publisher, receiver) = progress_channel(settings.progress_buffer);
    let mut sinks = Fanout::new().with(Arc::new(TerminalProgress::new(40)));
    if let Some(path) = &settings.progress_file {
        sinks = sinks.with(Arc::new(ProgressFile::new(path)));
    }
    let renderer = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            while let Some(event) = receiver.recv() {
                sinks.emit(&event);
            }
            receiver.dropped()
        })?;

    let engine = SanitizationEngine::new(
        settings.engine_config()?,
        Arc::new(CommandEraser::new(settings.ata_password.clone())),
        Arc::new(FileDeviceAccess),
        DeviceLockTable::new(),
    )
    .with_progress(Arc::new(publisher));
    let orchestrator = WipeOrchestrator::new(engine, settings.operator.clone(), &settings.output_dir)
        .with_preflight(preflight)
        .with_pass_override(settings.pass_count)
        .with_signing_key(key);

    // Dropping the orchestrator closes the progress channel
    let outcome = tokio::task::spawn_blocking(move || orchestrator.execute(&device, &cancel))
        .await
        .context("sanitization task panicked")??;

    match renderer.join() {
        Ok(dropped) if dropped > 0 => {
            tracing::debug!(dropped, "progress events dropped by slow renderer")
        }
        Ok(_) => {}
        Err(_) => tracing::warn!("progress renderer panicked"),
    }

    report_outcome(&outcome);
    Ok(if outcome.is_attested() { 0 } else { 1 })
}

fn report_outcome(outcome: &WipeOutcome) {
    let job = &outcome.job;
    println!();
    for record in job.pass_records() {
        println!(
            "  pass {:>2}  {:<14} {:>12}  {}/s",
            record.pass_number,
            record.pattern_kind.to_string(),
            human_bytes(record.bytes_written as f64),
            human_bytes(record.throughput_bytes_per_sec)
        );
    }

    if let Some(from) = job.fallback_from() {
        println!("{} {} failed, completed with overwrite", "Fallback:".yellow(), from);
    }

    match (job.state(), job.verification()) {
        (JobState::Completed, Some(v)) => {
            let outcome_text = match v.outcome {
                VerificationOutcome::Pass => "PASS".green().bold(),
                VerificationOutcome::Fail => "FAIL".red().bold(),
                VerificationOutcome::Unknown => "UNKNOWN".yellow().bold(),
            };
            println!("{} verification {} ({})", "Completed:".green().bold(), outcome_text, v.notes);
        }
        _ => {
            let reason = job
                .failure()
                .map(|f| format!("{} ({})", f.message, f.kind))
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} {}", "Failed:".red().bold(), reason);
            if job.is_cancelled() {
                println!("{}", "Device was NOT sanitized.".red());
            }
        }
    }

    if let (Some(json), Some(sig)) = (&outcome.certificate_path, &outcome.signature_path) {
        println!("Certificate: {}", json.display());
        println!("Signature:   {}", sig.display());
    }

    if let Some(err) = &outcome.attestation_error {
        println!(
            "{} device {} was sanitized (operation {}) but NO certificate was issued: {}",
            "Attestation failed:".red().bold(),
            job.device_path(),
            job.operation_id(),
            err
        );
        // Keep the signed document somewhere the operator can capture it
        if let Some(signed) = &outcome.certificate {
            match signed.to_json_pretty() {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "could not render unsaved certificate"),
            }
        }
    }
}

fn sign(certificate: &Path, key: &Path, output_dir: &Path) -> Result<i32> {
    let raw = std::fs::read(certificate)
        .with_context(|| format!("reading {}", certificate.display()))?;
    let certificate = Certificate::from_json(&raw)?;
    let key = SigningKey::load(key)?;

    let signed = SignatureService::new(None).sign(certificate, &key)?;
    let (json, sig) = signed.write_to_dir(output_dir)?;
    println!("{} {}", "Signed:".green().bold(), json.display());
    println!("Signature: {}", sig.display());
    Ok(0)
}

fn verify(certificate: &Path, key: Option<&Path>, keys_dir: PathBuf) -> Result<i32> {
    let service = SignatureService::new(Some(keys_dir));
    let report = service.verify_file(certificate, key)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_trusted() {
        eprintln!("{}", "Certificate is trusted".green().bold());
    } else {
        eprintln!("{} {:?}", "Certificate is NOT trusted:".red().bold(), report.outcome);
        for problem in &report.field_errors {
            eprintln!("  - {}", problem);
        }
    }
    Ok(report.exit_code())
}

fn setup_signal_handlers(cancel: CancellationToken) -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new(&[SIGINT])?;
    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                if cancel.is_cancelled() {
                    eprintln!("\nSecond interrupt, exiting. Device NOT sanitized.");
                    std::process::exit(130);
                }
                eprintln!("\n\nInterrupt received, stopping after the current pass...");
                cancel.cancel();
            }
        }
    });
    Ok(())
}


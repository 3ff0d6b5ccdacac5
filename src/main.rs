use clap::Parser;
use logcustody::archiver::Archiver;
use logcustody::cli::{Cli, Command};
use logcustody::config::Config;
use logcustody::crypto::load_or_generate_identity;
use logcustody::engine::EngineScheduler;
use logcustody::ingest::IngestListener;
use logcustody::metadata::{FileMetadataStore, MetadataStore};
use logcustody::resolver::{DeviceMap, DeviceResolver};
use logcustody::retention::RetentionSweeper;
use logcustody::reporter::Reporter;
use logcustody::signer::Signer;
use logcustody::verifier::Verifier;
use logcustody::writer::WriterPool;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    let store: Arc<dyn MetadataStore> = Arc::new(FileMetadataStore::open(&config.state_path)?);

    match cli.command {
        Command::Serve => serve(config, store),
        Command::Sign => {
            let signer = build_signer(&config, store)?;
            let touched = signer.sweep()?;
            tracing::info!(count = touched.len(), "signer sweep complete");
            Ok(())
        }
        Command::Archive => {
            let archiver = Archiver::new(config, store);
            let results = archiver.sweep()?;
            tracing::info!(count = results.len(), "archiver sweep complete");
            Ok(())
        }
        Command::Verify { path } => verify_path(&config, store, &path),
        Command::Retain => {
            let sweeper = RetentionSweeper::new(store);
            let result = sweeper.sweep(chrono::Utc::now().date_naive())?;
            tracing::info!(deleted = result.deleted, "retention sweep complete");
            Ok(())
        }
        Command::Report { from, to } => {
            let reporter = Reporter::new(store);
            let report = reporter.generate(from, to)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn build_signer(config: &Config, store: Arc<dyn MetadataStore>) -> anyhow::Result<Signer> {
    let identity = load_or_generate_identity(&config.cert_path, &config.private_key_path, config.rsa_key_size)?;
    Ok(Signer::new(config.clone(), identity, store))
}

fn verify_path(config: &Config, store: Arc<dyn MetadataStore>, path: &std::path::Path) -> anyhow::Result<()> {
    let verifier = Verifier::new(store);
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let result = verifier.verify_archive(path)?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let identity = load_or_generate_identity(&config.cert_path, &config.private_key_path, config.rsa_key_size)?;
        let result = verifier.verify_signature(path, &identity.certificate_der)?;
        println!(
            "{{\"file_hash_match\": {}, \"signature_valid\": {}}}",
            result.file_hash_match, result.signature_valid
        );
    }
    Ok(())
}

fn serve(config: Config, store: Arc<dyn MetadataStore>) -> anyhow::Result<()> {
    tracing::info!(port = config.syslog_port, "starting log custody pipeline");

    let resolver = Arc::new(DeviceResolver::new(DeviceMap::default()));
    let writer_pool = WriterPool::new(&config);

    let listener = IngestListener::bind(config.syslog_port, resolver, writer_pool.clone())?;
    let listener_shutdown = listener.shutdown_handle();
    let listener_handle = std::thread::spawn(move || listener.run());

    let identity = load_or_generate_identity(&config.cert_path, &config.private_key_path, config.rsa_key_size)?;
    let signer = Arc::new(Signer::new(config.clone(), identity, store.clone()));
    let archiver = Arc::new(Archiver::new(config.clone(), store.clone()));
    let retention = Arc::new(RetentionSweeper::new(store.clone()));
    let scheduler = EngineScheduler::start(signer, archiver, retention, &config);

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, std::sync::atomic::Ordering::Relaxed))
        .expect("failed to install SIGINT handler");

    while running.load(std::sync::atomic::Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    tracing::info!("shutdown requested, draining engines");
    listener_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = listener_handle.join();
    writer_pool.shutdown(std::time::Duration::from_secs(30));
    scheduler.shutdown();

    tracing::info!("shutdown complete");
    Ok(())
}

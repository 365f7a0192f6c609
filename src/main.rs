use anyhow::Context;

use mailmerge::config::{MergeSettings, SmtpSettings};
use mailmerge::pipeline::run_merge;
use mailmerge::transforms::TransformRegistry;
use mailmerge::transport::{DebugSink, SmtpSink, TransportSink};

fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = MergeSettings::from_env().context("Invalid MAILMERGE_* configuration")?;
    let registry = TransformRegistry::with_builtins();

    eprintln!("📬 Mailmerge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data: {}", settings.data_path.display());
    eprintln!("   Sender: {}", settings.sender_address);
    eprintln!("   Images: {}", settings.images.len());
    eprintln!(
        "   Transforms: {}",
        if settings.transforms.is_empty() {
            "none".to_string()
        } else {
            settings
                .transforms
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        }
    );

    let sink: Box<dyn TransportSink> = if settings.debug_transport {
        eprintln!("   Transport: debug (messages printed to stdout)\n");
        Box::new(DebugSink::echoing())
    } else {
        let smtp = SmtpSettings::from_env(&settings.sender_address)
            .context("Invalid SMTP_* configuration")?;
        eprintln!(
            "   Transport: smtp ({}:{}, {:?})\n",
            smtp.host, smtp.port, smtp.tls
        );
        Box::new(SmtpSink::new(&smtp)?)
    };

    let summary = run_merge(&settings, &registry, sink.as_ref())?;

    eprintln!("\n   Sent: {}", summary.sent);
    if !summary.is_clean() {
        eprintln!("   Failed: {}", summary.failed.len());
        for failure in &summary.failed {
            eprintln!("     {failure}");
        }
        anyhow::bail!("{} record(s) failed", summary.failed.len());
    }

    Ok(())
}

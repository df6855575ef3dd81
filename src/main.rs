mod cli;
mod logging;

use std::process::ExitCode;

use tower::Service;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use book_detail_scraper::{ChromeOptions, EnrichRequest, EnrichService, RunReport, Shutdown};

use cli::CliArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse_args();
    if let Err(e) = args.validate() {
        eprintln!("✗ {}", e);
        return ExitCode::FAILURE;
    }

    let _guard = match logging::init_logging(&args.log_level, &args.log_dir) {
        Ok((guard, path)) => {
            info!("Logging to {}", path.display());
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(&args.log_level))
                .with_writer(std::io::stderr)
                .init();
            warn!("Log file unavailable, logging to stderr only: {}", e);
            None
        }
    };

    let input_path = match args.resolve_input() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("✗ 入力パスを読み取れません: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (browsers, requested) = args.clamped_browsers();
    if let Some(requested) = requested {
        warn!("Browser count {} is out of range, using {}", requested, browsers);
    }

    let chrome = ChromeOptions::default().with_chrome_path(args.chrome_path.clone());
    let request = EnrichRequest::new(&input_path)
        .with_browsers(browsers)
        .with_limit(args.limit)
        .with_chrome(chrome)
        .with_debug(args.debug);

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();
    let mut service = EnrichService::new().with_shutdown(shutdown);

    match service.call(request).await {
        Ok(report) => {
            print_summary(&report);
            if let Some(path) = &args.report {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => {
                        if let Err(e) = std::fs::write(path, json) {
                            error!("Failed to write report to {}: {}", path.display(), e);
                        }
                    }
                    Err(e) => error!("Failed to serialize report: {}", e),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run failed: {}", e);
            if e.is_setup_failure() {
                eprintln!("✗ 準備段階で失敗しました: {}", e);
            } else {
                eprintln!("✗ エラー: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn print_summary(report: &RunReport) {
    let line = "=".repeat(60);
    println!("\n{}", line);
    if report.interrupted {
        println!("Interrupted: partial results were saved");
    } else {
        println!("All done!");
    }
    println!("{}", line);
    println!(
        "Processed {}/{}  (success {}, fail {})",
        report.counters.processed, report.total, report.counters.success, report.counters.fail
    );
    println!("\nField coverage (whole file):");
    for (field, count) in &report.field_counts {
        println!("  {:<15} {}", field.column(), count);
    }
    if let Some(path) = &report.error_path {
        println!(
            "\n⚠ {} books need attention, see {}",
            report.error_count,
            path.display()
        );
    }
    if report.abandoned_workers > 0 {
        println!("⚠ {} browsers did not stop in time", report.abandoned_workers);
    }

    let elapsed = report.elapsed_secs as u64;
    println!(
        "\nStarted {}, elapsed {:02}:{:02}:{:02}",
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60
    );
    println!("Updated: {}", report.output_path.display());
}

use std::path::PathBuf;

use clap::Parser;
use volspike::prelude::*;

/// Calendar days scanned when no start date is given
const DEFAULT_LOOKBACK_DAYS: u64 = 730;

#[derive(Parser, Debug)]
#[command(
    name = "volspike",
    about = "Scan a directory of daily bars for volume-spike uptrends"
)]
struct Cli {
    /// Directory holding universe.json and one <ts_code>.json per security
    #[arg(value_name = "DATA_DIR", value_hint = clap::ValueHint::DirPath)]
    data_dir: PathBuf,

    /// TOML scan configuration; defaults apply when omitted
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// First trade date, YYYYMMDD or YYYY-MM-DD. Defaults to 730 days before --end
    #[arg(long, value_parser = TradeDate::parse)]
    start: Option<TradeDate>,

    /// Last trade date, YYYYMMDD or YYYY-MM-DD. Defaults to today
    #[arg(long, value_parser = TradeDate::parse)]
    end: Option<TradeDate>,
}

impl Cli {
    fn range(&self, today: TradeDate) -> volspike::Result<DateRange> {
        let end = self.end.unwrap_or(today);
        match self.start {
            Some(start) => DateRange::new(start, end),
            None => DateRange::lookback(end, DEFAULT_LOOKBACK_DAYS),
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> volspike::Result<()> {
    let config = match &cli.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    let range = cli.range(chrono::Local::now().date_naive().into())?;
    log::info!(
        "scanning {} from {} to {}",
        cli.data_dir.display(),
        range.start,
        range.end
    );

    let source = JsonDirSource::new(&cli.data_dir);
    let scanner = Scanner::from_config(&config)?;
    let report = scanner.scan_listed(&source, &range)?;

    for failure in &report.failures {
        eprintln!("{}: {}", failure.security, failure.error);
    }
    println!("{}", report.matches.to_json()?);
    Ok(())
}

//! CLI entry point for the fuel consumption monitor.
//!
//! Provides subcommands for classifying trips, evaluating alert rules into
//! reports, and managing the rule repository.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use fuel_watch::analyzers::analyzer::{load_classified, run_rules};
use fuel_watch::analyzers::publish::{publish_reports, upload_file};
use fuel_watch::calendar::DayBucket;
use fuel_watch::config::MonitorConfig;
use fuel_watch::ledger::CsvReportStore;
use fuel_watch::output::{ClassifiedRow, append_records, gzip_file, print_json};
use fuel_watch::rules::{
    NotificationTargets, Rule, RuleParams, RuleRepository, RuleThresholds, percent_to_fraction,
};
use fuel_watch::source::{CsvTripSource, TripQuery};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "fuel_watch")]
#[command(about = "Flags buses and drivers with poor fuel consumption", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `FUEL_WATCH_*` environment settings
#[derive(Args)]
struct ConfigArgs {
    /// Lowest plausible km/L
    #[arg(long, global = true)]
    min_kml: Option<f64>,

    /// Highest plausible km/L
    #[arg(long, global = true)]
    max_kml: Option<f64>,

    /// Comparable trips required to classify a trip
    #[arg(long, global = true)]
    min_samples: Option<u32>,

    /// Trailing days used when computing missing reference statistics
    #[arg(long, global = true)]
    reference_window_days: Option<u32>,

    /// Diesel price per liter used to cost excess fuel
    #[arg(long, global = true)]
    diesel_price: Option<f64>,

    /// Maximum number of rules evaluated at once
    #[arg(long, global = true)]
    max_concurrent_rules: Option<usize>,
}

impl ConfigArgs {
    fn apply(self, mut config: MonitorConfig) -> Result<MonitorConfig> {
        if let Some(v) = self.min_kml {
            config.min_kml = v;
        }
        if let Some(v) = self.max_kml {
            config.max_kml = v;
        }
        if let Some(v) = self.min_samples {
            config.min_samples = v;
        }
        if let Some(v) = self.reference_window_days {
            config.reference_window_days = v;
        }
        if let Some(v) = self.diesel_price {
            config.diesel_price = v;
        }
        if let Some(v) = self.max_concurrent_rules {
            config.max_concurrent_rules = v;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify trips against their reference median and write them as CSV
    Classify {
        /// Trip CSV file or directory of CSV files
        #[arg(short, long)]
        trips: PathBuf,

        /// CSV file to append classified trips to
        #[arg(short, long, default_value = "classified.csv")]
        output: PathBuf,

        /// First trip day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last trip day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Evaluate saved rules and record the reports
    Evaluate {
        /// Trip CSV file or directory of CSV files
        #[arg(short, long)]
        trips: PathBuf,

        /// Rule repository file
        #[arg(short, long, default_value = "rules.json")]
        rules: PathBuf,

        /// Only evaluate the rule with this name
        #[arg(long)]
        rule: Option<String>,

        /// Execution day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Directory holding the evaluation ledger and vehicle reports
        #[arg(short, long, default_value = "reports")]
        output: PathBuf,

        /// Optional: S3 bucket name to publish reports to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress the report tables before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Manage alert rules
    Rules {
        /// Rule repository file
        #[arg(short, long, default_value = "rules.json", global = true)]
        file: PathBuf,

        #[command(subcommand)]
        action: RulesCommand,
    },
    /// Read recorded evaluation reports
    Reports {
        /// Rule repository file
        #[arg(short, long, default_value = "rules.json", global = true)]
        rules: PathBuf,

        /// Directory holding the evaluation ledger and vehicle reports
        #[arg(short, long, default_value = "reports", global = true)]
        output: PathBuf,

        #[command(subcommand)]
        action: ReportsCommand,
    },
    /// List the holidays of a year as the day-bucket calendar sees them
    Holidays { year: i32 },
}

#[derive(Subcommand)]
enum ReportsCommand {
    /// Print one rule's report as JSON
    Show {
        name: String,

        /// Execution day (YYYY-MM-DD); defaults to the rule's latest
        #[arg(long)]
        day: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List saved rules
    List,
    /// Print one rule as JSON
    Show { name: String },
    /// Save a new rule
    Create(CreateRule),
    /// Delete a rule
    Delete { name: String },
}

#[derive(Args)]
struct CreateRule {
    name: String,

    /// Vehicle models in scope (repeatable); omit or use TODOS for all
    #[arg(long = "model")]
    models: Vec<String>,

    /// Day type: weekday, saturday, sunday or holiday
    #[arg(long)]
    day_bucket: Option<DayBucket>,

    #[arg(long, default_value_t = 30)]
    lookback_days: u32,

    /// Minimum % of trips below the median (0-100)
    #[arg(long)]
    below_median_pct: Option<f64>,

    /// Minimum % of suspect or low-performance trips (0-100)
    #[arg(long)]
    suspect_or_low_pct: Option<f64>,

    /// Minimum % of suspected telemetry errors (0-100)
    #[arg(long)]
    telemetry_error_pct: Option<f64>,

    /// Minimum distinct drivers on suspect or low trips
    #[arg(long)]
    min_drivers: Option<u32>,

    /// Minimum trips per vehicle
    #[arg(long)]
    min_trips: Option<u32>,

    /// E-mail recipient (repeatable, at most 5)
    #[arg(long = "email")]
    emails: Vec<String>,

    /// WhatsApp number (repeatable, at most 5)
    #[arg(long = "phone")]
    phones: Vec<String>,

    #[arg(long, default_value_t = false)]
    send_email: bool,

    #[arg(long, default_value_t = false)]
    send_whatsapp: bool,

    #[arg(long, default_value_t = false)]
    create_work_order: bool,
}

impl CreateRule {
    fn into_rule(self) -> Rule {
        let thresholds = RuleThresholds {
            min_below_median_fraction: percent_to_fraction(self.below_median_pct),
            min_suspect_or_low_fraction: percent_to_fraction(self.suspect_or_low_pct),
            min_telemetry_error_fraction: percent_to_fraction(self.telemetry_error_pct),
            min_distinct_drivers: self.min_drivers,
            min_trips: self.min_trips,
        };

        let mut params = RuleParams::new(&self.name)
            .with_lookback_days(self.lookback_days)
            .with_thresholds(thresholds);
        params.scope.models = self.models;
        params.scope.day_bucket = self.day_bucket;

        Rule::draft(params).with_notifications(NotificationTargets {
            emails: self.emails,
            phones: self.phones,
            send_email: self.send_email,
            send_whatsapp: self.send_whatsapp,
            create_work_order: self.create_work_order,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/fuel_watch.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("fuel_watch.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = cli.config.apply(MonitorConfig::from_env()?)?;

    match cli.command {
        Commands::Classify {
            trips,
            output,
            from,
            to,
        } => classify(&config, &trips, &output, from, to).await?,
        Commands::Evaluate {
            trips,
            rules,
            rule,
            as_of,
            output,
            s3_bucket,
            gzip,
        } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            evaluate(
                &config,
                &trips,
                &rules,
                rule.as_deref(),
                as_of,
                &output,
                s3_bucket,
                gzip,
            )
            .await?;
        }
        Commands::Rules { file, action } => manage_rules(&file, action)?,
        Commands::Reports {
            rules,
            output,
            action,
        } => show_reports(&rules, &output, action)?,
        Commands::Holidays { year } => {
            let calendar = config.calendar();
            let holidays = calendar.holidays_in(year);
            info!(year, total = holidays.len(), "Holidays");
            for (day, name) in holidays {
                info!(%day, weekday = %day.format("%a"), name, "Holiday");
            }
        }
    }

    Ok(())
}

#[tracing::instrument(skip_all, fields(trips = %trips.display(), output = %output.display()))]
async fn classify(
    config: &MonitorConfig,
    trips: &Path,
    output: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let source = CsvTripSource::new(trips);
    let query = TripQuery {
        from,
        to,
        models: Vec::new(),
    };

    let (loaded, batch) = load_classified(&source, config, &query).await?;
    let rows: Vec<ClassifiedRow> = batch.classified.iter().map(ClassifiedRow::from).collect();
    append_records(output, &rows)?;

    info!(
        loaded,
        written = rows.len(),
        excluded = batch.excluded(),
        "Classification written"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip_all, fields(%as_of, rules = %rules_path.display()))]
async fn evaluate(
    config: &MonitorConfig,
    trips: &Path,
    rules_path: &Path,
    only: Option<&str>,
    as_of: NaiveDate,
    output: &Path,
    s3_bucket: Option<String>,
    gzip: bool,
) -> Result<()> {
    let repo = RuleRepository::load(rules_path)
        .with_context(|| format!("loading rules from {}", rules_path.display()))?;

    let rules: Vec<Rule> = match only {
        Some(name) => match repo.get_by_name(name) {
            Some(rule) => vec![rule.clone()],
            None => bail!("no rule named {name:?}"),
        },
        None => repo.list().into_iter().cloned().collect(),
    };
    if rules.is_empty() {
        warn!(rules = %rules_path.display(), "No saved rules");
        return Ok(());
    }

    let source = CsvTripSource::new(trips);
    let mut store = CsvReportStore::open(output)?;
    let summary = run_rules(&source, &rules, &mut store, config, as_of).await?;

    info!(
        evaluated = summary.reports.len(),
        skipped = summary.skipped,
        trips = summary.trips_loaded,
        excluded = summary.trips_excluded,
        "Evaluation complete"
    );

    for report in &summary.reports {
        if !report.vehicles.is_empty() {
            print_json(&report.record)?;
        }
    }

    if let Some(bucket) = s3_bucket {
        if summary.reports.is_empty() {
            info!("Nothing new to publish");
            return Ok(());
        }

        let aws = aws_config::load_from_env().await;
        let s3 = aws_sdk_s3::Client::new(&aws);
        info!(bucket = %bucket, gzip, "S3 upload enabled");

        publish_reports(&s3, &bucket, &summary.reports).await?;

        let prefix = format!("reports/day={}", as_of.format("%Y-%m-%d"));
        for table in [store.vehicles_path(), store.statuses_path()] {
            if !table.exists() {
                continue;
            }
            let path = if gzip { gzip_file(&table)? } else { table };
            let key = upload_file(&s3, &bucket, &prefix, &path).await?;
            info!(key, "Report table uploaded");
        }
    }

    Ok(())
}

fn manage_rules(file: &Path, action: RulesCommand) -> Result<()> {
    let mut repo = RuleRepository::load(file)?;

    match action {
        RulesCommand::List => {
            info!(total = repo.len(), "Rules");
            for rule in repo.list() {
                info!(
                    id = rule.id,
                    name = %rule.name(),
                    models = ?rule.params.scope.models,
                    day_bucket = ?rule.params.scope.day_bucket,
                    lookback_days = rule.params.scope.lookback_days,
                    "Rule"
                );
            }
        }
        RulesCommand::Show { name } => {
            let rule = repo
                .get_by_name(&name)
                .with_context(|| format!("no rule named {name:?}"))?;
            print_json(rule)?;
        }
        RulesCommand::Create(args) => {
            let rule = repo.create(args.into_rule())?;
            print_json(&rule)?;
        }
        RulesCommand::Delete { name } => {
            let id = repo
                .get_by_name(&name)
                .and_then(|r| r.id)
                .with_context(|| format!("no rule named {name:?}"))?;
            repo.delete(id)?;
        }
    }

    Ok(())
}

fn show_reports(rules_path: &Path, output: &Path, action: ReportsCommand) -> Result<()> {
    let repo = RuleRepository::load(rules_path)?;
    let store = CsvReportStore::open(output)?;

    match action {
        ReportsCommand::Show { name, day } => {
            let id = repo
                .get_by_name(&name)
                .and_then(|r| r.id)
                .with_context(|| format!("no rule named {name:?}"))?;
            let Some(day) = day.or_else(|| store.latest_day(id)) else {
                bail!("rule {name:?} has never been evaluated");
            };
            let report = store
                .get(id, day)?
                .with_context(|| format!("rule {name:?} was not evaluated on {day}"))?;
            print_json(&report)?;
        }
    }

    Ok(())
}

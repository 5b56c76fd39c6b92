use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};
use vitals_lib::{
    config::DeploymentConfig,
    detectors::{AnomalyAssessment, AssessmentStatus, SlopeDetector},
    fetch::SignalFetcher,
    io::{samples as sample_io, text as text_io},
    patient::{Detection, Gender, NewPatient},
    plot::{figures_for_signals, Figure},
    signal::{Channel, PatientId, Window, WindowedSignals},
    store::{PatientRegistry, SampleSink, SampleStore, SqliteStore},
    window::WindowResolver,
};

#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Vitals: windowed ECG and respiration review"
)]
struct Cli {
    /// Deployment config (TOML) with origin, sample rate and window size
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database; overrides `database` from the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ChannelArg {
    Ecg,
    Resp,
}

impl From<ChannelArg> for Channel {
    fn from(value: ChannelArg) -> Self {
        match value {
            ChannelArg::Ecg => Channel::Ecg,
            ChannelArg::Resp => Channel::Resp,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Register a patient
    PatientAdd {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// YYYY-MM-DD
        #[arg(long)]
        birth_date: String,
        /// male, female or other
        #[arg(long)]
        gender: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List registered patients
    PatientList,
    /// Load samples for one patient and channel
    Ingest {
        #[arg(long)]
        patient: String,
        #[arg(long, value_enum)]
        channel: ChannelArg,
        /// CSV with `timestamp,value` columns
        #[arg(long, conflicts_with = "values")]
        csv: Option<PathBuf>,
        /// Newline-delimited values, stamped uniformly from --start
        #[arg(long, requires = "start")]
        values: Option<PathBuf>,
        /// Timestamp of the first value (RFC 3339 or epoch ms)
        #[arg(long)]
        start: Option<String>,
        /// Sample rate for --values; defaults to the config's
        #[arg(long)]
        sample_rate: Option<f64>,
    },
    /// First/last stored timestamp of a patient's channel
    Extent {
        #[arg(long)]
        patient: String,
        #[arg(long, value_enum, default_value = "ecg")]
        channel: ChannelArg,
    },
    /// Fetch one window for a patient and run the slope check on its ECG
    Window {
        #[arg(long)]
        patient: String,
        /// Offset from the origin in samples; defaults to half a window
        #[arg(long, allow_negative_numbers = true)]
        step: Option<i64>,
        /// Slope threshold (amplitude per second); defaults to the calibrated margin
        #[arg(long, allow_negative_numbers = true)]
        margin: Option<f64>,
        /// Store a detection when the window is anomalous
        #[arg(long)]
        record: bool,
        /// Include chart figures for both channels
        #[arg(long)]
        figure: bool,
        #[arg(long, default_value_t = 2048)]
        max_points: usize,
    },
    /// Calibrate and check a raw value series from --input or stdin
    Assess {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Slope threshold; defaults to the calibrated margin
        #[arg(long, allow_negative_numbers = true)]
        margin: Option<f64>,
        /// Defaults to the config's sample rate
        #[arg(long)]
        sample_rate: Option<f64>,
    },
    /// Detections recorded for a patient
    Detections {
        #[arg(long)]
        patient: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let database = cli
        .database
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.database.clone()));
    match cli.command {
        Commands::Init => cmd_init(database.as_deref())?,
        Commands::PatientAdd {
            first_name,
            last_name,
            birth_date,
            gender,
            notes,
        } => cmd_patient_add(
            database.as_deref(),
            first_name,
            last_name,
            &birth_date,
            &gender,
            notes,
        )?,
        Commands::PatientList => cmd_patient_list(database.as_deref())?,
        Commands::Ingest {
            patient,
            channel,
            csv,
            values,
            start,
            sample_rate,
        } => cmd_ingest(
            database.as_deref(),
            config.as_ref(),
            &patient,
            channel.into(),
            csv.as_deref(),
            values.as_deref(),
            start.as_deref(),
            sample_rate,
        )?,
        Commands::Extent { patient, channel } => {
            cmd_extent(database.as_deref(), &patient, channel.into())?
        }
        Commands::Window {
            patient,
            step,
            margin,
            record,
            figure,
            max_points,
        } => cmd_window(
            database.as_deref(),
            config.as_ref(),
            &patient,
            step,
            margin,
            record,
            figure,
            max_points,
        )?,
        Commands::Assess {
            input,
            margin,
            sample_rate,
        } => cmd_assess(config.as_ref(), input.as_deref(), margin, sample_rate)?,
        Commands::Detections { patient } => cmd_detections(database.as_deref(), &patient)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Option<DeploymentConfig>> {
    match path {
        Some(path) => {
            let cfg = DeploymentConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            info!(
                "config: origin {}, {} Hz, {} s window",
                cfg.origin, cfg.sample_rate, cfg.window_size_s
            );
            Ok(Some(cfg))
        }
        None => Ok(None),
    }
}

fn require_config(config: Option<&DeploymentConfig>) -> Result<&DeploymentConfig> {
    config.ok_or_else(|| anyhow!("this command needs --config"))
}

fn require_database(database: Option<&Path>) -> Result<&Path> {
    database.ok_or_else(|| anyhow!("no database: pass --database or set `database` in the config"))
}

fn open_store(database: Option<&Path>) -> Result<SqliteStore> {
    let path = require_database(database)?;
    Ok(SqliteStore::open(path)?)
}

fn parse_patient(text: &str) -> Result<PatientId> {
    text.parse()
        .with_context(|| format!("invalid patient id {:?}", text))
}

fn check_margin(margin: Option<f64>) -> Result<()> {
    match margin {
        Some(m) if !m.is_finite() || m < 0.0 => {
            bail!("margin must be a non-negative number, got {}", m)
        }
        _ => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_init(database: Option<&Path>) -> Result<()> {
    let path = require_database(database)?;
    SqliteStore::create(path)?;
    print_json(&serde_json::json!({ "database": path }))
}

fn cmd_patient_add(
    database: Option<&Path>,
    first_name: String,
    last_name: String,
    birth_date: &str,
    gender: &str,
    notes: Option<String>,
) -> Result<()> {
    let birth_date = NaiveDate::parse_from_str(birth_date.trim(), "%Y-%m-%d")
        .with_context(|| format!("birth date must be YYYY-MM-DD, got {:?}", birth_date))?;
    let gender: Gender = gender.parse()?;
    let mut store = open_store(database)?;
    let patient = store.create_patient(NewPatient {
        first_name,
        last_name,
        birth_date,
        gender,
        notes,
    })?;
    print_json(&patient)
}

fn cmd_patient_list(database: Option<&Path>) -> Result<()> {
    let store = open_store(database)?;
    for patient in store.list_patients()? {
        print_json(&patient)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_ingest(
    database: Option<&Path>,
    config: Option<&DeploymentConfig>,
    patient: &str,
    channel: Channel,
    csv: Option<&Path>,
    values: Option<&Path>,
    start: Option<&str>,
    sample_rate: Option<f64>,
) -> Result<()> {
    let patient = parse_patient(patient)?;
    let samples = match (csv, values) {
        (Some(path), _) => sample_io::read_samples_csv(path, patient)?,
        (None, Some(path)) => {
            let values = text_io::read_f64_series(path)?;
            let start = sample_io::parse_timestamp(start.unwrap_or_default())?;
            let rate = sample_rate
                .or_else(|| config.map(|c| c.sample_rate))
                .ok_or_else(|| anyhow!("--values needs --sample-rate or a config"))?;
            if !rate.is_finite() || rate <= 0.0 {
                bail!("sample rate must be greater than zero, got {}", rate);
            }
            sample_io::stamp_uniform(&values, start, rate, patient)
        }
        (None, None) => bail!("pass --csv or --values"),
    };
    let mut store = open_store(database)?;
    let written = store.append(channel, &samples)?;
    info!("ingested {} {} samples for {}", written, channel, patient);
    print_json(&serde_json::json!({
        "patient": patient,
        "channel": channel,
        "written": written,
    }))
}

#[derive(Serialize)]
struct ExtentOutput {
    patient: PatientId,
    channel: Channel,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    count: usize,
}

fn cmd_extent(database: Option<&Path>, patient: &str, channel: Channel) -> Result<()> {
    let patient = parse_patient(patient)?;
    let store = open_store(database)?;
    let extent = store.extent(channel, patient)?;
    print_json(&ExtentOutput {
        patient,
        channel,
        first: extent.map(|e| e.first),
        last: extent.map(|e| e.last),
        count: extent.map(|e| e.count).unwrap_or(0),
    })
}

#[derive(Serialize)]
struct WindowOutput {
    patient: PatientId,
    step: i64,
    effective_step: i64,
    window: Window,
    #[serde(flatten)]
    signals: WindowedSignals,
    assessment: AnomalyAssessment,
    anomalous_pairs: Vec<usize>,
    status: AssessmentStatus,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection: Option<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    figures: Option<[Figure; 2]>,
}

#[derive(Serialize)]
struct UnavailableOutput<'a> {
    patient: PatientId,
    step: i64,
    status: AssessmentStatus,
    message: &'static str,
    error: &'a str,
}

#[allow(clippy::too_many_arguments)]
fn cmd_window(
    database: Option<&Path>,
    config: Option<&DeploymentConfig>,
    patient: &str,
    step: Option<i64>,
    margin: Option<f64>,
    record: bool,
    figure: bool,
    max_points: usize,
) -> Result<()> {
    let cfg = require_config(config)?;
    let patient = parse_patient(patient)?;
    let step = step.unwrap_or_else(|| cfg.default_step());
    check_margin(margin)?;

    let resolver = WindowResolver::new(cfg);
    let window = resolver.resolve(step);
    let effective_step = resolver.effective_step(step);

    let fetched = open_store(database).and_then(|store| {
        if store.find_patient(patient)?.is_none() {
            bail!("unknown patient {}", patient);
        }
        let signals = SignalFetcher::new(&store, resolver).fetch_window(patient, &window)?;
        Ok((store, signals))
    });
    let (mut store, signals) = match fetched {
        Ok(ok) => ok,
        Err(err) if is_unavailable(&err) => {
            let status = AssessmentStatus::DataUnavailable;
            warn!("window fetch for {} failed: {:#}", patient, err);
            print_json(&UnavailableOutput {
                patient,
                step,
                status,
                message: status.message(),
                error: &format!("{:#}", err),
            })?;
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    let detector = SlopeDetector::new(cfg.sample_rate);
    let assessment = detector.assess(&signals.ecg, margin);
    let anomalous_pairs = detector.locate(&signals.ecg, assessment.margin);
    let status = AssessmentStatus::from_assessment(&assessment);
    let detection = if record && assessment.is_anomalous {
        Some(store.record_detection(patient)?)
    } else {
        None
    };
    let figures = figure.then(|| figures_for_signals(&signals, cfg.sample_rate, max_points));
    print_json(&WindowOutput {
        patient,
        step,
        effective_step,
        window,
        signals,
        assessment,
        anomalous_pairs,
        status,
        message: status.message(),
        detection,
        figures,
    })
}

fn is_unavailable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<vitals_lib::fetch::FetchError>().is_some()
            || matches!(
                cause.downcast_ref::<vitals_lib::store::StoreError>(),
                Some(vitals_lib::store::StoreError::Unavailable(_))
            )
    })
}

#[derive(Serialize)]
struct AssessOutput {
    samples: usize,
    sample_rate: f64,
    assessment: AnomalyAssessment,
    anomalous_pairs: Vec<usize>,
    status: AssessmentStatus,
    message: &'static str,
}

fn cmd_assess(
    config: Option<&DeploymentConfig>,
    input: Option<&Path>,
    margin: Option<f64>,
    sample_rate: Option<f64>,
) -> Result<()> {
    let sample_rate = sample_rate
        .or_else(|| config.map(|c| c.sample_rate))
        .ok_or_else(|| anyhow!("pass --sample-rate or --config"))?;
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        bail!("sample rate must be greater than zero, got {}", sample_rate);
    }
    check_margin(margin)?;
    let samples = read_samples(input)?;
    let detector = SlopeDetector::new(sample_rate);
    let assessment = detector.assess(&samples, margin);
    let status = AssessmentStatus::from_assessment(&assessment);
    print_json(&AssessOutput {
        samples: samples.len(),
        sample_rate,
        assessment,
        anomalous_pairs: detector.locate(&samples, assessment.margin),
        status,
        message: status.message(),
    })
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn cmd_detections(database: Option<&Path>, patient: &str) -> Result<()> {
    let patient = parse_patient(patient)?;
    let store = open_store(database)?;
    for detection in store.detections(patient)? {
        print_json(&detection)?;
    }
    Ok(())
}

//! Main pick-and-place executable entry point.
//!
//! # Architecture
//!
//! The execution consists of:
//!
//!     - Initialise the session and logging
//!     - Load and validate parameters and the sequence table, refusing to start on any error
//!     - Determine the target object (command line, parameters, or interactive prompt)
//!     - Build the actuator, frame source, and oracle selected in the parameters
//!     - Run the search until it succeeds, is exhausted, or is stopped with Ctrl-C
//!     - Save the search report into the session directory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;

// Internal
use comms_if::net::zmq;
#[cfg(feature = "remote")]
use pnp_lib::arm_client::remote::RemoteArm;
#[cfg(feature = "cam")]
use pnp_lib::cam_client::CamClient;
use pnp_lib::{
    arm_client::{
        local::{LocalArm, SimArmDriver},
        Actuator,
    },
    cam_client::{FileFrameSource, FrameSource},
    oracle::{gemini::GeminiOracle, VisionOracle},
    params::{ActuatorParams, FrameSourceParams, PnpExecParams},
    search::{SearchConfig, SearchController, VisionWorker},
    seq_store::SequenceTable,
    signal::StopSignal,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::seconds_to_duration,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "Object to find > ";

/// Name of the search report in the session directory.
const REPORT_FILE: &str = "search_report.json";

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(
    name = "pnp_exec",
    about = "Search for an object with the arm and pick it up"
)]
struct Args {
    /// Parameter file, relative to the params directory unless absolute
    #[structopt(long, parse(from_os_str), default_value = "pnp_exec.toml")]
    params: PathBuf,

    /// Object to search for, overrides the parameter file
    object: Option<String>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("pnp_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Pick-and-place Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", args);

    match dotenvy::dotenv() {
        Ok(path) => info!("Environment loaded from {:?}", path),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Could not load the .env file: {}", e),
    }

    // ---- LOAD PARAMETERS ----

    let params: PnpExecParams = if args.params.is_absolute() {
        util::params::load_path(&args.params)
    } else {
        util::params::load(&args.params.to_string_lossy())
    }
    .wrap_err("Could not load pnp_exec params")?;

    params.validate().wrap_err("Invalid pnp_exec params")?;

    let search_config =
        SearchConfig::from_params(&params).wrap_err("Invalid checkpoint configuration")?;

    if search_config.checkpoints.is_empty() {
        warn!("No checkpoints are configured, the search will end immediately");
    }

    info!("Exec parameters loaded");

    // ---- LOAD SEQUENCES ----

    let sequences_path = host::resolve_path(&params.sequences_path)
        .wrap_err("Could not determine the software root")?;

    let table = Arc::new(
        SequenceTable::load(&sequences_path, params.num_joints)
            .wrap_err("Could not load the sequence table")?,
    );
    table
        .require_keys(search_config.required_keys())
        .wrap_err("The sequence table is incomplete")?;

    info!(
        "Loaded {} sequences from {:?}",
        table.len(),
        sequences_path
    );

    // ---- TARGET OBJECT ----

    let target_object = match args.object.or_else(|| params.target_object.clone()) {
        Some(o) if !o.trim().is_empty() => o.trim().to_string(),
        _ => prompt_for_object()?,
    };

    info!("Target object: \"{}\"", target_object);

    // ---- INITIALISE CLIENTS ----

    let zmq_ctx = zmq::Context::new();

    let actuator: Box<dyn Actuator> = match &params.actuator {
        ActuatorParams::Local(p) => {
            info!("Using the local simulated arm");
            Box::new(LocalArm::new(
                table.clone(),
                SimArmDriver::new(),
                seconds_to_duration(p.waypoint_pause_s),
                seconds_to_duration(p.move_timeout_s),
            ))
        }
        #[cfg(feature = "remote")]
        ActuatorParams::Remote(p) => {
            let arm = RemoteArm::new(&zmq_ctx, p)
                .wrap_err("Failed to initialise the RemoteArm")?;
            info!(
                "RemoteArm initialised ({} / {})",
                p.command_endpoint, p.status_endpoint
            );
            Box::new(arm)
        }
        #[cfg(not(feature = "remote"))]
        ActuatorParams::Remote(_) => {
            return Err(eyre!(
                "Remote actuation requested but the \"remote\" feature is disabled"
            ))
        }
    };

    let frame_source: Box<dyn FrameSource> = match &params.frame_source {
        #[cfg(feature = "cam")]
        FrameSourceParams::Cam {
            endpoint,
            timeout_ms,
            format,
        } => {
            let client = CamClient::new(&zmq_ctx, endpoint, *timeout_ms, *format)
                .wrap_err("Failed to initialise the CamClient")?;
            info!("CamClient initialised ({})", endpoint);
            Box::new(client)
        }
        #[cfg(not(feature = "cam"))]
        FrameSourceParams::Cam { .. } => {
            return Err(eyre!(
                "Camera frame source requested but the \"cam\" feature is disabled"
            ))
        }
        FrameSourceParams::File { path, format } => {
            let path =
                host::resolve_path(path).wrap_err("Could not determine the software root")?;
            info!("Using still frames from {:?}", path);
            Box::new(FileFrameSource::new(path, *format))
        }
    };

    let oracle = GeminiOracle::new(&params.oracle).wrap_err("Failed to initialise the oracle")?;
    if !oracle.has_api_key() {
        warn!(
            "{} is not set, every oracle request will fail and the search cannot succeed",
            params.oracle.api_key_env
        );
    }
    let oracle: Box<dyn VisionOracle> = Box::new(oracle);

    let worker =
        VisionWorker::spawn(frame_source, oracle).wrap_err("Failed to start the vision worker")?;

    let mut controller = SearchController::new(search_config, actuator, worker);

    // ---- STOP SIGNAL ----

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Stop requested, the arm will be sent home");
        handler_stop.trigger();
    })
    .wrap_err("Failed to install the Ctrl-C handler")?;

    // ---- SEARCH ----

    let report = controller.run(&target_object, &stop);

    info!("Search outcome: {:?}", report.outcome);

    session.save(REPORT_FILE, report);

    // Disconnect from the actuator service before the session closes
    drop(controller);

    session.exit();

    Ok(())
}

/// Ask the operator for the object to search for.
fn prompt_for_object() -> Result<String, Report> {
    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;

    loop {
        match rl.readline(PROMPT) {
            Ok(line) if !line.trim().is_empty() => return Ok(line.trim().to_string()),
            Ok(_) => continue,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return Err(eyre!("No target object was given"))
            }
            Err(e) => return Err(e).wrap_err("Could not read the target object"),
        }
    }
}

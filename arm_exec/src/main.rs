//! # Arm Control Executable
//!
//! This executable is the actuator service of the pick-and-place system. It stores the recorded
//! arm sequences and executes `move_to_position` commands recieved on its command socket,
//! publishing the progress of each move on its status socket.
//!
//! The arm itself is simulated, each waypoint is accepted immediately and held for the configured
//! pause.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm server abstraction.
mod arm_server;

/// Parameters for the arm executable.
mod params;

/// Command execution.
mod service;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use comms_if::eqpt::arm::{ArmStatus, StatusKind};
use log::{error, info, warn};
use std::sync::Arc;

// Internal
use arm_server::ArmServer;
use params::ArmExecParams;
use pnp_lib::{
    arm_client::local::{LocalArm, SimArmDriver},
    seq_store::SequenceTable,
    signal::StopSignal,
};
use service::ArmService;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::seconds_to_duration,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Arm Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load("arm_exec.toml")?;
    params.validate().wrap_err("Invalid arm_exec params")?;

    info!("Parameters loaded");

    let sequences_path = host::resolve_path(&params.sequences_path)
        .wrap_err("Could not determine the software root")?;

    let table = Arc::new(
        SequenceTable::load(&sequences_path, params.num_joints)
            .wrap_err("Could not load the sequence table")?,
    );
    table
        .require_keys(vec![("home", params.home_key)])
        .wrap_err("The sequence table is incomplete")?;

    info!(
        "Loaded {} sequences from {:?}: keys {:?}",
        table.len(),
        sequences_path,
        table.keys().collect::<Vec<_>>()
    );

    // ---- SERVER INITIALISATION ----

    let server = ArmServer::new(&params).wrap_err("Failed to initialise server")?;

    info!(
        "Server initialised (commands on {}, status on {})",
        params.command_endpoint, params.status_endpoint
    );

    let publish = |status: ArmStatus| {
        if let Err(e) = server.publish(&status) {
            warn!("{}", e);
        }
    };

    let mut service = ArmService::new(LocalArm::new(
        table,
        SimArmDriver::new(),
        seconds_to_duration(params.waypoint_pause_s),
        seconds_to_duration(params.move_timeout_s),
    ));

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.trigger())
        .wrap_err("Failed to install the Ctrl-C handler")?;

    service
        .initialise(params.home_key, &stop, publish)
        .wrap_err("Could not move to the home position")?;

    // ---- MAIN LOOP ----

    info!("Initialisation complete, waiting for commands");

    while !stop.is_triggered() {
        if let Some(command) = server.get_command() {
            service.handle(command, &stop, publish);
        }
    }

    // ---- SHUTDOWN ----

    info!("Shutting down...");

    if let Err(e) = server.publish(&ArmStatus::new(StatusKind::Shutdown, None)) {
        error!("Could not announce the shutdown: {}", e);
    }

    // Release the sockets before closing the session
    drop(server);

    session.exit();

    Ok(())
}

use std::os::unix::process::CommandExt;
use std::path::PathBuf;

use log::warn;

use tatami::Config;
use tatami::errors::MainError;
use tatami::window_manager::{RunOutcome, WindowManager};

const CONFIG_FILE: &str = "config.lua";
const TEMPLATE: &str = include_str!("../../templates/config.lua");

fn main() -> Result<(), MainError> {
    let _ = simplelog::SimpleLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
    );

    if process_args()? {
        return Ok(());
    }

    let config = load_config()?;

    let mut window_manager = match WindowManager::new(config) {
        Ok(wm) => wm,
        Err(error) => return Err(MainError::CouldNotStartWm(error)),
    };

    match window_manager.run() {
        Ok(RunOutcome::Quit) => Ok(()),
        Ok(RunOutcome::Restart) => {
            drop(window_manager);
            restart()
        }
        Err(error) => Err(MainError::WmError(error)),
    }
}

/// The only flag is `--version`; anything else is a usage error.
fn process_args() -> Result<bool, MainError> {
    let mut args = std::env::args();
    args.next().ok_or(MainError::NoProgramName)?;

    match args.next() {
        None => Ok(false),
        Some(flag) if flag == "--version" || flag == "-v" => {
            println!("tatami-{}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
        Some(_) => Err(MainError::InvalidArguments),
    }
}

/// Re-exec the same binary with the same arguments; this is the live
/// reconfiguration path, so the new process re-reads the config file and
/// re-adopts every existing window.
fn restart() -> Result<(), MainError> {
    let mut args = std::env::args();
    let program = args.next().ok_or(MainError::NoProgramName)?;
    let error = std::process::Command::new(&program).args(args).exec();
    Err(MainError::RestartFailed(error))
}

fn load_config() -> Result<Config, MainError> {
    let config_directory = match dirs::config_dir() {
        Some(directory) => directory.join("tatami"),
        None => return Err(MainError::NoConfigDir),
    };
    let config_path = config_directory.join(CONFIG_FILE);

    ensure_config_exists(&config_directory, &config_path);

    let source = match std::fs::read_to_string(&config_path) {
        Ok(source) => source,
        Err(error) => {
            warn!("could not read {}: {error}; using defaults", config_path.display());
            return parse_template();
        }
    };

    match tatami::config::parse_lua_config(&source, config_path.parent()) {
        Ok(config) => Ok(config),
        Err(error) => {
            warn!("config error: {error}; using defaults");
            tatami::signal::notify("tatami", &format!("config error: {error}"));
            parse_template()
        }
    }
}

fn parse_template() -> Result<Config, MainError> {
    tatami::config::parse_lua_config(TEMPLATE, None)
        .map_err(MainError::FailedReadConfigTemplate)
}

fn ensure_config_exists(config_directory: &PathBuf, config_path: &PathBuf) {
    if config_path.exists() {
        return;
    }
    if let Err(error) = std::fs::create_dir_all(config_directory) {
        warn!("could not create {}: {error}", config_directory.display());
        return;
    }
    match std::fs::write(config_path, TEMPLATE) {
        Ok(()) => println!("created default config at {}", config_path.display()),
        Err(error) => warn!("could not write {}: {error}", config_path.display()),
    }
}

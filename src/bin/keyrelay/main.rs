// Keyrelay CLI
// Loads the config, sets up output, hot-plug and signals, then runs the engine

mod notify;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use keyrelay_core::{
    create_virtual_device, spawn_bridge, ConfigError, DeviceRegistry, EngineConfig, EvdevSource,
    EventLoop, HotplugSignal, InstanceLock, OutputDeviceName, OutputSink, OutputSynchronizer,
    PolicyKind, Shutdown,
};

use crate::notify::Notifier;

/// Exclusive input device remapper
#[derive(Parser, Debug)]
#[command(name = "keyrelay")]
#[command(author = "keyrelay contributors")]
#[command(version)]
#[command(about = "Grab input devices and re-emit remapped events through uinput", long_about = None)]
struct Args {
    /// TOML configuration file (default: ~/.config/keyrelay/config.toml if present)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Regex searched in device names
    #[arg(short, long, value_name = "REGEX")]
    match_device_name: Option<String>,

    /// Regex searched in device identities ("v046d pc52b")
    #[arg(long, value_name = "REGEX")]
    match_id: Option<String>,

    /// Also accept devices that do not look like keyboards
    #[arg(long)]
    non_keyboards: bool,

    /// Read matched devices without exclusive capture
    #[arg(long)]
    no_grab: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Name of the single-instance lock
    #[arg(long, value_name = "NAME")]
    lock_name: Option<String>,

    /// Remap policy (passthrough, keymap, chord, push-to-talk, jog-dial)
    #[arg(long, value_name = "POLICY")]
    policy: Option<PolicyKind>,

    /// List devices the filter would take and exit
    #[arg(long)]
    list_devices: bool,
}

/// File config with command line overrides applied.
fn load_config(args: &Args) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    config.override_match(
        args.match_device_name.as_deref(),
        args.match_id.as_deref(),
        args.non_keyboards.then_some(true),
    )?;
    if args.no_grab {
        config.grab = false;
    }
    if args.debug {
        config.debug = true;
        config.quiet = false;
    }
    if args.quiet {
        config.quiet = true;
        config.debug = false;
    }
    if let Some(name) = &args.lock_name {
        config.lock_name = name.clone();
    }
    if let Some(kind) = args.policy {
        config.policy.kind = kind;
    }
    Ok(config)
}

fn init_logging(config: &EngineConfig) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}

fn list_devices(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let own = OutputDeviceName::generate(&config.output.name_prefix);
    let mut registry = DeviceRegistry::new(EvdevSource::new(), config.match_rule.clone(), own, false);
    let devices = registry.list_matching()?;

    println!("Found {} matching device(s):", devices.len());
    for device in &devices {
        println!("  {}: {} ({})", device.path().display(), device.name(), device.identity());
    }
    Ok(())
}

/// Stop the engine on SIGINT or SIGTERM.
fn watch_signals(shutdown: Shutdown) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("keyrelay-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::debug!("Received signal {}", signal);
                shutdown.trigger();
            }
        })?;
    Ok(())
}

fn run(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = InstanceLock::acquire(&config.lock_dir, &config.lock_name)?;

    let own = OutputDeviceName::generate(&config.output.name_prefix);
    let output = if config.output.enabled {
        let device = create_virtual_device(&own, &config.output.capabilities())?;
        OutputSynchronizer::new(Box::new(device) as Box<dyn OutputSink>)
    } else {
        log::info!("Output disabled, events are tracked but not emitted");
        OutputSynchronizer::detached()
    };

    let hotplug = HotplugSignal::new()?;
    let shutdown = Shutdown::new()?;
    let bridge = spawn_bridge(hotplug.clone(), shutdown.clone())?;
    watch_signals(shutdown.clone())?;

    let policy = Notifier::new(config.policy.build()?, config.quiet);
    let registry = DeviceRegistry::new(EvdevSource::new(), config.match_rule.clone(), own, config.grab);

    let mut engine = EventLoop::new(registry, Arc::new(output), policy, hotplug, shutdown.clone())
        .with_debounce(config.debounce.range());
    let result = engine.run();

    shutdown.trigger();
    if bridge.join().is_err() {
        log::warn!("Hot-plug thread panicked");
    }
    result.map_err(Into::into)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let result = if args.list_devices {
        list_devices(&config)
    } else {
        run(config)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["keyrelay"]);

        assert_eq!(args.config, None);
        assert_eq!(args.match_device_name, None);
        assert!(!args.non_keyboards);
        assert!(!args.no_grab);
        assert!(!args.debug);
        assert!(!args.quiet);
        assert!(!args.list_devices);
        assert_eq!(args.policy, None);
    }

    #[test]
    fn test_args_with_options() {
        let args = Args::parse_from([
            "keyrelay",
            "--config",
            "/tmp/keyrelay.toml",
            "-m",
            "^Satechi",
            "--match-id",
            "v05ac",
            "--non-keyboards",
            "--no-grab",
            "--lock-name",
            "satechi",
            "--policy",
            "push_to_talk",
        ]);

        assert_eq!(args.config, Some(PathBuf::from("/tmp/keyrelay.toml")));
        assert_eq!(args.match_device_name.as_deref(), Some("^Satechi"));
        assert_eq!(args.match_id.as_deref(), Some("v05ac"));
        assert!(args.non_keyboards);
        assert!(args.no_grab);
        assert_eq!(args.lock_name.as_deref(), Some("satechi"));
        assert_eq!(args.policy, Some(PolicyKind::PushToTalk));
    }

    #[test]
    fn test_debug_and_quiet_conflict() {
        assert!(Args::try_parse_from(["keyrelay", "-d", "-q"]).is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(Args::try_parse_from(["keyrelay", "--policy", "macro"]).is_err());
    }

    #[test]
    fn test_overrides_applied_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[device]\nname = \"Realforce\"\nid = \"v0853\"\n\n[lock]\nname = \"file-lock\"\n\n[log]\nquiet = true\n",
        )
        .unwrap();
        let path_arg = path.to_str().unwrap();

        let args = Args::parse_from(["keyrelay", "-c", path_arg, "-m", "HHKB", "--no-grab", "-d"]);
        let config = load_config(&args).unwrap();

        assert_eq!(config.match_rule.name_pattern(), "HHKB");
        assert_eq!(config.match_rule.id_pattern(), "v0853");
        assert!(!config.grab);
        assert!(config.debug);
        assert!(!config.quiet);
        assert_eq!(config.lock_name, "file-lock");
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_lock_name_flag_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let path_arg = path.to_str().unwrap();

        let config = load_config(&Args::parse_from(["keyrelay", "-c", path_arg])).unwrap();
        assert_eq!(config.lock_name, keyrelay_core::config::default_lock_name());

        let args = Args::parse_from(["keyrelay", "-c", path_arg, "--lock-name", "satechi"]);
        assert_eq!(load_config(&args).unwrap().lock_name, "satechi");
    }

    #[test]
    fn test_invalid_override_pattern() {
        let args = Args::parse_from(["keyrelay", "-m", "("]);
        assert!(matches!(load_config(&args), Err(ConfigError::InvalidPattern(_))));
    }
}

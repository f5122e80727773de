//! Terminal front end for the provisioning engine.
//!
//! This is the stand-in for the browser UI: it only invokes engine
//! operations and prints the session events the engine emits.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use wifisetup_core::backends::http::HttpDevice;
use wifisetup_core::config::{EngineConfig, engine_config_from_toml_str};
use wifisetup_core::traits::DeviceTransport;
use wifisetup_core::{
    NetworkInfo, ParamsUpdate, ProvisioningEngine, SessionEvent, SessionOutcome,
};

const DEFAULT_BASE_URL: &str = "http://192.168.4.1/";

const USAGE: &str = "\
Usage: wifisetup-cli [options] <command> [args]

Commands:
  scan                         list networks in range, strongest first
  params                       show the device's remembered networks
  provision <ssid> [password]  store credentials and test the connection
  reset                        reboot the device to apply its configuration

Options:
  --base-url <url>   device address (default http://192.168.4.1/)
  --config <file>    TOML engine config (base_url, poll_interval_ms, ...)
  --mock             talk to the built-in mock device instead of hardware
";

struct Options {
    base_url: Option<String>,
    config_path: Option<String>,
    mock: bool,
    rest: Vec<String>,
}

fn parse_args() -> Result<Options> {
    let mut args = std::env::args().skip(1);
    let mut options = Options {
        base_url: None,
        config_path: None,
        mock: false,
        rest: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--base-url" => {
                options.base_url = Some(args.next().context("--base-url needs a value")?);
            }
            "--config" => {
                options.config_path = Some(args.next().context("--config needs a value")?);
            }
            "--mock" => options.mock = true,
            _ => options.rest.push(arg),
        }
    }
    Ok(options)
}

fn mock_device() -> Result<Arc<dyn DeviceTransport>> {
    #[cfg(feature = "backend_mock")]
    {
        Ok(Arc::new(wifisetup_core::backends::mock::MockDevice::canned()))
    }
    #[cfg(not(feature = "backend_mock"))]
    {
        bail!("this binary was built without the backend_mock feature")
    }
}

fn build_engine(options: &Options) -> Result<Arc<ProvisioningEngine>> {
    let config = match &options.config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {path}"))?;
            engine_config_from_toml_str(&text)?
        }
        None => EngineConfig::new(options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
    };

    let device: Arc<dyn DeviceTransport> = if options.mock {
        mock_device()?
    } else {
        Arc::new(HttpDevice::new(&config)?)
    };
    Ok(Arc::new(ProvisioningEngine::with_poll_interval(
        device,
        config.poll_interval,
    )))
}

fn print_network(network: &NetworkInfo) {
    println!(
        "  {:<24} {:>4} dB  ch {:<3} {}  bssid {}{}",
        network.ssid,
        network.rssi,
        network.channel,
        network.auth_mode,
        network.bssid_hex(),
        if network.hidden { "  (hidden)" } else { "" },
    );
}

async fn cmd_scan(engine: &ProvisioningEngine) -> Result<()> {
    let networks = engine.scan().await?;
    if networks.is_empty() {
        println!("no networks found");
        return Ok(());
    }
    for network in &networks {
        print_network(network);
    }
    Ok(())
}

async fn cmd_params(engine: &ProvisioningEngine) -> Result<()> {
    engine.refresh_params().await?;
    let table = engine.store().snapshot().await;
    if table.is_empty() {
        println!("the device has no remembered networks");
        return Ok(());
    }
    for (ssid, params) in &table {
        println!("  {ssid}");
        println!("    password: {}", if params.password.is_empty() { "(none)" } else { "********" });
        if let Some(ip) = &params.ip {
            println!("    last ip:  {ip}");
        }
        if let Some(ifconfig) = &params.last_ifconfig {
            println!("    ifconfig: {ifconfig}");
        }
    }
    Ok(())
}

async fn cmd_provision(engine: Arc<ProvisioningEngine>, ssid: &str, password: Option<&str>) -> Result<()> {
    engine.scan().await?;
    engine.open(ssid).await?;
    if let Some(password) = password {
        engine.update_params(ParamsUpdate::password(password)).await?;
    }

    // Print transitions while the state machine runs.
    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::PhaseChanged { ssid, phase } => {
                    println!("[{ssid}] {phase}");
                }
                SessionEvent::PollTick { ssid, elapsed, status } => {
                    println!("[{ssid}] {:.1}s: {status}", elapsed.as_secs_f32());
                }
                SessionEvent::Finished { .. } => break,
            }
        }
    });

    let outcome = engine.provision().await?;
    let _ = printer.await;

    match outcome {
        SessionOutcome::Succeeded { ifconfig } => {
            println!("connected: {ifconfig}");
            Ok(())
        }
        SessionOutcome::Failed { reason } => bail!("provisioning failed: {reason}"),
        SessionOutcome::Aborted => bail!("device went idle before finishing the attempt"),
        SessionOutcome::Cancelled => bail!("session was cancelled"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = parse_args()?;
    let Some(command) = options.rest.first().cloned() else {
        print!("{USAGE}");
        return Ok(());
    };

    let engine = build_engine(&options)?;
    match command.as_str() {
        "scan" => cmd_scan(&engine).await,
        "params" => cmd_params(&engine).await,
        "provision" => {
            let ssid = options
                .rest
                .get(1)
                .context("provision needs an <ssid> argument")?
                .clone();
            let password = options.rest.get(2).map(String::as_str);
            cmd_provision(engine, &ssid, password).await
        }
        "reset" => {
            engine.reset_device().await?;
            println!("device reset requested");
            Ok(())
        }
        other => {
            print!("{USAGE}");
            bail!("unknown command '{other}'")
        }
    }
}

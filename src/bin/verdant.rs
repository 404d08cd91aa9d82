use chrono::Utc;
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use verdant::command::ControlCommand;
use verdant::config::{MasterConfig, DEFAULT_GATEWAY_HOST};
use verdant::gateway::GatewayClient;
use verdant::payload::{encode_reading, RawReading};
use verdant::pipeline::{Pipeline, PipelineOutcome};
use verdant::rules::Action;
use verdant::topic::{encode_sensor_topic, ActuatorAddress, SensorAddress, CONTROL_DOMAIN, CONTROL_SUBSCRIPTION};
use verdant::units::format_timestamp;

const DEFAULT_PORT: &str = "1883";
const CHECK_NODE_ID: &str = "cli";

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    let matches = App::new("verdant")
        .version("0.1.0")
        .about("🌱 Verdant - greenhouse master controller tools")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Gateway host address")
                .takes_value(true)
                .default_value(DEFAULT_GATEWAY_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Gateway port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("publish")
                .about("📡 Publish a sensor reading as a node would")
                .arg(Arg::with_name("node").help("Node id").required(true))
                .arg(Arg::with_name("category").help("Sensor category").required(true))
                .arg(
                    Arg::with_name("value")
                        .help("Reading value")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(|v| v.parse::<f64>().map(|_| ()).map_err(|_| "Value must be a number".to_string())),
                )
                .arg(Arg::with_name("unit").help("Unit as reported by the sensor").required(true))
                .arg(
                    Arg::with_name("timestamp")
                        .long("timestamp")
                        .value_name("TIMESTAMP")
                        .help("Reading timestamp (defaults to now)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("watch")
                .about("👀 Stream bus traffic")
                .arg(
                    Arg::with_name("pattern")
                        .long("pattern")
                        .value_name("PATTERN")
                        .help("Topic filter, + and # wildcards allowed")
                        .takes_value(true)
                        .default_value(CONTROL_SUBSCRIPTION),
                ),
        )
        .subcommand(
            SubCommand::with_name("actuate")
                .about("🎛️  Send a manual command to an actuator")
                .arg(Arg::with_name("node").help("Node id").required(true))
                .arg(Arg::with_name("actuator").help("Actuator category").required(true))
                .arg(
                    Arg::with_name("action")
                        .help("Action to apply")
                        .required(true)
                        .possible_values(&["on", "off", "increase", "decrease"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("🧪 Evaluate a reading against the policies offline")
                .arg(Arg::with_name("category").help("Sensor category").required(true))
                .arg(
                    Arg::with_name("value")
                        .help("Reading value")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(|v| v.parse::<f64>().map(|_| ()).map_err(|_| "Value must be a number".to_string())),
                )
                .arg(Arg::with_name("unit").help("Unit as reported by the sensor").required(true))
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .value_name("FILE")
                        .help("Policy configuration (defaults to the built-in greenhouse policies)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("server")
                .about("🚀 Start the master controller")
                .arg(
                    Arg::with_name("background")
                        .short("b")
                        .long("background")
                        .help("Run the controller in the background"),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_GATEWAY_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        println!("{}", "🌱 Verdant".bright_green().bold());
        println!("{} {}:{}", "Gateway".dimmed(), host, port);
    }

    match matches.subcommand() {
        ("publish", Some(sub_matches)) => handle_publish(sub_matches, host, port, format, verbose).await?,
        ("watch", Some(sub_matches)) => handle_watch(sub_matches, host, port, format).await?,
        ("actuate", Some(sub_matches)) => handle_actuate(sub_matches, host, port, format, verbose).await?,
        ("check", Some(sub_matches)) => handle_check(sub_matches, format)?,
        ("server", Some(sub_matches)) => handle_server(sub_matches, port)?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the master controller", "verdant server".bright_cyan());
            println!("  {} Publish a reading", "verdant publish node01 temperature 90 F".bright_cyan());
            println!("  {} Watch control commands", "verdant watch".bright_cyan());
        }
    }

    Ok(())
}

async fn handle_publish(matches: &ArgMatches<'_>, host: &str, port: u16, format: &str, verbose: bool) -> CliResult {
    let address = SensorAddress::new(
        matches.value_of("node").unwrap_or_default(),
        matches.value_of("category").unwrap_or_default(),
    )?;
    let value: f64 = matches.value_of("value").unwrap_or_default().parse()?;
    let unit = matches.value_of("unit").unwrap_or_default();
    let timestamp = match matches.value_of("timestamp") {
        Some(timestamp) => timestamp.to_string(),
        None => format_timestamp(Utc::now()),
    };

    let topic = encode_sensor_topic(&address);
    let payload = encode_reading(&RawReading::new(value, unit, &timestamp))?;
    if verbose {
        println!("{} {} {}", "Publishing".dimmed(), topic, String::from_utf8_lossy(&payload));
    }

    let mut client = connect(host, port).await?;
    let receivers = client.publish(&topic, &payload).await?;
    print_published(&topic, receivers, format);
    Ok(())
}

async fn handle_actuate(matches: &ArgMatches<'_>, host: &str, port: u16, format: &str, verbose: bool) -> CliResult {
    let address = ActuatorAddress::new(
        matches.value_of("node").unwrap_or_default(),
        matches.value_of("actuator").unwrap_or_default(),
    )?;
    let action: Action = matches.value_of("action").unwrap_or_default().parse()?;
    let command = ControlCommand::manual(address, action, Utc::now());

    let topic = command.topic();
    let payload = command.encode_payload()?;
    if verbose {
        println!("{} {} {}", "Sending".dimmed(), topic, String::from_utf8_lossy(&payload));
    }

    let mut client = connect(host, port).await?;
    let receivers = client.publish(&topic, &payload).await?;
    print_published(&topic, receivers, format);
    Ok(())
}

async fn handle_watch(matches: &ArgMatches<'_>, host: &str, port: u16, format: &str) -> CliResult {
    let pattern = matches.value_of("pattern").unwrap_or(CONTROL_SUBSCRIPTION);
    let mut client = connect(host, port).await?;
    client.subscribe(pattern).await?;

    if format == "table" {
        println!("{} {}", "👀 Watching".bright_blue().bold(), pattern.bright_white());
        println!("{}", "Press Ctrl+C to stop".dimmed());
    }

    loop {
        let message = client.next_message().await?;
        match format {
            "json" => println!(
                "{}",
                serde_json::json!({ "topic": message.topic, "payload": message.payload_str() })
            ),
            "compact" => println!("{} {}", message.topic, message.payload_str()),
            _ => {
                let is_control = message.topic.split('/').nth(1) == Some(CONTROL_DOMAIN);
                match ControlCommand::decode(&message.topic, &message.payload) {
                    Ok(command) if is_control => println!(
                        "{} {} {} {} {}",
                        command.timestamp.dimmed(),
                        command.address.to_string().bright_white(),
                        "→".dimmed(),
                        command.action.to_string().bright_cyan().bold(),
                        format!("({})", command.source).dimmed()
                    ),
                    _ => println!("{} {}", message.topic.bright_white(), message.payload_str()),
                }
            }
        }
    }
}

fn handle_check(matches: &ArgMatches<'_>, format: &str) -> CliResult {
    let config = match matches.value_of("config") {
        Some(path) => MasterConfig::load(Path::new(path))?,
        None => MasterConfig::default(),
    };
    let pipeline = Pipeline::new(Arc::new(config.policy_table()?));

    let address = SensorAddress::new(CHECK_NODE_ID, matches.value_of("category").unwrap_or_default())?;
    let value: f64 = matches.value_of("value").unwrap_or_default().parse()?;
    let unit = matches.value_of("unit").unwrap_or_default();
    let now = Utc::now();
    let payload = encode_reading(&RawReading::new(value, unit, &format_timestamp(now)))?;

    let outcome = pipeline.process(&encode_sensor_topic(&address), &payload, now)?;
    print_check(&outcome, format);
    Ok(())
}

fn handle_server(matches: &ArgMatches<'_>, port: u16) -> CliResult {
    let background = matches.is_present("background");
    let port_arg = port.to_string();

    println!("{}", "🚀 Starting Verdant master controller...".bright_green().bold());

    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--bin", "verdant-master", "--", "--port", port_arg.as_str()]);

    if background {
        cmd.spawn()?;
        println!("{} Controller started in background on port {}", "✅".green(), port);
    } else {
        println!("{} Controller starting on port {} (Press Ctrl+C to stop)", "🌐".bright_blue(), port);
        cmd.status()?;
    }

    Ok(())
}

// Helper functions

async fn connect(host: &str, port: u16) -> Result<GatewayClient, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    match GatewayClient::connect(addr.as_str()).await {
        Ok(client) => Ok(client),
        Err(e) => {
            eprintln!("{} Failed to connect to gateway at {}", "❌".red(), addr.bright_white());
            eprintln!("{} Is the controller running? Start it with:", "💡".yellow());
            eprintln!("   {}", "verdant server".bright_cyan());
            Err(e.into())
        }
    }
}

fn print_published(topic: &str, receivers: usize, format: &str) {
    match format {
        "json" => println!("{}", serde_json::json!({ "topic": topic, "receivers": receivers })),
        "compact" => println!("{}", "OK".bright_green()),
        _ => println!(
            "{} Published to {} ({} subscriber{})",
            "✅".green(),
            topic.bright_white(),
            receivers,
            if receivers == 1 { "" } else { "s" }
        ),
    }
}

fn print_check(outcome: &PipelineOutcome, format: &str) {
    let command = outcome.command.as_ref();
    match format {
        "json" => println!(
            "{}",
            serde_json::json!({
                "reading": outcome.reading,
                "diagnostic": outcome.diagnostic.as_ref().map(ToString::to_string),
                "command": command.map(|c| serde_json::json!({ "topic": c.topic(), "payload": c.payload() })),
            })
        ),
        "compact" => match command {
            Some(command) => println!("{}", command.action.to_string().bright_cyan()),
            None => println!("{}", "ok".bright_green()),
        },
        _ => {
            println!(
                "{} {} {}",
                "Reading:".bright_white(),
                outcome.reading.value,
                outcome.reading.unit
            );
            if let Some(diagnostic) = &outcome.diagnostic {
                println!("{} {}", "⚠️ ".yellow(), diagnostic.to_string().yellow());
            }
            match command {
                Some(command) => println!(
                    "{} {} {}",
                    "Action:".bright_white(),
                    command.action.to_string().bright_cyan().bold(),
                    format!("→ {}", command.topic()).dimmed()
                ),
                None => println!("{} {}", "Action:".bright_white(), "none, within range".bright_green()),
            }
        }
    }
}

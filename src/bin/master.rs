use clap::{App, Arg};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};
use verdant::audit::{AuditSink, JsonLinesAuditSink, MemoryAuditSink};
use verdant::bus::{InMemoryBus, Transport};
use verdant::config::MasterConfig;
use verdant::controller::MasterController;
use verdant::gateway;
use verdant::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("verdant-master")
        .version("0.1.0")
        .about("Greenhouse master controller")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Gateway bind address (overrides the config file)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Gateway port (overrides the config file)")
                .takes_value(true)
                .validator(|v| v.parse::<u16>().map(|_| ()).map_err(|_| "Port must be 0-65535".to_string())),
        )
        .arg(
            Arg::with_name("audit-log")
                .long("audit-log")
                .value_name("FILE")
                .help("Append audit records to this JSON-lines file")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => MasterConfig::load(Path::new(path))?,
        None => MasterConfig::default(),
    };
    if let Some(host) = matches.value_of("host") {
        config.gateway.host = host.to_string();
    }
    if let Some(port) = matches.value_of("port") {
        config.gateway.port = port.parse()?;
    }
    if let Some(path) = matches.value_of("audit-log") {
        config.audit_log = Some(path.into());
    }

    println!("🌱 Verdant Master Controller");
    println!("============================");

    let table = config.policy_table()?;
    for policy in table.iter() {
        info!(
            category = policy.sensor_category(),
            min = ?policy.min(),
            max = ?policy.max(),
            "Loaded policy"
        );
    }

    let bus = Arc::new(InMemoryBus::with_capacity(config.bus_capacity));
    let audit: Arc<dyn AuditSink> = match &config.audit_log {
        Some(path) => {
            info!(path = %path.display(), "Writing audit log");
            Arc::new(JsonLinesAuditSink::open(path)?)
        }
        None => Arc::new(MemoryAuditSink::new()),
    };

    let subscription = bus.subscribe(&config.subscribe_pattern)?;
    let transport: Arc<dyn Transport> = bus.clone();
    let controller = Arc::new(MasterController::new(Pipeline::new(Arc::new(table)), transport, audit));

    let listener = TcpListener::bind(config.gateway.address()).await?;
    let gateway_bus = Arc::clone(&bus);
    let gateway_task = tokio::spawn(async move {
        if let Err(e) = gateway::serve(listener, gateway_bus).await {
            error!("Gateway error: {}", e);
        }
    });

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run_controller = Arc::clone(&controller);
    let controller_task = tokio::spawn(async move {
        run_controller
            .run(subscription, async {
                let _ = stop_rx.await;
            })
            .await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    gateway_task.abort();
    let _ = stop_tx.send(());
    controller_task.await?;

    let stats = controller.stats();
    info!(
        received = stats.messages_received,
        evaluated = stats.readings_evaluated,
        dropped = stats.malformed_topics + stats.invalid_payloads,
        commands = stats.commands_published,
        failures = stats.publish_failures,
        "Controller stopped"
    );

    Ok(())
}

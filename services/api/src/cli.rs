use crate::demo::{run_seed, SeedArgs};
use crate::server;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use locapro::config::AppConfig;
use locapro::email::templates::{configuration_test, ConfigurationTest};
use locapro::email::{EmailDispatcher, EmailMessage};
use locapro::error::AppError;
use locapro::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "LocaProConnect",
    about = "Run the LocaProConnect marketplace service and its operator tooling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the demo provider catalogue loaded by `serve --seed-demo`
    Seed(SeedArgs),
    /// Email configuration tooling
    Email {
        #[command(subcommand)]
        command: EmailCommand,
    },
}

#[derive(Subcommand, Debug)]
enum EmailCommand {
    /// Send a test email through the configured backend
    Test(EmailTestArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load demo providers and price ranges before accepting traffic
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct EmailTestArgs {
    /// Recipient address (defaults to DEFAULT_FROM_EMAIL)
    #[arg(long)]
    pub(crate) to: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Seed(args) => run_seed(args),
        Command::Email {
            command: EmailCommand::Test(args),
        } => run_email_test(args).await,
    }
}

async fn run_email_test(args: EmailTestArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let email = config.email;

    println!("Email configuration");
    println!("  Backend: {}", email.backend.label());
    println!("  Host:    {}", email.host);
    println!("  Port:    {}", email.port);
    println!("  TLS:     {}", if email.use_tls { "yes" } else { "no" });
    println!("  From:    {}", email.default_from);

    let dispatcher = EmailDispatcher::from_config(&email)?;
    let recipient = args.to.unwrap_or_else(|| email.default_from.clone());
    let rendered = configuration_test(&ConfigurationTest {
        backend: email.backend.label(),
        host: email.host.clone(),
        port: email.port,
        use_tls: email.use_tls,
        sent_at: Utc::now(),
    });
    let message = EmailMessage::new(recipient.clone(), dispatcher.default_from(), rendered);

    let attempts = tokio::task::spawn_blocking(move || {
        dispatcher.send_now(&message, "configuration_test")
    })
    .await
    .map_err(|err| AppError::Io(std::io::Error::other(err)))??;

    println!("Test email sent to {recipient} after {attempts} attempt(s).");
    Ok(())
}

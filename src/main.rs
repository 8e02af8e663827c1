use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};

use commstool::api::JiraClient;
use commstool::config::Settings;
use commstool::models::{EmailDraft, Ticket, TicketKind};
use commstool::template::EmailTemplate;

#[derive(Parser)]
#[command(name = "commstool")]
#[command(version)]
#[command(about = "Turn Jira tickets into comms email drafts", long_about = None)]
struct Cli {
    /// for debugging purposes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a comms email draft for a ticket
    Email {
        /// (e.g., OPS-260857)
        ticket_ref: String,

        /// Recipient address, repeatable (default: email.default_recipients)
        #[arg(long = "to")]
        recipients: Vec<String>,

        /// Sender address (default: email.default_sender)
        #[arg(long)]
        from: Option<String>,

        /// Override the subject derived from the ticket
        #[arg(long)]
        subject: Option<String>,

        /// HTML template with {{ ref }}, {{ summary }} and {{ desc }} placeholders
        #[arg(long)]
        template: Option<PathBuf>,

        /// Directory to write <TICKET>_comms.eml into (default: email.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a finished message instead of an unsent draft
        #[arg(long = "final")]
        final_copy: bool,

        /// Open the written draft in the default mail client
        #[arg(long)]
        open: bool,
    },

    /// Show how a ticket is classified
    Show {
        /// (e.g., OPS-260857)
        ticket_ref: String,
    },

    /// Create the configuration file interactively
    Init,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Get the path to the config file
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Email {
            ticket_ref,
            recipients,
            from,
            subject,
            template,
            output,
            final_copy,
            open,
        } => {
            let request = EmailRequest {
                ticket_ref,
                recipients,
                from,
                subject,
                template,
                output,
                is_draft: !final_copy,
                open,
            };
            handle_email(request).await
        }

        Commands::Show { ticket_ref } => handle_show(&ticket_ref).await,

        Commands::Init => handle_init(),

        Commands::Config { action } => handle_config(action),
    };

    if let Err(e) = result {
        eprintln!("\n{}", e);
        std::process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "commstool=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct EmailRequest {
    ticket_ref: String,
    recipients: Vec<String>,
    from: Option<String>,
    subject: Option<String>,
    template: Option<PathBuf>,
    output: Option<PathBuf>,
    is_draft: bool,
    open: bool,
}

async fn handle_email(request: EmailRequest) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Preparing comms for {}...", request.ticket_ref).cyan().bold()
    );
    println!();

    let settings = Settings::load()?;
    let client = JiraClient::new(&settings.transport)?;

    println!("{}", "  Fetching Jira ticket...".dimmed());
    let ticket = Ticket::resolve(
        &client,
        &request.ticket_ref,
        &settings.api_base()?,
        &settings.field_options(),
    )
    .await?;
    println!(
        "{}",
        format!("  ✓ Found: {}", ticket.summary().unwrap_or("(no summary)")).green()
    );

    let recipients = if request.recipients.is_empty() {
        settings.email.default_recipients.clone()
    } else {
        request.recipients
    };
    let sender = request
        .from
        .unwrap_or_else(|| settings.email.default_sender.clone());

    let template = match request.template.or_else(|| settings.email.template_path.clone()) {
        Some(path) => EmailTemplate::from_file(&path)?,
        None => EmailTemplate::builtin(),
    };

    let mut email = EmailDraft::create(&ticket, sender, recipients, request.subject, request.is_draft);
    email.populate(&ticket, &template)?;
    let bytes = email.serialize()?;

    let output_dir = request
        .output
        .unwrap_or_else(|| settings.email.output_dir.clone());
    let path = write_draft(&output_dir, ticket.reference(), &bytes)?;

    if !email.rejected_recipients().is_empty() {
        println!();
        println!("{}", "  Skipped invalid addresses:".yellow());
        for address in email.rejected_recipients() {
            println!("{}", format!("    - {}", address).yellow());
        }
    }

    println!();
    println!("{}", "Email draft ready!".green().bold());
    println!("  {} {}", "Subject:".bold(), email.subject().bright_white());
    println!("  {} {}", "Bcc:".bold(), email.recipients().len());
    println!("  {} {}", "File:".bold(), path.display().to_string().bright_cyan());

    if request.open {
        open::that(&path).context("Failed to open the draft")?;
    }

    Ok(())
}

fn draft_file_name(reference: &str) -> String {
    format!("{}_comms.eml", reference)
}

fn write_draft(output_dir: &Path, reference: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(draft_file_name(reference));
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

async fn handle_show(ticket_ref: &str) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let client = JiraClient::new(&settings.transport)?;

    let ticket = Ticket::resolve(
        &client,
        ticket_ref,
        &settings.api_base()?,
        &settings.field_options(),
    )
    .await?;

    println!("  {} {}", "Key:".bold(), ticket.reference().bright_white());
    println!("  {} {}", "Project:".bold(), ticket.project());
    println!("  {} {}", "Status:".bold(), ticket.status().yellow());
    println!(
        "  {} {}",
        "Summary:".bold(),
        ticket.summary().unwrap_or("").bright_white()
    );
    println!("  {} {}", "Jira:".bold(), ticket.ui_location().as_str().cyan());

    match ticket.kind() {
        TicketKind::Incident(incident) => {
            println!("  {} {}", "Type:".bold(), "OPS incident".red());
            println!("  {} {}", "Priority:".bold(), incident.priority);
            println!("  {} {}", "Start:".bold(), incident.start_time);
            match incident.end_time {
                Some(end) => println!("  {} {}", "End:".bold(), end),
                None => println!("  {} {}", "End:".bold(), "ongoing".dimmed()),
            }
        }
        TicketKind::Generic => {
            println!("  {} {}", "Type:".bold(), "advisory".dimmed());
        }
    }

    Ok(())
}

fn handle_init() -> anyhow::Result<()> {
    println!("{}", "Let's set up commstool".cyan().bold());
    println!();

    let mut settings = initial_settings(&Settings::config_path()?)?;

    settings.jira.server = prompt_with_default("Jira server", &settings.jira.server)?;
    settings.jira.api_path = prompt_with_default("API path", &settings.jira.api_path)?;

    let current_cert = settings
        .transport
        .cert_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let cert = prompt_with_default("Client certificate (PEM, blank for none)", &current_cert)?;
    settings.transport.cert_path = if cert.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(cert.trim()))
    };

    settings.email.default_sender =
        prompt_with_default("Default sender address", &settings.email.default_sender)?;
    let recipients = prompt_with_default(
        "Default recipients (comma separated)",
        &settings.email.default_recipients.join(","),
    )?;
    settings.email.default_recipients = split_list(&recipients);

    settings.save()?;

    println!();
    println!("{}", "✓ Configuration saved".green().bold());
    println!("  {}", Settings::config_path()?.display());

    Ok(())
}

/// Existing settings to seed the prompts with. A config file that fails to
/// parse is an error rather than being replaced with defaults.
fn initial_settings(path: &Path) -> anyhow::Result<Settings> {
    Settings::load_from(path).with_context(|| {
        format!(
            "Existing configuration at {} could not be read; fix or remove it before running init",
            path.display()
        )
    })
}

fn prompt_with_default(message: &str, default: &str) -> anyhow::Result<String> {
    let value = dialoguer::Input::<String>::new()
        .with_prompt(message)
        .default(default.to_string())
        .allow_empty(true)
        .interact_text()?;
    Ok(value)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn handle_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = Settings::load()?;

            println!("{}", "Jira".bold());
            println!("  API base:     {}", settings.api_base()?);
            println!("  Priority:     {}", settings.custom_fields.incident_priority);
            println!("  Start time:   {}", settings.custom_fields.incident_start_time);
            println!("  End time:     {}", settings.custom_fields.incident_end_time);
            println!("  Time format:  {}", settings.time.jira_datetime_format);
            println!();
            println!("{}", "Transport".bold());
            match &settings.transport.cert_path {
                Some(path) => println!("  Certificate:  {}", path.display()),
                None => println!("  Certificate:  {}", "(none)".dimmed()),
            }
            println!("  User-Agent:   {}", settings.transport.user_agent);
            println!();
            println!("{}", "Email".bold());
            println!("  Sender:       {}", settings.email.default_sender);
            println!(
                "  Recipients:   {}",
                settings.email.default_recipients.join(", ")
            );
            match &settings.email.template_path {
                Some(path) => println!("  Template:     {}", path.display()),
                None => println!("  Template:     {}", "(built-in)".dimmed()),
            }
            println!("  Output dir:   {}", settings.email.output_dir.display());
        }
        ConfigAction::Path => {
            println!("{}", Settings::config_path()?.display());
        }
    }

    Ok(())
}

//! Hospital Portal front desk
//!
//! Look up a patient by card number, verify identity, open the record.
//! Also registration, booking and audit browsing for admin staff.

mod desk;
mod prompt;
mod render;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use hospital_portal_client::{ApiConfig, HttpApiClient};
use hospital_portal_core::audit::{AccessLogQuery, AuditLogQuery, DEFAULT_PAGE_SIZE};
use hospital_portal_core::model::AuditAction;
use hospital_portal_core::records::RecordTab;
use hospital_portal_core::CardNumberPolicy;
use tracing_subscriber::EnvFilter;

use desk::{Desk, LookupOptions, Verification};

/// Environment variable holding the log filter
const LOG_ENV: &str = "PORTAL_LOG";

#[derive(Parser)]
#[command(name = "portal-desk")]
#[command(about = "Hospital front desk: card lookup, identity verification and patient records")]
struct Cli {
    /// Backend base URL (overrides HOSPITAL_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Staff username recorded in access logs
    #[arg(long, global = true)]
    staff: Option<String>,

    /// Use the built-in demo backend instead of the REST API
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum VerifyArg {
    /// One-time code sent to the patient's phone
    Otp,
    /// Staff confirm identity in person
    Staff,
}

#[derive(Clone, Copy, ValueEnum)]
enum TabArg {
    Overview,
    Medications,
    Prescriptions,
    TestResults,
    Vaccinations,
    Visits,
}

impl From<TabArg> for RecordTab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Overview => RecordTab::Overview,
            TabArg::Medications => RecordTab::Medications,
            TabArg::Prescriptions => RecordTab::Prescriptions,
            TabArg::TestResults => RecordTab::TestResults,
            TabArg::Vaccinations => RecordTab::Vaccinations,
            TabArg::Visits => RecordTab::Visits,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a card number and open the patient's record
    Lookup {
        /// Card number, e.g. ABC-2024-123
        card: String,

        /// Confirm identity and show the full record
        #[arg(long, value_enum)]
        verify: Option<VerifyArg>,

        /// Purpose recorded in the access log
        #[arg(long, default_value = "Front desk lookup")]
        purpose: String,

        /// Only show these tabs of the full record
        #[arg(long, value_enum)]
        tab: Vec<TabArg>,

        /// Accept patient self-service card numbers (1-4 letter prefix)
        #[arg(long)]
        self_service: bool,

        /// Add a prescription once the record is open
        #[arg(long)]
        prescribe: bool,
    },

    /// Read decoded QR codes from stdin, one per line
    Scan,

    /// Patient self-registration
    Register,

    /// Browse the audit trail, newest first
    Audit {
        #[arg(long)]
        user_id: Option<i64>,

        #[arg(long)]
        username: Option<String>,

        /// e.g. VIEW_RECORD, scan-card
        #[arg(long)]
        action: Option<AuditAction>,

        #[arg(long)]
        entity_type: Option<String>,

        #[arg(long)]
        entity_id: Option<String>,

        /// RFC 3339 timestamp
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// RFC 3339 timestamp
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        #[arg(long, default_value = "0")]
        page: usize,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: usize,
    },

    /// Record access entries
    AccessLogs {
        #[arg(long)]
        patient: Option<i64>,

        #[arg(long)]
        staff_username: Option<String>,
    },

    /// List providers
    Providers,

    /// A provider's time slots for a date (default today)
    Slots {
        provider: i64,

        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Book an appointment
    Book {
        #[arg(long)]
        patient: i64,

        #[arg(long)]
        provider: i64,

        #[arg(long)]
        date: Option<NaiveDate>,

        /// Prompted for when omitted
        #[arg(long)]
        slot: Option<i64>,

        #[arg(long)]
        reason: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn connect(cli: &Cli) -> Result<Desk> {
    let mut config = ApiConfig::from_env().context("reading API configuration")?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if let Some(staff) = &cli.staff {
        config = config.with_staff_username(staff.trim());
    }
    let staff = config.staff_username.clone();

    if cli.offline {
        println!("{}", "  Offline mode: using the built-in demo backend".yellow());
        return Ok(Desk::offline(staff));
    }
    let client = HttpApiClient::new(config)?;
    Ok(Desk::new(Arc::new(client), staff))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    render::banner("HOSPITAL PORTAL FRONT DESK");
    let desk = connect(&cli)?;

    match cli.command {
        Commands::Lookup {
            card,
            verify,
            purpose,
            tab,
            self_service,
            prescribe,
        } => {
            let options = LookupOptions {
                verify: verify.map(|v| match v {
                    VerifyArg::Otp => Verification::Otp,
                    VerifyArg::Staff => Verification::Staff,
                }),
                purpose,
                tabs: tab.into_iter().map(RecordTab::from).collect(),
                policy: if self_service {
                    CardNumberPolicy::SelfService
                } else {
                    CardNumberPolicy::Staff
                },
                prescribe,
            };
            desk.lookup(&card, options).await
        }
        Commands::Scan => desk.scan_stream().await,
        Commands::Register => desk.register().await,
        Commands::Audit {
            user_id,
            username,
            action,
            entity_type,
            entity_id,
            from,
            to,
            page,
            size,
        } => {
            let mut query = AuditLogQuery::new().between(from, to).page(page, size);
            query.user_id = user_id;
            query.username = username;
            query.action = action;
            query.entity_type = entity_type;
            query.entity_id = entity_id;
            desk.audit(query).await
        }
        Commands::AccessLogs { patient, staff_username } => {
            desk.access_logs(AccessLogQuery {
                patient_id: patient,
                staff_username,
            })
            .await
        }
        Commands::Providers => desk.providers().await,
        Commands::Slots { provider, date } => desk.slots(provider, date).await,
        Commands::Book {
            patient,
            provider,
            date,
            slot,
            reason,
        } => desk.book(patient, provider, date, slot, reason).await,
    }
}

//! Command-line front end for audience triage and lead scoring.
//!
//! Usage:
//!     triage capture "https://m5max.com.br/kits?utm_source=youtube&utm_medium=video&utm_campaign=kit-diy"
//!     triage detect --url "/?fbclid=abc" --visit /cha-revelacao --product kit-cha-surpresa --time-ms 90000
//!     triage score --track personal --event cha-revelacao --budget 15k-30k
//!     triage link --phone "+55 11 98888-7777" --audience cha --marketing --url "/?utm_source=..."
//!     triage submit --lead lead.json
//!     triage health

mod settings;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use m5max_attribution::{extract_attribution, LandingRequest};
use m5max_backend_supabase::{LeadSink, SupabaseSink};
use m5max_detect::score_candidates;
use m5max_explain::{explain_signal, summarize_detection};
use m5max_leadscore::{field_points, score_record};
use m5max_links::{LinkDialect, MessageContext, WhatsAppDialect};
use m5max_model::{Audience, LastInteraction, LeadAnswers, LeadRecord, LeadTrack};
use m5max_session::{ConsentPreferences, SessionContext};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Audience triage and lead scoring for the m5max site")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON settings file (weights, thresholds, Supabase)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Supabase API key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract attribution from a landing URL
    Capture {
        /// Landing URL or path with query
        url: String,

        /// document.referrer
        #[arg(long)]
        referrer: Option<String>,
    },

    /// Run a simulated session through detection
    Detect {
        /// Landing URL or path with query
        #[arg(long, default_value = "/")]
        url: String,

        /// Further pages visited, in order (the last one is the current page)
        #[arg(long = "visit")]
        visits: Vec<String>,

        /// Product ids viewed
        #[arg(long = "product")]
        products: Vec<String>,

        /// Milliseconds since the session started
        #[arg(long, default_value = "0")]
        time_ms: u64,

        /// Last interaction (product, service, hero, footer)
        #[arg(long)]
        interaction: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Score lead form answers
    Score {
        /// Form track (corporate, personal)
        #[arg(short, long)]
        track: String,

        #[arg(long)]
        budget: Option<String>,

        #[arg(long)]
        attendees: Option<String>,

        #[arg(long)]
        event: Option<String>,

        #[arg(long)]
        product: Option<String>,
    },

    /// Build a WhatsApp deep link
    Link {
        /// Business phone number
        #[arg(long)]
        phone: String,

        /// Audience (b2b, cha, kits, general)
        #[arg(long, default_value = "general")]
        audience: String,

        #[arg(long)]
        product: Option<String>,

        #[arg(long)]
        page: Option<String>,

        /// Landing URL to take campaign parameters from
        #[arg(long)]
        url: Option<String>,

        /// Visitor granted marketing consent
        #[arg(long)]
        marketing: bool,
    },

    /// Score a lead file and send it to Supabase
    Submit {
        /// Path to a lead JSON file
        #[arg(short, long)]
        lead: PathBuf,

        /// Print the scored lead without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Check lead sink health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let directive = if cli.verbose { "m5max=debug" } else { "m5max=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(cli.config.as_deref())?
        .with_supabase(cli.supabase_url, cli.supabase_key);

    match cli.command {
        Commands::Capture { url, referrer } => {
            run_capture(&url, referrer)?;
        }
        Commands::Detect {
            url,
            visits,
            products,
            time_ms,
            interaction,
            format,
        } => {
            run_detect(&settings, &url, &visits, &products, time_ms, interaction, &format)?;
        }
        Commands::Score {
            track,
            budget,
            attendees,
            event,
            product,
        } => {
            let answers = LeadAnswers {
                budget_range: budget,
                attendees_range: attendees,
                event_type: event,
                product_type: product,
            };
            run_score(&settings, &track, answers)?;
        }
        Commands::Link {
            phone,
            audience,
            product,
            page,
            url,
            marketing,
        } => {
            run_link(&phone, &audience, product, page, url, marketing)?;
        }
        Commands::Submit { lead, dry_run } => {
            run_submit(settings, &lead, dry_run).await?;
        }
        Commands::Health => {
            run_health(settings).await?;
        }
    }

    Ok(())
}

fn run_capture(url: &str, referrer: Option<String>) -> Result<()> {
    let mut request = LandingRequest::from_url(url);
    if let Some(referrer) = referrer {
        request = request.with_referrer(referrer);
    }

    let attribution = extract_attribution(&request, Utc::now());
    println!("{}", serde_json::to_string_pretty(&attribution)?);
    Ok(())
}

fn run_detect(
    settings: &Settings,
    url: &str,
    visits: &[String],
    products: &[String],
    time_ms: u64,
    interaction: Option<String>,
    format: &str,
) -> Result<()> {
    let started_at = Utc::now();
    let mut session = SessionContext::new(started_at);
    session.capture_attribution(&LandingRequest::from_url(url), started_at);

    for path in visits {
        session.visit(path);
    }
    for product in products {
        session.view_product(product);
    }
    if let Some(name) = interaction {
        let Some(kind) = LastInteraction::from_name(&name) else {
            bail!("Unknown interaction '{}' (expected product, service, hero, footer)", name);
        };
        session.interact(kind);
    }

    let now = session_clock(started_at, time_ms)?;
    tracing::debug!(pages = session.pages_visited(), time_ms, "Simulated session ready");
    let pass = session.triage(&settings.detection, &settings.thresholds, now);
    let Some(result) = pass.detection else {
        bail!("A fresh session always runs detection");
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let factors = session.factors(now);
    println!("Factors: {:?}", factors);
    println!("---");
    println!("{}", summarize_detection(&result, &settings.thresholds));

    let winner = score_candidates(&factors, &settings.detection)
        .into_iter()
        .find(|c| c.audience == result.suggested_audience && c.total() > 0);
    match winner {
        Some(candidate) => {
            for signal in &candidate.signals {
                let explanation = explain_signal(signal, candidate.audience);
                println!(
                    "  [{}] {}: {}",
                    signal.bucket().as_str(),
                    signal.label(),
                    explanation.summary
                );
                println!("        {}", explanation.detail);
                for item in &explanation.evidence {
                    match &item.context {
                        Some(context) => println!("        {} = {} ({})", item.kind, item.value, context),
                        None => println!("        {} = {}", item.kind, item.value),
                    }
                }
            }
        }
        None => {
            for reason in &result.reasons {
                println!("  - {}", reason);
            }
        }
    }
    println!(
        "Lead form track: {}",
        LeadTrack::for_audience(result.suggested_audience).as_str()
    );
    Ok(())
}

/// Session clock after `time_ms` milliseconds on site.
fn session_clock(started_at: DateTime<Utc>, time_ms: u64) -> Result<DateTime<Utc>> {
    let elapsed = i64::try_from(time_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .with_context(|| format!("--time-ms {} is out of range", time_ms))?;
    started_at
        .checked_add_signed(elapsed)
        .with_context(|| format!("--time-ms {} overflows the session clock", time_ms))
}

fn run_score(settings: &Settings, track: &str, answers: LeadAnswers) -> Result<()> {
    let Some(track) = LeadTrack::from_name(track) else {
        bail!("Unknown track '{}' (expected corporate or personal)", track);
    };

    let mut record = LeadRecord::new("", "", track);
    record.answers = answers;
    let score = score_record(&mut record, &settings.lead_weights);

    for (field, points) in field_points(track, &record.answers, &settings.lead_weights) {
        println!("  {:<16} +{}", field.name(), points);
    }
    println!("Lead score ({}): {}", track.as_str(), score);
    Ok(())
}

fn run_link(
    phone: &str,
    audience: &str,
    product: Option<String>,
    page: Option<String>,
    url: Option<String>,
    marketing: bool,
) -> Result<()> {
    let now = Utc::now();
    let mut session = SessionContext::new(now);
    if let Some(url) = url {
        session.capture_attribution(&LandingRequest::from_url(&url), now);
    }
    if marketing {
        session.set_consent(ConsentPreferences::accept_all(now));
    }

    let mut context = MessageContext::new(Audience::from(audience)).with_utm(session.marketing_utm());
    context.product = product;
    context.page = page;

    let link = WhatsAppDialect::new(phone)
        .translate(&context)
        .context("Failed to build WhatsApp link")?;
    println!("{}", link);
    Ok(())
}

async fn run_submit(settings: Settings, path: &Path, dry_run: bool) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lead {}", path.display()))?;
    let mut lead: LeadRecord = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse lead {}", path.display()))?;

    let score = score_record(&mut lead, &settings.lead_weights);
    println!("Lead '{}' ({}) scored {}", lead.name, lead.track.as_str(), score);

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&lead)?);
        return Ok(());
    }

    if settings.supabase.api_key.is_empty() {
        bail!("No Supabase key; pass --supabase-key or set SUPABASE_ANON_KEY");
    }

    let sink = SupabaseSink::new(settings.supabase)?;
    sink.submit(&lead).await?;
    println!("Submitted to {}", sink.name());
    Ok(())
}

async fn run_health(settings: Settings) -> Result<()> {
    let sink = SupabaseSink::new(settings.supabase)?;
    print!("Checking {} sink... ", sink.name());

    match sink.health_check().await {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {}", e);
            std::process::exit(1);
        }
    }
}

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use coaching_signal_engine::db::{self, PgStore};
use coaching_signal_engine::lifecycle::ActivationStatus;
use coaching_signal_engine::logging::{self, LogFormat};
use coaching_signal_engine::models::{
    FeedbackAction, FeedbackContext, Horizon, LearningProfile, NewFeedback, SubjectType, Suggestion,
};
use coaching_signal_engine::report::{self, ReportInput};
use coaching_signal_engine::store::{load_thresholds, save_thresholds, StatusStore};
use coaching_signal_engine::{learning, ranking, service, EngineSettings, ThresholdConfig};

#[derive(Parser)]
#[command(name = "signal-engine")]
#[command(
    about = "KPI alerts and feedback-driven suggestion ranking for coaches",
    long_about = None
)]
struct Cli {
    /// Account whose thresholds and feedback are used
    #[arg(long, global = true, default_value = "coach")]
    user: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import metric snapshots from a CSV file
    ImportMetrics {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import feedback events from a CSV file
    ImportFeedback {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show or replace the band thresholds
    Thresholds {
        #[command(subcommand)]
        action: ThresholdCommand,
    },
    /// List KPI alerts for a period
    Alerts {
        #[arg(long)]
        period: String,
        #[arg(long)]
        persona: Option<String>,
    },
    /// Record one feedback event
    Feedback {
        #[arg(long)]
        subject_id: String,
        #[arg(long, default_value = "suggestion", value_parser = parse_subject_type)]
        subject_type: SubjectType,
        #[arg(long, value_parser = parse_action)]
        action: FeedbackAction,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Print the learning profile
    Profile,
    /// Rank suggestions read from a JSON file
    Rank {
        #[arg(long)]
        suggestions: PathBuf,
        #[arg(long = "strength")]
        strengths: Vec<String>,
        #[arg(long = "objective")]
        objectives: Vec<String>,
    },
    /// Relate adherence to wearable readings for one client
    Correlate {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        adherence: f64,
        #[arg(long, default_value_t = 14)]
        since_days: i64,
    },
    /// Project the period's metrics forward
    Forecast {
        #[arg(long)]
        period: String,
        #[arg(long)]
        persona: Option<String>,
        #[arg(long, default_value = "30d", value_parser = parse_horizon)]
        horizon: Horizon,
    },
    /// Move a weekly strategy through its lifecycle
    Strategy {
        #[command(subcommand)]
        action: StrategyCommand,
    },
    /// Act on an activation item
    Activation {
        #[command(subcommand)]
        action: ActivationCommand,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        period: String,
        #[arg(long)]
        persona: Option<String>,
        #[arg(long, default_value = "30d", value_parser = parse_horizon)]
        horizon: Horizon,
        /// Include recovery signals for this client
        #[arg(long, requires = "adherence")]
        subject: Option<String>,
        #[arg(long)]
        adherence: Option<f64>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ThresholdCommand {
    Show,
    Set {
        #[arg(long, default_value = "custom")]
        name: String,
        #[arg(long)]
        excellent: f64,
        #[arg(long)]
        good: f64,
        #[arg(long)]
        fair: f64,
        #[arg(long)]
        poor: f64,
        #[arg(long, default_value_t = -5.0, allow_hyphen_values = true)]
        risk_trend_threshold: f64,
    },
}

#[derive(Subcommand)]
enum StrategyCommand {
    Show { id: Uuid },
    Advance { id: Uuid },
}

#[derive(Subcommand)]
enum ActivationCommand {
    Schedule { id: Uuid },
    Dismiss { id: Uuid },
    Complete { id: Uuid },
    Reopen { id: Uuid },
}

fn parse_horizon(raw: &str) -> Result<Horizon, String> {
    Horizon::parse(raw).ok_or_else(|| format!("expected 7d, 30d or 90d, got {raw}"))
}

fn parse_action(raw: &str) -> Result<FeedbackAction, String> {
    FeedbackAction::parse(raw).ok_or_else(|| format!("expected accept, reject or apply, got {raw}"))
}

fn parse_subject_type(raw: &str) -> Result<SubjectType, String> {
    SubjectType::parse(raw).ok_or_else(|| format!("unknown subject type {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogFormat::from_env())?;
    let cli = Cli::parse();
    let settings = EngineSettings::from_env();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool);
    let user = cli.user.as_str();

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&store, user).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportMetrics { csv } => {
            let inserted = db::import_metrics_csv(&store, &csv).await?;
            println!("Inserted {inserted} metric snapshots from {}.", csv.display());
        }
        Commands::ImportFeedback { csv } => {
            let appended = db::import_feedback_csv(&store, user, &csv).await?;
            println!("Appended {appended} feedback events from {}.", csv.display());
        }
        Commands::Thresholds { action } => match action {
            ThresholdCommand::Show => {
                let config = load_thresholds(&store, user).await?;
                print_thresholds(&config);
            }
            ThresholdCommand::Set {
                name,
                excellent,
                good,
                fair,
                poor,
                risk_trend_threshold,
            } => {
                let config = ThresholdConfig {
                    name,
                    excellent,
                    good,
                    fair,
                    poor,
                    risk_trend_threshold,
                };
                save_thresholds(&store, user, &config)
                    .await
                    .context("thresholds were not saved")?;
                print_thresholds(&config);
            }
        },
        Commands::Alerts { period, persona } => {
            let alerts = service::current_alerts(&store, user, &period, persona.as_deref()).await?;
            if alerts.is_empty() {
                println!("No KPIs need attention for {period}.");
                return Ok(());
            }
            for alert in alerts.iter() {
                let range = alert
                    .expected_range
                    .map(|range| format!(" expected {range}"))
                    .unwrap_or_default();
                println!("- [{}] {}{}", alert.severity, alert.message, range);
            }
        }
        Commands::Feedback {
            subject_id,
            subject_type,
            action,
            reason,
            title,
            description,
        } => {
            let ledger = service::load_ledger(&store, user).await?;
            let feedback = NewFeedback {
                subject_id,
                subject_type,
                action,
                reason,
                context: FeedbackContext {
                    title,
                    description,
                    impact: None,
                },
                timestamp: Utc::now(),
            };
            let profile =
                service::submit_feedback(&store, &ledger, user, feedback, &settings).await?;
            print_profile(&profile);
        }
        Commands::Profile => {
            let profile = current_profile(&store, user, &settings).await?;
            print_profile(&profile);
        }
        Commands::Rank {
            suggestions,
            strengths,
            objectives,
        } => {
            let raw = std::fs::read_to_string(&suggestions)
                .with_context(|| format!("failed to read {}", suggestions.display()))?;
            let suggestions: Vec<Suggestion> =
                serde_json::from_str(&raw).context("suggestions must be a JSON array")?;
            let profile = current_profile(&store, user, &settings).await?;
            let ranked = ranking::rank_suggestions(
                &suggestions,
                &profile,
                &strengths,
                &objectives,
                &settings.ranking,
            );
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        Commands::Correlate {
            subject,
            adherence,
            since_days,
        } => {
            let since = Utc::now().date_naive() - Duration::days(since_days);
            let result =
                service::correlate_subject(&store, &subject, adherence, since, &settings)
                    .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Forecast {
            period,
            persona,
            horizon,
        } => {
            let result =
                service::forecast_metrics(&store, &period, persona.as_deref(), horizon, &settings)
                    .await?;
            if result.entities.is_empty() {
                println!("No metrics found for {period}.");
                return Ok(());
            }
            for entity in result.entities.iter() {
                println!(
                    "- {}: {:.0} -> {:.0} ({:+.1}%, {} confidence)",
                    entity.label,
                    entity.current_total,
                    entity.forecasted_total,
                    entity.growth_percentage,
                    entity.confidence_tier.as_str()
                );
            }
            println!(
                "Total {:.0} -> {:.0} over {}, capacity: {}",
                result.current_total,
                result.forecasted_total,
                horizon.as_str(),
                result.capacity_recommendation.as_str()
            );
        }
        Commands::Strategy { action } => {
            let strategy = match action {
                StrategyCommand::Show { id } => store
                    .strategy(id)
                    .await?
                    .ok_or_else(|| anyhow!("weekly strategy {id} not found"))?,
                StrategyCommand::Advance { id } => service::advance_strategy(&store, id).await?,
            };
            println!(
                "{} ({}, week of {}): {}",
                strategy.title,
                strategy.id,
                strategy.week_start,
                strategy.status.as_str()
            );
        }
        Commands::Activation { action } => {
            let item = match action {
                ActivationCommand::Schedule { id } => {
                    service::move_activation(&store, id, ActivationStatus::Scheduled).await?
                }
                ActivationCommand::Dismiss { id } => {
                    service::move_activation(&store, id, ActivationStatus::Dismissed).await?
                }
                ActivationCommand::Complete { id } => {
                    service::move_activation(&store, id, ActivationStatus::Completed).await?
                }
                ActivationCommand::Reopen { id } => service::reopen_activation(&store, id).await?,
            };
            println!("{} ({}): {}", item.title, item.id, item.status.as_str());
        }
        Commands::Report {
            period,
            persona,
            horizon,
            subject,
            adherence,
            out,
        } => {
            let alerts = service::current_alerts(&store, user, &period, persona.as_deref()).await?;
            let profile = current_profile(&store, user, &settings).await?;
            let forecast =
                service::forecast_metrics(&store, &period, persona.as_deref(), horizon, &settings)
                    .await?;
            let recovery = match (subject, adherence) {
                (Some(subject), Some(adherence)) => {
                    let since = Utc::now().date_naive() - Duration::days(14);
                    let result =
                        service::correlate_subject(&store, &subject, adherence, since, &settings)
                            .await?;
                    Some(result)
                }
                _ => None,
            };
            let report = report::build_report(&ReportInput {
                user_id: user,
                period: &period,
                persona: persona.as_deref(),
                alerts: &alerts,
                profile: &profile,
                forecast: &forecast,
                recovery: recovery.as_ref(),
            });
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn current_profile(
    store: &PgStore,
    user: &str,
    settings: &EngineSettings,
) -> anyhow::Result<LearningProfile> {
    let ledger = service::load_ledger(store, user).await?;
    Ok(learning::build_learning_profile(&ledger.snapshot(), &settings.learning))
}

fn print_thresholds(config: &ThresholdConfig) {
    println!(
        "{}: excellent >= {}, good >= {}, fair >= {}, poor >= {}, risk trend <= {}%",
        config.name,
        config.excellent,
        config.good,
        config.fair,
        config.poor,
        config.risk_trend_threshold
    );
}

fn print_profile(profile: &LearningProfile) {
    println!(
        "{} feedback events, {:.1}% accepted, {:.1}% rejected",
        profile.total_feedback, profile.acceptance_rate, profile.rejection_rate
    );
    for entry in profile.top_accepted_types.iter() {
        println!("  + {} x{} ({:.1}%)", entry.derived_type, entry.count, entry.percentage);
    }
    for entry in profile.top_rejected_types.iter() {
        println!("  - {} x{} ({:.1}%)", entry.derived_type, entry.count, entry.percentage);
    }
    for reason in profile.common_rejection_reasons.iter() {
        println!("  reason: {} x{}", reason.reason, reason.count);
    }
    for hint in profile.improvement_suggestions.iter() {
        println!("  > {hint}");
    }
}

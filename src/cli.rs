use search_intelligence::analytics::{ExportFormat, ExportOptions, SearchAnalytics};
use search_intelligence::config::SuggestionConfig;
use search_intelligence::core::sources::{InMemorySavedSearches, StaticSemanticExpander, StaticTrending};
use search_intelligence::core::{SuggestionEngine, SuggestionOptions};
use search_intelligence::database::KvStore;
use search_intelligence::error::{AppError, Result};
use search_intelligence::models::SearchEventInput;
use search_intelligence::privacy::{PrivacySettings, PrivacyStore};
use std::env;
use std::sync::Arc;

pub enum CliCommand {
    Track {
        query: String,
        failed: bool,
        response_ms: Option<u64>,
        results: Option<usize>,
    },
    Summary { days: i64 },
    Metrics,
    Export { format: ExportFormat, redact: bool },
    Suggest { query: String, max: Option<usize> },
    PrivacyShow,
    PrivacySet { field: String, enabled: bool },
    Clear,
}

/// Services a command runs against
pub struct CliContext {
    pub analytics: Arc<SearchAnalytics>,
    pub engine: SuggestionEngine,
}

/// Engine backed by the built-in trending list and semantic table
pub fn build_engine(
    analytics: Arc<SearchAnalytics>,
    store: Arc<dyn KvStore>,
    config: SuggestionConfig,
) -> SuggestionEngine {
    SuggestionEngine::new(
        analytics,
        PrivacyStore::new(store),
        Arc::new(InMemorySavedSearches::default()),
        config,
    )
    .with_trending(Arc::new(StaticTrending::popular_research()))
    .with_semantic(Arc::new(StaticSemanticExpander::default()))
}

pub fn parse_args() -> Option<CliCommand> {
    let args: Vec<String> = env::args().collect();
    parse_from(&args)
}

pub fn parse_from(args: &[String]) -> Option<CliCommand> {
    if args.len() < 2 {
        return None;
    }

    match args[1].as_str() {
        "track" => {
            let Some(query) = args.get(2) else {
                eprintln!("Usage: track <query> [--failed] [--ms N] [--results N]");
                return None;
            };
            let mut failed = false;
            let mut response_ms = None;
            let mut results = None;

            let mut rest = args[3..].iter();
            while let Some(flag) = rest.next() {
                match flag.as_str() {
                    "--failed" => failed = true,
                    "--ms" => response_ms = rest.next().and_then(|v| v.parse().ok()),
                    "--results" => results = rest.next().and_then(|v| v.parse().ok()),
                    other => {
                        eprintln!("Unknown flag for track: {}", other);
                        return None;
                    }
                }
            }

            Some(CliCommand::Track {
                query: query.clone(),
                failed,
                response_ms,
                results,
            })
        }
        "summary" => {
            let days = args.get(2).and_then(|d| d.parse().ok()).unwrap_or(30);
            Some(CliCommand::Summary { days })
        }
        "metrics" => Some(CliCommand::Metrics),
        "export" => {
            let Some(format) = args.get(2).and_then(|f| ExportFormat::parse(f)) else {
                eprintln!("Usage: export <json|csv> [--redact]");
                return None;
            };
            let redact = args.iter().skip(3).any(|a| a == "--redact");
            Some(CliCommand::Export { format, redact })
        }
        "suggest" => {
            let Some(query) = args.get(2) else {
                eprintln!("Usage: suggest <query> [--max N]");
                return None;
            };
            let max = match (args.get(3).map(String::as_str), args.get(4)) {
                (Some("--max"), Some(n)) => n.parse().ok(),
                _ => None,
            };
            Some(CliCommand::Suggest { query: query.clone(), max })
        }
        "privacy" => match args.get(2).map(String::as_str) {
            None | Some("show") => Some(CliCommand::PrivacyShow),
            Some("set") => {
                let enabled = match args.get(4).map(String::as_str) {
                    Some("on") | Some("true") => true,
                    Some("off") | Some("false") => false,
                    _ => {
                        eprintln!("Usage: privacy set <field> <on|off>");
                        return None;
                    }
                };
                let field = args.get(3)?.clone();
                Some(CliCommand::PrivacySet { field, enabled })
            }
            Some(other) => {
                eprintln!("Unknown privacy action: {}", other);
                None
            }
        },
        "clear" => Some(CliCommand::Clear),
        _ => None,
    }
}

pub async fn execute_cli_command(command: CliCommand, ctx: &CliContext) -> Result<()> {
    match command {
        CliCommand::Track {
            query,
            failed,
            response_ms,
            results,
        } => {
            let mut input = SearchEventInput::search(query.clone());
            if let Some(ms) = response_ms {
                input = input.with_response_time(ms);
            }
            if let Some(count) = results {
                input = input.with_results(count);
            }
            if failed {
                input = input.failed("search_failed");
            }
            ctx.analytics.track_search(input);
            println!("Tracked search: {}", query);
            Ok(())
        }
        CliCommand::Summary { days } => {
            let summary = ctx.analytics.get_summary(days);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        CliCommand::Metrics => {
            let metrics = ctx.analytics.get_performance_metrics();
            println!("{}", serde_json::to_string_pretty(&metrics)?);
            Ok(())
        }
        CliCommand::Export { format, redact } => {
            let mut options = ExportOptions::new(format);
            if redact {
                options = options.without_queries();
            }
            print!("{}", ctx.analytics.export_data(&options));
            Ok(())
        }
        CliCommand::Suggest { query, max } => {
            let mut options: SuggestionOptions = ctx.engine.default_options();
            if let Some(max) = max {
                options.max_results = max;
            }

            let suggestions = ctx.engine.get_suggestions(&query, &options).await;
            if suggestions.is_empty() {
                println!("No suggestions for '{}'", query);
            }
            for suggestion in suggestions {
                println!(
                    "{:>6.2}  {:<13} {:<10} {}",
                    suggestion.score,
                    suggestion.source.as_str(),
                    format!("{:?}", suggestion.metadata.match_type).to_lowercase(),
                    suggestion.query
                );
            }
            Ok(())
        }
        CliCommand::PrivacyShow => {
            let settings = ctx.engine.get_privacy_settings();
            print_privacy(&settings);
            Ok(())
        }
        CliCommand::PrivacySet { field, enabled } => {
            let mut settings = ctx.engine.get_privacy_settings();
            if !settings.set_field(&field, enabled) {
                return Err(AppError::Configuration(format!(
                    "Unknown privacy setting '{}', expected one of: {}",
                    field,
                    PrivacySettings::FIELDS.join(", ")
                )));
            }
            ctx.engine.set_privacy_settings(&settings).await?;
            print_privacy(&settings);
            Ok(())
        }
        CliCommand::Clear => {
            ctx.analytics.clear_data()?;
            ctx.engine.reset().await;
            println!("Search analytics cleared");
            Ok(())
        }
    }
}

fn print_privacy(settings: &PrivacySettings) {
    let flag = |on: bool| if on { "on" } else { "off" };
    println!("personalization_enabled    {}", flag(settings.personalization_enabled));
    println!("history_based_suggestions  {}", flag(settings.history_based_suggestions));
    println!("trending_queries_enabled   {}", flag(settings.trending_queries_enabled));
    println!("ai_suggestions_enabled     {}", flag(settings.ai_suggestions_enabled));
}

pub fn print_usage() {
    println!("Search Intelligence CLI");
    println!("Usage:");
    println!();
    println!("Analytics Commands:");
    println!("  track <query> [--failed] [--ms N] [--results N] - Record a search");
    println!("  summary [days]          - Aggregate statistics (default 30 days)");
    println!("  metrics                 - Response time percentiles and errors");
    println!("  export <json|csv> [--redact] - Export recorded events");
    println!("  clear                   - Delete all recorded events");
    println!();
    println!("Suggestion Commands:");
    println!("  suggest <query> [--max N] - Ranked suggestions for a partial query");
    println!();
    println!("Privacy Commands:");
    println!("  privacy [show]          - Show privacy settings");
    println!("  privacy set <field> <on|off> - Change a privacy setting");
}

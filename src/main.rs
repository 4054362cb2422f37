use anyhow::Context;
use clap::Parser;
use homedir::my_home;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use nothing::config::Config;
use nothing::filters::{EpisodeFilter, RatingRange};
use nothing::service::EpisodeService;

mod cli;

#[derive(Serialize)]
struct QueryOutput<'a> {
    filtered: usize,
    results: &'a [nothing::dataset::Episode],
}

#[derive(Serialize)]
struct LineCount<'a> {
    character: &'a str,
    lines: usize,
}

#[derive(Debug, PartialEq, Serialize)]
struct NamedWeight {
    family: &'static str,
    weight: f32,
}

fn base_path() -> anyhow::Result<String> {
    if let Ok(path) = std::env::var("NOTHING_BASE_PATH") {
        return Ok(path);
    }

    let home = my_home()
        .context("Could not determine home directory")?
        .context("Home directory path is empty")?;
    Ok(format!("{}/.local/share/nothing", home.to_string_lossy()))
}

/// Configured default weights, without touching the data tables.
fn named_weights(config: &Config) -> anyhow::Result<Vec<NamedWeight>> {
    let weights = config.recommender.weights.to_weight_vector()?;
    Ok(weights
        .named()
        .map(|(family, weight)| NamedWeight {
            family: family.name(),
            weight,
        })
        .collect())
}

fn open_service(config: Config) -> anyhow::Result<EpisodeService> {
    EpisodeService::open(config).context("Failed to load episode data")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let base_path = base_path()?;
    let config = Config::load_with(&base_path)
        .with_context(|| format!("Failed to load config from {base_path}"))?;

    match args.command {
        cli::Command::Recommend {
            titles,
            count,
            weights,
        } => {
            let service = open_service(config)?;
            if let Some(weights) = weights {
                service.set_weights(weights)?;
            }
            let episodes = service.recommend(&titles, count)?;
            print_json(&episodes)
        }

        cli::Command::Query {
            text,
            season,
            min_rating,
            max_rating,
            character,
        } => {
            let service = open_service(config)?;
            let rating = match (min_rating, max_rating) {
                (Some(low), Some(high)) => Some(RatingRange::new(low, high)?),
                _ => None,
            };
            let filter = EpisodeFilter {
                seasons: (!season.is_empty()).then_some(season),
                rating,
                characters: (!character.is_empty()).then_some(character),
            };

            let response = service.query(&text, &filter)?;
            print_json(&QueryOutput {
                filtered: response.filtered.len(),
                results: &response.results,
            })
        }

        cli::Command::Precompute { quiet } => {
            let service = open_service(config)?;
            let summary = service.precompute(!quiet)?;
            println!(
                "{} lines embedded into {} shards",
                summary.lines, summary.shards
            );
            Ok(())
        }

        cli::Command::Characters { limit } => {
            let counts = open_service(config)?.line_counts(limit);
            let counts: Vec<LineCount> = counts
                .iter()
                .map(|(character, lines)| LineCount {
                    character,
                    lines: *lines,
                })
                .collect();
            print_json(&counts)
        }

        cli::Command::Script { title } => {
            let lines = open_service(config)?.script_for_title(&title);
            if lines.is_empty() {
                log::warn!("no dialogue found for '{title}'");
            }
            for line in &lines {
                let emotion = line
                    .emotions
                    .dominant()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "No Emotion".to_string());
                println!("{}: {} [{emotion}]", line.speaker, line.text);
            }
            Ok(())
        }

        cli::Command::Weights {} => print_json(&named_weights(&config)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_weights_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path()).unwrap();

        let named = named_weights(&config).unwrap();
        assert_eq!(named.len(), 7);
        assert_eq!(
            named[0],
            NamedWeight {
                family: "dialogue",
                weight: 1.0
            }
        );
        assert_eq!(named[6].family, "character_count");
        assert!(!dir.path().join("episode_info.csv").exists());
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use dupetag::clients::{HttpSimilarityClient, HttpTagService, SimilarityClient, TagServiceClient};
use dupetag::config::AppConfig;
use dupetag::services::{
    DuplicateReconciler, DuplicateReviewSession, GroupLocks, GroupMerger, GroupTagger,
    MergeOutcome, ReconcileOutcome, TagOutcome,
};
use dupetag::{GroupIdentity, VideoId};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "dupetag",
    version,
    about = "Manage duplicate-video groups stored as tags"
)]
struct Cli {
    /// Config file (default: `<config dir>/dupetag/config.toml`)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tag service base URL, overriding the config file
    #[arg(long, global = true, value_name = "URL")]
    service: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Duplicate group workflows
    Groups {
        #[command(subcommand)]
        command: GroupCmd,
    },

    /// Find matches for a video and group or merge them
    Probe {
        /// Video to search duplicates for
        #[arg(short, long, value_name = "ID")]
        video: VideoId,
        /// Similarity threshold (default: from config)
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Merge without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum GroupCmd {
    /// List all current duplicate groups, largest first
    List,

    /// Print the canonical label for a set of video IDs
    Label {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<VideoId>,
    },

    /// Tag a set of videos as one duplicate group
    Tag {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<VideoId>,
    },

    /// Merge candidates with existing groups
    Merge {
        /// Candidate video IDs, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<VideoId>,
        /// Existing group label the candidates overlap (repeatable)
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = cli.service.clone() {
        config.tag_service_url = url;
        config.validate().context("Invalid --service value")?;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let tags: Arc<dyn TagServiceClient> = Arc::new(
        HttpTagService::from_config(&config).context("Failed to create tag service client")?,
    );

    match cli.command {
        Commands::Groups { command } => match command {
            GroupCmd::List => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
                spinner.set_message("Loading duplicate groups…");
                spinner.enable_steady_tick(Duration::from_millis(100));

                let snapshot = DuplicateReviewSession::new(tags)
                    .snapshot()
                    .await
                    .context("Failed to load duplicate groups")?;
                spinner.finish_and_clear();

                if cli.json {
                    return print_json(&snapshot);
                }
                if snapshot.groups.is_empty() {
                    println!("No duplicate groups found.");
                    return Ok(());
                }

                println!(
                    "Found {} duplicate group(s), {} video(s):",
                    snapshot.groups.len(),
                    snapshot.total_members()
                );
                for group in &snapshot.groups {
                    println!("\n✨ {} ({} videos)", group.label, group.len());
                    for member in &group.members {
                        let title = member.video.title.as_deref().unwrap_or("untitled");
                        println!(
                            "   ▶ #{} {} ~{}%",
                            member.video.id, title, member.similarity_percent
                        );
                    }
                }
                for label in &snapshot.skipped {
                    eprintln!("⚠️  Could not load members of {}", label);
                }
            }

            GroupCmd::Label { ids } => {
                let ids: BTreeSet<VideoId> = ids.into_iter().collect();
                println!("{}", GroupIdentity::label(&ids));
            }

            GroupCmd::Tag { ids } => {
                let ids: BTreeSet<VideoId> = ids.into_iter().collect();
                let tagger = GroupTagger::new(tags, Arc::new(GroupLocks::new()));
                let outcome = tagger.tag(&ids).await.context("Tagging failed")?;
                if cli.json {
                    return print_json(&outcome);
                }
                print_tagging(&outcome);
            }

            GroupCmd::Merge { ids, labels } => {
                let ids: BTreeSet<VideoId> = ids.into_iter().collect();
                let labels: BTreeSet<String> = labels.into_iter().collect();
                let merger = GroupMerger::new(tags, Arc::new(GroupLocks::new()));
                let outcome = merger.merge(&ids, &labels).await.context("Merge failed")?;
                if cli.json {
                    return print_json(&outcome);
                }
                print_merge(&outcome);
            }
        },

        Commands::Probe {
            video,
            threshold,
            yes,
        } => {
            let similarity: Arc<dyn SimilarityClient> = Arc::new(
                HttpSimilarityClient::from_config(&config)
                    .context("Failed to create similarity client")?,
            );
            let reconciler = DuplicateReconciler::new(tags, similarity, config.similarity_threshold);

            println!("▶ Searching duplicates of video {}", video);
            let Some(plan) = reconciler
                .plan(video, threshold)
                .await
                .context("Similarity search failed")?
            else {
                println!("No duplicates found.");
                return Ok(());
            };

            if plan.needs_merge() && !yes {
                let prompt = format!(
                    "{} candidate(s) overlap {} existing group(s). Merge them?",
                    plan.candidates.len(),
                    plan.touched_labels.len()
                );
                let confirmed = Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
                if !confirmed {
                    println!("Skipped; no tags were changed.");
                    return Ok(());
                }
            }

            let outcome = reconciler
                .execute(plan)
                .await
                .context("Reconciliation failed")?;
            if cli.json {
                return print_json(&outcome);
            }
            match outcome {
                ReconcileOutcome::NoMatches { .. } => println!("No duplicates found."),
                ReconcileOutcome::Tagged { outcome, scores } => {
                    for (id, score) in &scores {
                        println!("   ▶ #{} similarity {:.2}", id, score);
                    }
                    print_tagging(&outcome);
                }
                ReconcileOutcome::Merged { outcome, scores } => {
                    for (id, score) in &scores {
                        println!("   ▶ #{} similarity {:.2}", id, score);
                    }
                    print_merge(&outcome);
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tagging(outcome: &TagOutcome) {
    if outcome.already_grouped {
        println!("✅ {} is already in place; nothing to do.", outcome.label);
        return;
    }
    println!(
        "✅ Tagged {} video(s) with {}",
        outcome.tagged, outcome.label
    );
    if let Some(hint) = partial_tagging_hint(outcome) {
        println!("⚠️  {}", hint);
    }
}

/// Re-running `groups tag` finds the label in place and stops, so the hint
/// points at `groups merge`, which does retag missing members.
fn partial_tagging_hint(outcome: &TagOutcome) -> Option<String> {
    if !outcome.is_partial() {
        return None;
    }
    Some(format!(
        "{} video(s) could not be tagged. Tagging again will not retry them; \
         run `dupetag groups merge --ids <all members> --label {}` to add the label to the rest.",
        outcome.failed, outcome.label
    ))
}

fn print_merge(outcome: &MergeOutcome) {
    println!(
        "✅ Merged {} video(s) into {}",
        outcome.final_members.len(),
        outcome.label
    );
    for label in &outcome.removed_labels {
        let state = if outcome.deleted_labels.contains(label) {
            "deleted"
        } else {
            "still in use"
        };
        println!("   🗑️  {} ({})", label, state);
    }
    if outcome.is_partial() {
        println!(
            "⚠️  {} video(s) were not fully retagged; run the merge again to converge.",
            outcome.failed
        );
    }
}

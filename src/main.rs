//! statusdex - status search and timeline filtering CLI
//!
//! Main entry point for the statusdex command-line tool.

use std::collections::HashMap;
use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use statusdex::document::plaintext;
use statusdex::indexer::{self, IndexOptions};
use statusdex::logging::{LogConfig, init_logging};
use statusdex::perf;
use statusdex::timed;
use statusdex::{
    AccountId, AnalysisSettings, CONTENT_DIVIDER_WIDTH, Cli, Commands, Config, Export,
    OutputFormat, Post, PostId, PostView, ResultFilterEvaluator, SearchEngine, StatusdexError,
    Storage, VALID_CONFIG_KEYS, cli, format_number, format_relative_date,
    format_unknown_value_error, normalize, storage, truncate_chars,
};

/// Resolved settings shared by every command.
struct App {
    config: Config,
    format: OutputFormat,
    quiet: bool,
}

impl App {
    fn from_cli(cli: &Cli) -> Self {
        let mut config = Config::load();
        if let Some(db) = &cli.db {
            config.paths.db = Some(db.clone());
        }
        if let Some(index) = &cli.index {
            config.paths.index = Some(index.clone());
        }

        let format = cli
            .format
            .or_else(|| OutputFormat::from_config(&config.output.format))
            .unwrap_or_default();
        let quiet = cli.quiet || config.output.quiet;

        Self {
            config,
            format,
            quiet,
        }
    }

    fn analysis(&self) -> AnalysisSettings {
        AnalysisSettings::default().with_refresh_interval(self.config.index.refresh_interval)
    }

    const fn is_text(&self) -> bool {
        matches!(self.format, OutputFormat::Text)
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = if matches!(self.format, OutputFormat::JsonPretty) {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{json}");
        Ok(())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ctx = App::from_cli(&cli);

    init_logging(
        &LogConfig::from_flags(ctx.quiet, cli.verbose).with_colors(ctx.config.output.colors),
    );
    if !ctx.config.output.colors {
        colored::control::set_override(false);
    }

    let result = match &cli.command {
        Commands::Import(args) => cmd_import(&ctx, args),
        Commands::Index(args) => cmd_index(&ctx, args),
        Commands::Search(args) => cmd_search(&ctx, args),
        Commands::Timeline(args) => cmd_timeline(&ctx, args),
        Commands::Normalize(args) => cmd_normalize(&ctx, args),
        Commands::Stats => cmd_stats(&ctx),
        Commands::Config(args) => cmd_config(&ctx, args),
        Commands::Completions(args) => {
            cmd_completions(args);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

/// Exit status for errors the user can fix by changing input or setup.
const EXIT_USER_ERROR: u8 = 2;

fn report_error(err: &anyhow::Error) -> ExitCode {
    eprintln!("{} {err:#}", "Error:".red().bold());
    let Some(known) = err.downcast_ref::<StatusdexError>() else {
        return ExitCode::FAILURE;
    };
    if let Some(hint) = known.suggestion() {
        eprintln!("{} {hint}", "Hint:".yellow());
    }
    if known.is_retryable() {
        eprintln!("{} This may be temporary; try again.", "Hint:".yellow());
    }
    if known.is_recoverable() {
        ExitCode::from(EXIT_USER_ERROR)
    } else {
        ExitCode::FAILURE
    }
}

fn cmd_import(ctx: &App, args: &cli::ImportArgs) -> Result<()> {
    let db_path = ctx.config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let export = Export::read(&args.file)?;
    let mut storage = Storage::open(&db_path)?;
    let stats = timed!(perf::IMPORT, export.store(&mut storage))?;

    if !ctx.is_text() {
        return ctx.print_json(&stats);
    }
    if !ctx.quiet {
        println!("{}", "Import complete".bold().green());
        println!("  {:<20} {:>10}", "Posts:", stats.posts);
        println!("  {:<20} {:>10}", "Media attachments:", stats.media_attachments);
        println!("  {:<20} {:>10}", "Mentions:", stats.mentions);
        println!("  {:<20} {:>10}", "Favourites:", stats.favourites);
        println!("  {:<20} {:>10}", "Filters:", stats.filters);
        println!();
        println!("Run {} to build the search index.", "statusdex index".bold());
    }
    Ok(())
}

fn cmd_index(ctx: &App, args: &cli::IndexArgs) -> Result<()> {
    let db_path = ctx.config.db_path();
    let index_path = ctx.config.index_path();
    let storage = Storage::open_existing(&db_path)?;

    let engine = if args.force {
        SearchEngine::recreate(&index_path, ctx.analysis())?
    } else {
        SearchEngine::open(&index_path, ctx.analysis())?
    };

    let expected = usize::try_from(storage.indexable_post_count()?).unwrap_or(0);
    let options = IndexOptions {
        batch_size: args.batch_size.unwrap_or(ctx.config.index.batch_size),
        jobs: args.jobs.unwrap_or(ctx.config.index.jobs),
        writer_heap_bytes: ctx.config.index.writer_heap_mb.max(15) * 1024 * 1024,
        expected_posts: expected,
    };
    debug!(?options, "index options");

    let show_progress = ctx.is_text() && !ctx.quiet;
    let pb = if show_progress {
        let pb = ProgressBar::new(expected as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("##-"),
        );
        pb.set_message("indexing posts");
        pb
    } else {
        ProgressBar::hidden()
    };

    let report = indexer::run(storage, &engine, &options, |done| pb.set_position(done as u64));
    pb.finish_and_clear();
    let report = report?;

    if !ctx.is_text() {
        return ctx.print_json(&report);
    }
    if !ctx.quiet {
        println!("{}", "Indexing complete!".bold().green());
        println!("  Index:     {}", index_path.display());
        println!("  Batches:   {}", report.batches);
        println!("  Documents: {}", format_number(i64::try_from(report.documents).unwrap_or(i64::MAX)).cyan());
        println!("  Reblogs skipped: {}", report.reblogs_skipped);
        println!("  Took {:.2}s", report.duration.as_secs_f64());
    }
    Ok(())
}

fn cmd_search(ctx: &App, args: &cli::SearchArgs) -> Result<()> {
    let engine = SearchEngine::open_existing(ctx.config.index_path(), ctx.analysis())?;
    let limit = args.limit.unwrap_or(ctx.config.search.default_limit);

    let hits = timed!(
        perf::SEARCH_QUERY,
        engine.search(&args.query, args.viewer, limit, args.offset)
    )?;

    if !ctx.is_text() {
        return ctx.print_json(&hits);
    }
    if hits.is_empty() {
        println!("{}", "No results found.".yellow());
        return Ok(());
    }

    println!(
        "{} results for \"{}\":\n",
        hits.len().to_string().cyan(),
        args.query.bold()
    );
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} {} {}",
            (i + args.offset + 1).to_string().dimmed(),
            format!("#{}", hit.id).bold(),
            format!("by {}", hit.account_id).dimmed(),
            format!("({:.2})", hit.score).dimmed()
        );
        for line in hit.text.lines().filter(|l| !l.trim().is_empty()) {
            println!("   {}", truncate_chars(line, 100));
        }
        println!("   {}", format_relative_date(hit.created_at).dimmed());
        println!();
    }
    Ok(())
}

/// One rendered timeline row.
#[derive(Debug, Serialize)]
struct TimelineRow {
    id: PostId,
    account_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    reblog_of_id: Option<PostId>,
    hidden: bool,
    dropped: bool,
    text: String,
}

fn cmd_timeline(ctx: &App, args: &cli::TimelineArgs) -> Result<()> {
    let storage = Storage::open_existing(ctx.config.db_path())?;

    let posts = timed!(perf::STORAGE_LOAD, {
        if args.ids.is_empty() {
            storage.latest_posts(args.limit)
        } else {
            storage.posts_by_ids(&args.ids)
        }
    })?;

    let target_ids: Vec<PostId> = posts.iter().filter_map(|p| p.reblog_of_id).collect();
    let targets: HashMap<PostId, Post> = storage
        .posts_by_ids(&target_ids)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let target_of = |post: &Post| post.reblog_of_id.and_then(|id| targets.get(&id));

    let views: Vec<PostView> = posts
        .iter()
        .map(|post| PostView::from_post(post, target_of(post)))
        .collect();
    let rules = storage.filters_for_account(args.viewer)?;
    let evaluator = ResultFilterEvaluator::new(ctx.config.filters.cache_size);
    let now = Utc::now();

    let row = |post: &Post, hidden: bool, dropped: bool| {
        let shown = target_of(post).unwrap_or(post);
        TimelineRow {
            id: post.id,
            account_id: post.account_id,
            reblog_of_id: post.reblog_of_id,
            hidden,
            dropped,
            text: plaintext(shown).into_owned(),
        }
    };

    let timer = perf::Timer::start(perf::FILTER_TIMELINE);
    let rows: Vec<TimelineRow> = if args.show_dropped {
        posts
            .iter()
            .zip(&views)
            .map(|(post, view)| {
                let decision = evaluator.evaluate(view, args.viewer, &rules, &args.context, now)?;
                Ok(row(post, decision.hide, decision.drop))
            })
            .collect::<statusdex::Result<_>>()?
    } else {
        let by_id: HashMap<PostId, &Post> = posts.iter().map(|p| (p.id, p)).collect();
        evaluator
            .filter_timeline(&views, args.viewer, &rules, &args.context, now)?
            .into_iter()
            .filter_map(|entry| by_id.get(&entry.id).map(|&post| row(post, entry.hidden, false)))
            .collect()
    };
    timer.stop();

    if !ctx.is_text() {
        return ctx.print_json(&rows);
    }
    if rows.is_empty() {
        println!("{}", "Nothing to show.".yellow());
        return Ok(());
    }

    println!(
        "{} for {} in {}",
        "Timeline".bold().cyan(),
        args.viewer.to_string().bold(),
        args.context.bold()
    );
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    for r in &rows {
        let badge = if r.dropped {
            "DROPPED".on_red()
        } else if r.hidden {
            "HIDDEN".on_yellow()
        } else {
            "  OK  ".on_green()
        };
        let boost = r
            .reblog_of_id
            .map(|id| format!(" (boost of #{id})"))
            .unwrap_or_default();
        println!("{badge} #{}{boost} by {}", r.id, r.account_id);
        if r.hidden || r.dropped {
            println!("   {}", "[filtered]".dimmed());
        } else {
            for line in r.text.lines().filter(|l| !l.trim().is_empty()) {
                println!("   {}", truncate_chars(line, 100));
            }
        }
    }
    Ok(())
}

fn cmd_normalize(ctx: &App, args: &cli::NormalizeArgs) -> Result<()> {
    let normalized = normalize(&args.text);
    if ctx.is_text() {
        println!("{normalized}");
        return Ok(());
    }

    #[derive(Serialize)]
    struct Normalized<'a> {
        input: &'a str,
        normalized: &'a str,
    }
    ctx.print_json(&Normalized {
        input: &args.text,
        normalized: &normalized,
    })
}

fn cmd_stats(ctx: &App) -> Result<()> {
    let storage = Storage::open_existing(ctx.config.db_path())?;
    let counts = storage.counts()?;
    let documents = SearchEngine::open_existing(ctx.config.index_path(), ctx.analysis())
        .ok()
        .map(|engine| engine.doc_count());

    if !ctx.is_text() {
        #[derive(Serialize)]
        struct Stats {
            #[serde(flatten)]
            counts: storage::StorageCounts,
            indexed_documents: Option<u64>,
        }
        return ctx.print_json(&Stats {
            counts,
            indexed_documents: documents,
        });
    }

    println!("{}", "statusdex Statistics".bold().cyan());
    println!("{}", "─".repeat(40));
    println!("  {:<20} {:>12}", "Posts:", format_number(counts.posts));
    println!("  {:<20} {:>12}", "Reblogs:", format_number(counts.reblogs));
    println!("  {:<20} {:>12}", "Media:", format_number(counts.media_attachments));
    println!("  {:<20} {:>12}", "Mentions:", format_number(counts.mentions));
    println!("  {:<20} {:>12}", "Favourites:", format_number(counts.favourites));
    println!("  {:<20} {:>12}", "Filters:", format_number(counts.filters));
    println!("{}", "─".repeat(40));
    match documents {
        Some(n) => println!(
            "  {:<20} {:>12}",
            "Indexed documents:",
            format_number(i64::try_from(n).unwrap_or(i64::MAX))
        ),
        None => println!("  {}", "Index not built yet.".yellow()),
    }
    Ok(())
}

fn cmd_config(ctx: &App, args: &cli::ConfigArgs) -> Result<()> {
    if let Some(assignment) = &args.set {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| StatusdexError::InvalidArgument {
                reason: format!("expected key=value, got '{assignment}'"),
            })?;
        let key = key.trim();
        if !VALID_CONFIG_KEYS.contains(&key) {
            anyhow::bail!(format_unknown_value_error("config key", key, VALID_CONFIG_KEYS));
        }

        let mut config = Config::user_config_path()
            .and_then(|path| Config::load_from_file(&path))
            .unwrap_or_default();
        config.set_key(key, value.trim())?;
        config.save().context("Failed to save configuration")?;
        if !ctx.quiet {
            println!("{} {key} = {}", "Set".green(), value.trim());
        }
        return Ok(());
    }

    if !ctx.is_text() {
        return ctx.print_json(&ctx.config);
    }

    println!("{}", "Current Configuration".bold().cyan());
    println!("  Database: {}", ctx.config.db_path().display());
    println!("  Index:    {}", ctx.config.index_path().display());
    if let Some(path) = Config::user_config_path() {
        println!("  File:     {}", path.display());
    }
    if args.show {
        println!();
        print!("{}", toml::to_string_pretty(&ctx.config)?);
    }
    Ok(())
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "statusdex", &mut io::stdout());
}

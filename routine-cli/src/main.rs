use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use routine_core::time::{date_key, parse_date_key, parse_instant, to_local_rfc3339};
use routine_core::{
    apply_proposal, EventKind, PatchAssistant, PatchProposal, Product, ProductPatch, RulesPatch,
    SeedData, TaskDefinition, TaskPatch, UnconfiguredAssistant,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod state;

use config::Config;
use state::StateDir;

#[derive(Parser, Debug)]
#[command(
    name = "routine",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ROUTINE_BUILD_SHA"), ")"),
    about = "Daily routine cards: skincare rotation, shower, scalp and supplements"
)]
struct Cli {
    /// Log scheduling and rotation decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the state directory from the seed document
    Init {
        /// Overwrite existing state
        #[arg(long)]
        force: bool,
    },

    /// Print the current time in the routine timezone
    Time,

    /// Show the cards for today (or --date YYYY-MM-DD)
    Today {
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Mark a task instance (e.g. `skin_am|2026-01-04`) completed
    Complete {
        instance: String,

        /// Completion time (RFC3339, or local YYYY-MM-DDTHH:MM); default now
        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Mark a task instance skipped
    Skip {
        instance: String,

        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Check task definitions and rules against the product catalog
    Validate,

    /// Rules and condition flags
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Product catalog
    Products {
        #[command(subcommand)]
        command: ProductsCommand,
    },

    /// Task definitions
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },

    /// Assisted editing via JSON Patch proposals
    Assist {
        #[command(subcommand)]
        command: AssistCommand,
    },

    /// ~/.routine/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Print rules and conditions as JSON
    Show,

    /// Set one condition flag, e.g. `sensitive true`
    SetCondition {
        key: String,
        #[arg(action = ArgAction::Set)]
        value: bool,
    },

    /// Apply a `{"rules": {...}, "conditions": {...}}` patch file
    Patch {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ProductsCommand {
    List {
        /// Include deactivated products
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Apply a partial update from a JSON file
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Soft-delete a product
    Deactivate { id: String },
}

#[derive(Subcommand, Debug)]
enum TasksCommand {
    List {
        #[arg(long)]
        json: bool,
    },

    /// Add a task definition from a JSON file
    Add {
        #[arg(long)]
        file: PathBuf,
    },

    /// Apply a partial update from a JSON file
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Remove a task definition and its status
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum AssistCommand {
    /// Ask the configured assistant for a proposal
    Propose { instruction: String },

    /// Apply a proposal file (raw JSON or model output containing it)
    Apply {
        #[arg(long)]
        file: PathBuf,

        /// Show what would change without saving
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Show,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "routine=debug" } else { "routine=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let home = state::routine_home()?;
    let cfg = config::load_config(&home)?;
    let state = StateDir::new(cfg.data_dir(&home));

    match cli.command {
        Command::Init { force } => init_state(&state, &cfg, force)?,

        Command::Time => {
            let now = Utc::now();
            println!("{}", to_local_rfc3339(now));
            println!("date key: {}", date_key(now));
        }

        Command::Today { date, json } => today(&state, &cfg, date.as_deref(), json)?,

        Command::Complete { instance, at, json } => {
            record(&state, &cfg, EventKind::Completed, &instance, at.as_deref(), json)?
        }

        Command::Skip { instance, at, json } => {
            record(&state, &cfg, EventKind::Skipped, &instance, at.as_deref(), json)?
        }

        Command::Validate => {
            let engine = state.load_engine()?;
            let issues = engine.catalog().validate(&engine.rules().rules);
            if !issues.is_empty() {
                eprint!("{}", render::render_issues(&issues));
                bail!("{} configuration problem(s)", issues.len());
            }
            println!(
                "OK: {} task definitions, {} active products",
                engine.catalog().tasks.len(),
                engine.catalog().active_products().count()
            );
        }

        Command::Rules { command } => rules_cmd(&state, command)?,
        Command::Products { command } => products_cmd(&state, &cfg, command)?,
        Command::Tasks { command } => tasks_cmd(&state, &cfg, command)?,
        Command::Assist { command } => assist_cmd(&state, command)?,

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config(&home)?,
            ConfigCommand::Show => {
                println!("# {}", config::config_path(&home).display());
                println!("# state: {}\n", state.root().display());
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },
    }

    Ok(())
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_state(state: &StateDir, cfg: &Config, force: bool) -> Result<()> {
    let _lock = state.lock()?;
    if state.is_initialized() && !force {
        bail!(
            "State already exists at {}. Re-run with --force to overwrite it",
            state.root().display()
        );
    }

    let seed = match &cfg.seed.path {
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
            SeedData::from_json(&text).with_context(|| format!("parse seed {}", p.display()))?
        }
        None => SeedData::builtin().context("parse built-in seed")?,
    };
    let seeded = seed.into_state();
    let issues = seeded.catalog.validate(&seeded.rules.rules);
    state.write_seeded(&seeded)?;
    info!(dir = %state.root().display(), "state initialized");

    println!(
        "Initialized {} ({} products, {} task definitions)",
        state.root().display(),
        seeded.catalog.products.len(),
        seeded.catalog.tasks.len()
    );
    if !issues.is_empty() {
        eprint!("{}", render::render_issues(&issues));
    }
    Ok(())
}

fn today(state: &StateDir, cfg: &Config, date: Option<&str>, json: bool) -> Result<()> {
    let engine = state.load_engine()?;
    let schedule = match date {
        Some(d) => engine.schedule_for_date(parse_date_key(d)?),
        None => engine.schedule_today(Utc::now()),
    };

    if json || cfg.display.json {
        return print_json(&schedule);
    }
    let products = cfg
        .display
        .product_names
        .then(|| engine.catalog().products.as_slice());
    print!("{}", render::render_schedule(&schedule, products));
    Ok(())
}

fn record(
    state: &StateDir,
    cfg: &Config,
    kind: EventKind,
    instance: &str,
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let _lock = state.lock()?;
    let mut engine = state.load_engine()?;
    let at = match at {
        Some(s) => parse_instant(s)?,
        None => Utc::now(),
    };

    let receipt = match kind {
        EventKind::Completed => engine.record_completion(instance, at),
        EventKind::Skipped => engine.record_skip(instance, at),
    }
    .with_context(|| format!("record {instance}"))?;

    if receipt.rotation_updates.is_empty() {
        state.save_status(engine.status())?;
    } else {
        state.save_event(engine.status(), engine.usage())?;
    }

    if json || cfg.display.json {
        return print_json(&receipt);
    }
    println!("{}", render::render_receipt(&receipt));
    Ok(())
}

fn rules_cmd(state: &StateDir, command: RulesCommand) -> Result<()> {
    let patch = match command {
        RulesCommand::Show => {
            let engine = state.load_engine()?;
            return print_json(engine.rules());
        }
        RulesCommand::SetCondition { key, value } => RulesPatch {
            rules: None,
            conditions: Some(BTreeMap::from([(key, value)])),
        },
        RulesCommand::Patch { file } => read_json_file(&file)?,
    };

    let _lock = state.lock()?;
    let mut engine = state.load_engine()?;
    engine.apply_rules_patch(&patch)?;
    state.save_rules(engine.rules())?;
    print_json(engine.rules())
}

fn products_cmd(state: &StateDir, cfg: &Config, command: ProductsCommand) -> Result<()> {
    match command {
        ProductsCommand::List { all, json } => {
            let engine = state.load_engine()?;
            let products: Vec<&Product> = engine
                .catalog()
                .products
                .iter()
                .filter(|p| all || p.is_active)
                .collect();
            if json || cfg.display.json {
                return print_json(&products);
            }
            print!("{}", render::render_products(products));
            Ok(())
        }
        ProductsCommand::Add {
            id,
            name,
            category,
            role,
            notes,
        } => {
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            let mut product = Product::new(id, name, category, role);
            if let Some(notes) = notes {
                product = product.with_notes(notes);
            }
            let added = engine.catalog_mut().add_product(product)?;
            println!("Added product {}", added.id);
            state.save_products(&engine.catalog().products)
        }
        ProductsCommand::Update { id, file } => {
            let patch: ProductPatch = read_json_file(&file)?;
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            engine.catalog_mut().update_product(&id, &patch)?;
            println!("Updated product {id}");
            state.save_products(&engine.catalog().products)
        }
        ProductsCommand::Deactivate { id } => {
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            engine.catalog_mut().deactivate_product(&id)?;
            println!("Deactivated product {id}");
            state.save_products(&engine.catalog().products)
        }
    }
}

fn tasks_cmd(state: &StateDir, cfg: &Config, command: TasksCommand) -> Result<()> {
    match command {
        TasksCommand::List { json } => {
            let engine = state.load_engine()?;
            if json || cfg.display.json {
                return print_json(&engine.catalog().tasks);
            }
            print!("{}", render::render_tasks(&engine.catalog().tasks));
            Ok(())
        }
        TasksCommand::Add { file } => {
            let task: TaskDefinition = read_json_file(&file)?;
            let (_, issues) = task.due_rule();
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            let added = engine.catalog_mut().add_task(task)?;
            println!("Added task definition {} [{}]", added.id, added.slot);
            eprint!("{}", render::render_issues(&issues));
            state.save_tasks(&engine.catalog().tasks)
        }
        TasksCommand::Update { id, file } => {
            let patch: TaskPatch = read_json_file(&file)?;
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            engine.catalog_mut().update_task(&id, &patch)?;
            println!("Updated task definition {id}");
            state.save_tasks(&engine.catalog().tasks)
        }
        TasksCommand::Remove { id } => {
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            engine.remove_task(&id)?;
            state.save_tasks(&engine.catalog().tasks)?;
            state.save_status(engine.status())?;
            println!("Removed task definition {id}");
            Ok(())
        }
    }
}

fn assist_cmd(state: &StateDir, command: AssistCommand) -> Result<()> {
    match command {
        AssistCommand::Propose { instruction } => {
            let engine = state.load_engine()?;
            let proposal = UnconfiguredAssistant.propose(&instruction, &engine.snapshot())?;
            print_json(&proposal)
        }
        AssistCommand::Apply { file, dry_run } => {
            let _lock = state.lock()?;
            let mut engine = state.load_engine()?;
            let text = fs::read_to_string(&file).with_context(|| format!("read {}", file.display()))?;
            let proposal = PatchProposal::from_model_text(&text)
                .with_context(|| format!("parse {}", file.display()))?;
            let edit = apply_proposal(&engine.snapshot(), &proposal).context("proposal rejected")?;

            print!("{}", render::render_edit(&edit));
            if dry_run || edit.is_noop() {
                return Ok(());
            }

            let products_changed = !edit.products.is_empty();
            let tasks_changed = !edit.tasks.is_empty();
            let status_changed = !edit.tasks.removed.is_empty();
            let rules_changed = edit.rules_changed || edit.conditions_changed;
            engine.apply_edit(edit);

            if products_changed {
                state.save_products(&engine.catalog().products)?;
            }
            if tasks_changed {
                state.save_tasks(&engine.catalog().tasks)?;
            }
            if status_changed {
                state.save_status(engine.status())?;
            }
            if rules_changed {
                state.save_rules(engine.rules())?;
            }
            Ok(())
        }
    }
}

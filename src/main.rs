//! seshat CLI: world-model loading, planning, execution, and queries.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use seshat::config::Config;
use seshat::embedding::SearchKind;
use seshat::engine::Engine;
use seshat::error::SeshatError;

#[derive(Parser)]
#[command(name = "seshat", version, about = "Robot task-planning backend")]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "seshat.toml")]
    config: PathBuf,

    /// Project root (data/, action/, plans/ live here).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store status: counts and active environment.
    Status,

    /// List environments under the envs directory.
    Envs,

    /// Load the active environment (static + dynamic TTL) and seed the
    /// versioned action world.
    Load,

    /// Synthesize a PDDL problem for a goal and run the planner.
    Plan {
        /// Goal formula, e.g. "(and (isON tv_52))".
        #[arg(long)]
        goal: String,

        /// Optional task description used in output names.
        #[arg(long)]
        description: Option<String>,
    },

    /// Execute a single plan action, e.g. "(move robot1 corridor_14 door_9)".
    Execute {
        #[arg(long)]
        action: String,
    },

    /// Execute every action of a solution file in order.
    RunPlan {
        /// Path to the solution.plan file.
        #[arg(long)]
        file: PathBuf,
    },

    /// Show normalized records for the given object ids.
    Info {
        /// Comma-separated object ids.
        #[arg(long)]
        ids: String,
    },

    /// Filter objects by class, category, relationship, or attribute.
    Filter {
        #[arg(long)]
        class: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Relationship constraints as predicate=target pairs.
        #[arg(long)]
        relationship: Vec<String>,

        /// Data-property constraints as key=value pairs (value parsed as JSON).
        #[arg(long)]
        property: Vec<String>,
    },

    /// Shortest path between two locations (artifacts resolve to their Space).
    Path {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// Semantic search over the projection.
    Search {
        #[arg(long)]
        query: String,

        #[arg(long, default_value = "5")]
        top_k: usize,

        /// "category" or "description".
        #[arg(long, default_value = "description")]
        search_type: String,
    },

    /// Run a SPARQL SELECT against the reasoned model.
    Sparql {
        #[arg(long)]
        query: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hnsw_rs=warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let mut engine = match Engine::boot(config, &cli.root) {
        Ok(engine) => engine,
        Err(e @ SeshatError::Config(_)) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("startup failed: {e}");
            return ExitCode::from(1);
        }
    };

    match run(&mut engine, cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(engine: &mut Engine, command: Commands) -> Result<ExitCode, SeshatError> {
    match command {
        Commands::Status => {
            let status = engine.status();
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        }
        Commands::Envs => {
            for env in engine.list_envs() {
                let marker = if env.is_active { "*" } else { " " };
                println!(
                    "{marker} {} (static: {}, dynamic: {})",
                    env.env_id, env.has_static, env.has_dynamic
                );
            }
        }
        Commands::Load => {
            let (static_report, dynamic_report) = engine.load_active_env()?;
            println!(
                "static: {} added, {} failed",
                static_report.added, static_report.failed
            );
            println!(
                "dynamic: {} added, {} failed",
                dynamic_report.added, dynamic_report.failed
            );
        }
        Commands::Plan { goal, description } => {
            let report = engine.plan_goal(&goal, description.as_deref())?;
            if report.outcome.returncode == 0 {
                println!("plan found ({} actions):", report.outcome.actions.len());
                for (i, action) in report.outcome.actions.iter().enumerate() {
                    println!("{:3}. {action}", i + 1);
                }
                if let Some(cost) = report.outcome.plan_cost {
                    println!("cost: {cost}");
                }
                println!("problem: {}", report.problem_path.display());
                println!("solution: {}", report.solution_path.display());
            } else {
                eprintln!("planning failed (exit {})", report.outcome.returncode);
                eprintln!("problem: {}", report.problem_path.display());
                eprintln!("debug:   {}", report.debug_path.display());
                eprintln!("{}", report.outcome.stdout);
                eprintln!("{}", report.outcome.stderr);
                // reproduce the planner's exit code as-is
                let code = u8::try_from(report.outcome.returncode).unwrap_or(2);
                return Ok(ExitCode::from(code.max(2)));
            }
        }
        Commands::Execute { action } => {
            let log = engine.execute_action(&action)?;
            println!("{}", serde_json::to_string_pretty(&log).unwrap_or_default());
        }
        Commands::RunPlan { file } => {
            let logs = engine.run_plan_file(&file)?;
            println!("executed {} actions", logs.len());
        }
        Commands::Info { ids } => {
            let ids: Vec<String> = ids.split(',').map(|s| s.trim().to_string()).collect();
            let records = engine.with_query_tools(|tools| tools.get_object_info(&ids));
            println!("{}", serde_json::to_string_pretty(&records).unwrap_or_default());
        }
        Commands::Filter {
            class,
            category,
            relationship,
            property,
        } => {
            let relationships = parse_pairs(&relationship);
            let properties: BTreeMap<String, serde_json::Value> = parse_pairs(&property)
                .into_iter()
                .map(|(k, v)| {
                    let value = serde_json::from_str(&v)
                        .unwrap_or_else(|_| serde_json::Value::String(v));
                    (k, value)
                })
                .collect();
            let records = engine.with_query_tools(|tools| {
                tools.filter_objects(
                    class.as_deref(),
                    category.as_deref(),
                    &relationships,
                    &properties,
                )
            });
            println!("{}", serde_json::to_string_pretty(&records).unwrap_or_default());
        }
        Commands::Path { from, to } => {
            let result = engine.with_query_tools(|tools| tools.find_path(&from, &to))?;
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        }
        Commands::Search {
            query,
            top_k,
            search_type,
        } => {
            let kind = SearchKind::parse(&search_type)?;
            let hits = engine.semantic_search(&query, top_k, kind)?;
            println!("{}", serde_json::to_string_pretty(&hits).unwrap_or_default());
        }
        Commands::Sparql { query } => {
            let response = engine.world().execute_sparql_select(&query)?;
            println!("{}", serde_json::to_string_pretty(&response).unwrap_or_default());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_pairs(items: &[String]) -> BTreeMap<String, String> {
    items
        .iter()
        .filter_map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

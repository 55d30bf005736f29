//! propsdb CLI
//!
//! Local inspection and maintenance of a property store database. Each
//! subcommand maps to one store operation and prints JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use propsdb_core::{
    init_logging_from_config, DeleteRequest, MutationOutcome, PropsConfig, PropsServiceError,
    PropsStore, ReadOutcome, Scope, SetRequest,
};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "propsdb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and edit a propsdb property store")]
#[command(long_about = "propsdb - versioned document/group/leaf property store\n\n\
    Configuration is read from the environment (DB_TYPE, DB_APP_DATABASE, ...).\n\
    --database overrides DB_APP_DATABASE and implies sqlite.\n\n\
    Examples:\n\
      propsdb --database props.db get home --group cfg\n\
      propsdb --database props.db set home --body '{\"version\":0,\"groups\":{\"group\":\"cfg\",\"leaves\":{\"a\":1}}}'\n\
      propsdb --database props.db --owner <UUID> get-all")]
struct Cli {
    /// SQLite database file (overrides DB_APP_DATABASE)
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Operate on this owner's partition instead of the shared scope
    #[arg(long, global = true, value_name = "UUID")]
    owner: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one document, optionally restricted to some groups
    Get {
        document: String,

        /// Group to read; repeat or comma-join for several
        #[arg(short, long, value_name = "GROUP", action = clap::ArgAction::Append)]
        group: Vec<String>,
    },

    /// Read every document of the scope
    GetAll,

    /// Merge groups and leaves into a document
    Set {
        document: String,

        /// Request body (`{"version": N, "groups": [...]}`); `-` reads stdin
        #[arg(short, long, value_name = "JSON")]
        body: String,
    },

    /// Remove one group from a document
    DeleteGroup {
        document: String,
        group: String,

        /// Expected document version
        #[arg(short = 'v', long = "expected-version", value_name = "N")]
        version: u64,
    },

    /// Remove leaves, groups, or the whole document
    Delete {
        document: String,

        /// Request body (`{"version": N, "groups": [...], "deleteDocument": bool}`); `-` reads stdin
        #[arg(short, long, value_name = "JSON")]
        body: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<PropsServiceError>() {
                Some(service_err) => eprintln!(
                    "{}",
                    json!({
                        "kind": service_err.kind().as_str(),
                        "retryable": service_err.is_retryable(),
                        "message": service_err.to_string(),
                    })
                ),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.database)?;
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }

    let store = PropsStore::open(&config).context("failed to open property store")?;
    let scope = match cli.owner {
        Some(owner) => Scope::Owner(owner),
        None => Scope::Shared,
    };
    log::debug!("event=cli_start module=cli status=ok scope={}", scope.label());

    match cli.command {
        Commands::Get { document, group } => {
            let outcome = if let [single] = group.as_slice() {
                if single.contains(',') {
                    store.get_groups(&scope, &document, &group)?
                } else {
                    store.get_group(&scope, &document, single)?
                }
            } else {
                store.get_groups(&scope, &document, &group)?
            };
            print_read(outcome)
        }
        Commands::GetAll => print_read(store.get_all(&scope)?),
        Commands::Set { document, body } => {
            let request: SetRequest =
                serde_json::from_str(&read_body(&body)?).context("invalid set request body")?;
            let outcome =
                store.set_properties(&scope, &document, request.version, &request.groups)?;
            print_mutation(outcome)
        }
        Commands::DeleteGroup {
            document,
            group,
            version,
        } => print_mutation(store.delete_group(&scope, &document, version, &group)?),
        Commands::Delete { document, body } => {
            let request: DeleteRequest =
                serde_json::from_str(&read_body(&body)?).context("invalid delete request body")?;
            let outcome = store.delete_properties(
                &scope,
                &document,
                request.version,
                &request.groups,
                request.delete_document,
            )?;
            print_mutation(outcome)
        }
    }
}

fn load_config(database: Option<PathBuf>) -> Result<PropsConfig> {
    match database {
        Some(path) => {
            let mut config = PropsConfig::sqlite(path);
            // Keep logging settings from the environment.
            config.log_level = std::env::var("LOG_LEVEL").ok().filter(|v| !v.is_empty());
            config.log_dir = std::env::var("LOG_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
            Ok(config)
        }
        None => PropsConfig::from_env().context("invalid configuration"),
    }
}

fn read_body(body: &str) -> Result<String> {
    if body != "-" {
        return Ok(body.to_string());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read request body from stdin")?;
    if buffer.trim().is_empty() {
        bail!("empty request body on stdin");
    }
    Ok(buffer)
}

fn print_read(outcome: ReadOutcome) -> Result<()> {
    match outcome {
        ReadOutcome::Content(tree) => println!("{}", serde_json::to_string_pretty(&tree)?),
        ReadOutcome::NoContent => println!("{}", json!({"content": false})),
    }
    Ok(())
}

fn print_mutation(outcome: MutationOutcome) -> Result<()> {
    println!(
        "{}",
        json!({
            "ok": true,
            "version": outcome.new_version.to_string(),
            "affected_rows": outcome.affected_rows,
        })
    );
    Ok(())
}

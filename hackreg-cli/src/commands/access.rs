//! Access matrix commands. These only read the frozen rule table and never
//! touch the database.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hackreg_core::{Operation, Principal, Role};
use hackreg_server::gate;

#[derive(Parser, Debug)]
pub struct MatrixArgs {
    /// Only show rules for this entity (e.g. pre-registration)
    #[arg(long)]
    pub entity: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct AuthorizeArgs {
    /// Entity name (hackathon, pre-registration, extra-credit)
    #[arg(long)]
    pub entity: String,

    /// Operation: create, read, readall, update, delete, count
    #[arg(long)]
    pub operation: Operation,

    /// Role of the caller
    #[arg(long)]
    pub role: Role,

    /// Id of the caller, for rules limited to their own records
    #[arg(long)]
    pub principal: Option<String>,

    /// Id owning the record acted on
    #[arg(long)]
    pub owner: Option<String>,
}

fn join(roles: &[Role]) -> String {
    if roles.is_empty() {
        return "-".to_string();
    }
    roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(",")
}

pub fn run_matrix(args: MatrixArgs) -> Result<()> {
    let registry = hackreg_server::registry();
    let entries: Vec<_> = registry
        .matrix()
        .into_iter()
        .filter(|e| args.entity.as_deref().map_or(true, |entity| e.entity == entity))
        .collect();

    if let Some(entity) = &args.entity {
        if entries.is_empty() {
            bail!("no rules registered for entity '{}'", entity);
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&entries).context("failed to serialize matrix")?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "{:<30} {:<45} {:<15} {}",
        "PERMISSION", "ALLOWED", "OWNER ONLY", "DENIED"
    );
    for entry in &entries {
        println!(
            "{:<30} {:<45} {:<15} {}",
            entry.operation.permission(&entry.entity),
            join(&entry.allowed),
            join(&entry.owner_gated),
            join(&entry.denied)
        );
    }
    Ok(())
}

pub fn run_authorize(args: AuthorizeArgs) -> Result<()> {
    let registry = hackreg_server::registry();
    let principal = match args.principal {
        Some(id) => Principal::new(id, args.role),
        None => Principal::anonymous(args.role),
    };

    gate::authorize(
        &registry,
        &args.entity,
        args.operation,
        &principal,
        args.owner.as_deref(),
    )?;
    println!("allowed: {}", args.operation.permission(&args.entity));
    Ok(())
}

//! LdapGroups command-line management tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! listing mapping operators, evaluating a directory entry against a
//! server's rules, running the login group sync against the membership
//! database, and inspecting memberships and the audit log.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ldapgroups_core::config::AppConfig;
use ldapgroups_core::db::Database;
use ldapgroups_core::engine::{granted_groups, EvaluationContext};
use ldapgroups_core::login::GroupSync;
use ldapgroups_core::models::{DirectoryEntry, GroupRef, UserId};
use ldapgroups_core::operators::OperatorRegistry;
use ldapgroups_core::sync::{MemoryGroupStore, SyncOutcome, UserGroupStore};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// LdapGroups command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "ldapgroups",
    version,
    about = "Map LDAP directory attributes to application groups"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/ldapgroups/config.toml"
    )]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./ldapgroups.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// List the available mapping operators.
    Operators,

    /// Show which groups a directory entry would be granted.
    Evaluate {
        /// Directory server name from the config file.
        #[arg(short, long)]
        server: String,

        /// JSON file holding the directory entry.
        #[arg(short, long)]
        entry: PathBuf,

        /// Print the outcome of every rule.
        #[arg(long)]
        explain: bool,
    },

    /// Apply a login group sync for a user.
    Sync {
        /// Directory server name from the config file.
        #[arg(short, long)]
        server: String,

        /// JSON file holding the directory entry.
        #[arg(short, long)]
        entry: PathBuf,

        /// User whose memberships are synchronized.
        #[arg(short, long)]
        user: String,

        /// Compute the result without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a user's current group memberships.
    Groups {
        /// User ID.
        #[arg(short, long)]
        user: String,
    },

    /// Show recent audit log entries.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone().unwrap_or_else(|| {
        AppConfig::load_from_file(&cli.config)
            .map(|c| c.general.log_level)
            .unwrap_or_else(|_| "warn".to_string())
    });
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Operators => cmd_operators(),
        _ => {
            // All other commands need a valid config
            let config = load_config(&cli.config)?;

            match cli.command {
                Commands::Evaluate {
                    server,
                    entry,
                    explain,
                } => cmd_evaluate(config, &server, &entry, explain),
                Commands::Sync {
                    server,
                    entry,
                    user,
                    dry_run,
                } => cmd_sync(config, &server, &entry, &user, dry_run),
                Commands::Groups { user } => cmd_groups(&config, &user),
                Commands::Audit { limit } => cmd_audit(&config, limit),
                _ => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_validate(path, &OperatorRegistry::builtin())
        .context("failed to load configuration file")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    std::fs::create_dir_all(&config.general.data_dir)
        .context("failed to create data directory")?;
    let db = Database::new(config.general.database_path()).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

fn load_entry(path: &Path) -> Result<DirectoryEntry> {
    DirectoryEntry::load_from_file(path)
        .with_context(|| format!("failed to load directory entry from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# LdapGroups Configuration
# One [[servers]] table per directory server, each with ordered
# [[servers.group_mappings]] rules. Run `ldapgroups operators` to list
# the operators a rule may use.

[general]
log_level = "info"
data_dir = "/var/lib/ldapgroups"

[[servers]]
name = "corp-ad"
description = "Corporate Active Directory"
# When true, groups not granted by a rule are removed on every login.
exclusive_groups = false

# For Active Directory, check memberOf with 'contains' and the group's DN.
[[servers.group_mappings]]
attribute = "memberOf"
operator = "contains"
value = "cn=Admins,ou=Groups,dc=example,dc=com"
group = "administrators"

[[servers.group_mappings]]
attribute = "department"
operator = "equals"
value = "Engineering"
group = "engineering"
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory servers and group mappings");
    println!(
        "  2. Validate with: ldapgroups validate --config {}",
        output.display()
    );
    println!(
        "  3. Try a mapping: ldapgroups evaluate --config {} --server corp-ad --entry entry.json",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate(&OperatorRegistry::builtin()) {
        Ok(()) => {
            println!("  [OK] All servers and mapping rules are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Log level     : {}", config.general.log_level);
    println!("  Data directory: {}", config.general.data_dir.display());
    println!("  Servers       : {}", config.servers.len());
    for server in &config.servers {
        println!(
            "    - {:<20} {:<10} {} rule(s)",
            server.name,
            if server.exclusive_groups {
                "exclusive"
            } else {
                "additive"
            },
            server.group_mappings.len()
        );
    }
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_operators() -> Result<()> {
    let registry = OperatorRegistry::builtin();

    println!("{:<24} DESCRIPTION", "OPERATOR");
    println!("{}", "-".repeat(50));
    for (name, display_name) in registry.list_operators() {
        println!("{:<24} {}", name, display_name);
    }

    Ok(())
}

fn cmd_evaluate(config: AppConfig, server: &str, entry_path: &Path, explain: bool) -> Result<()> {
    let entry = load_entry(entry_path)?;
    let login = entry.dn.clone();
    let sync = GroupSync::new(config, OperatorRegistry::builtin());

    let grants = if explain {
        let server_config = sync
            .config()
            .server(server)
            .ok_or_else(|| anyhow::anyhow!("no directory server named '{}'", server))?;
        let ctx = EvaluationContext::new(login.as_str(), server);
        let outcomes = sync
            .engine()
            .explain(&entry, server_config, &ctx)
            .context("group mapping failed")?;

        println!("{:<4} {:<8} RULE", "#", "MATCHED");
        println!("{}", "-".repeat(80));
        for outcome in &outcomes {
            println!(
                "{:<4} {:<8} {}",
                outcome.index,
                if outcome.matched { "yes" } else { "no" },
                outcome.rule
            );
        }
        println!();
        granted_groups(&outcomes)
    } else {
        sync.evaluate_only(server, &entry, &login)
            .context("group mapping failed")?
    };

    if grants.is_empty() {
        println!("No groups granted for {}", entry.dn);
        return Ok(());
    }

    println!("Groups granted for {}:", entry.dn);
    for group in &grants {
        println!("  {}", group);
    }

    Ok(())
}

fn cmd_sync(
    config: AppConfig,
    server: &str,
    entry_path: &Path,
    user: &str,
    dry_run: bool,
) -> Result<()> {
    let entry = load_entry(entry_path)?;
    let user = UserId::new(user);

    let (outcome, final_groups) = if dry_run {
        let current = current_groups_read_only(&config, &user)?;
        let sync = GroupSync::new(config, OperatorRegistry::builtin());
        let mut preview = MemoryGroupStore::new().with_user(user.clone(), current);
        let outcome = sync
            .on_user_resolved(server, &entry, Some(&user), &mut preview)
            .context("group sync failed")?;
        let groups = preview.groups(&user)?;
        (outcome, groups)
    } else {
        let db = open_database(&config)?;
        let sync = GroupSync::new(config, OperatorRegistry::builtin());
        let outcome = db
            .apply_login_sync(&sync, server, &entry, Some(&user))
            .context("group sync failed")?;
        let groups = db.groups(&user)?;
        (outcome, groups)
    };

    let Some(outcome) = outcome else {
        debug!("sync skipped");
        return Ok(());
    };

    print_outcome(&outcome, dry_run);
    println!("  Final groups : {}", join_groups(final_groups.iter()));

    Ok(())
}

/// Current memberships of `user`, read without creating or migrating the
/// database. A missing database file means no memberships yet.
fn current_groups_read_only(config: &AppConfig, user: &UserId) -> Result<BTreeSet<GroupRef>> {
    let path = config.general.database_path();
    if !path.exists() {
        debug!(path = %path.display(), "no database yet, previewing from empty memberships");
        return Ok(BTreeSet::new());
    }
    let db = Database::open_read_only(&path).context("failed to open database")?;
    db.groups(user)
        .context("failed to read current memberships")
}

fn print_outcome(outcome: &SyncOutcome, dry_run: bool) {
    println!(
        "Group sync {}for {}:",
        if dry_run { "(dry run) " } else { "" },
        outcome.user
    );
    println!(
        "  Mode         : {}",
        if outcome.cleared {
            "exclusive (existing groups cleared)"
        } else {
            "additive"
        }
    );
    println!("  Granted      : {}", join_groups(outcome.granted.iter()));
}

fn cmd_groups(config: &AppConfig, user: &str) -> Result<()> {
    let db = open_database(config)?;
    let entries = db
        .list_user_groups(user)
        .context("failed to list user groups")?;

    if entries.is_empty() {
        println!("User '{}' has no groups.", user);
        return Ok(());
    }

    println!("{:<30} GRANTED AT", "GROUP");
    println!("{}", "-".repeat(60));
    for entry in &entries {
        println!("{:<30} {}", entry.group_name, entry.granted_at);
    }

    Ok(())
}

fn cmd_audit(config: &AppConfig, limit: u32) -> Result<()> {
    let db = open_database(config)?;
    let entries = db
        .list_audit_log(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No audit log entries found.");
        return Ok(());
    }

    println!(
        "{:<34} {:<22} {:<16} {:<12} DETAILS",
        "TIMESTAMP", "ACTION", "USER", "SERVER"
    );
    println!("{}", "-".repeat(100));

    for entry in &entries {
        println!(
            "{:<34} {:<22} {:<16} {:<12} {}",
            entry.created_at,
            entry.action,
            truncate(&entry.user_id, 16),
            entry.server.as_deref().unwrap_or("-"),
            truncate(entry.details.as_deref().unwrap_or(""), 40),
        );
    }

    println!();
    println!("{} entries shown", entries.len());

    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn join_groups<'a, I>(groups: I) -> String
where
    I: Iterator<Item = &'a GroupRef>,
{
    let names: Vec<&str> = groups.map(|g| g.as_str()).collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

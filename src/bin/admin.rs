//! Post Policy Admin CLI
//!
//! Administration tool for the users, groups, posts and policies the server
//! reads.
//!
//! # Usage
//!
//! ```bash
//! postpolicy-admin user add alice --name Alice --staff
//! postpolicy-admin group add legal
//! postpolicy-admin group join legal bob
//! postpolicy-admin post add --author alice
//! postpolicy-admin policy set 1 --group legal
//! postpolicy-admin policy status 1
//! ```

use clap::{Args, Parser, Subcommand};
use postpolicy::config::Config;
use postpolicy::db::{init_db, DirectoryRepository, PolicyRepository};
use postpolicy_core::{PolicyStore, PostId};
use std::path::PathBuf;

type CliResult = Result<(), Box<dyn std::error::Error>>;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "postpolicy-admin")]
#[command(version)]
#[command(about = "Post policy administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
    /// Manage groups
    Group(GroupCommand),
    /// Manage posts
    Post(PostCommand),
    /// Manage policies
    Policy(PolicyCommand),
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a new user
    Add {
        username: String,
        /// Display name
        #[arg(long, short)]
        name: Option<String>,
        /// Grant staff privileges
        #[arg(long)]
        staff: bool,
    },
    /// List all users
    List,
}

#[derive(Args)]
struct GroupCommand {
    #[command(subcommand)]
    command: GroupSubcommand,
}

#[derive(Subcommand)]
enum GroupSubcommand {
    /// Create a group
    Add { name: String },
    /// Add a user to a group
    Join { group: String, username: String },
}

#[derive(Args)]
struct PostCommand {
    #[command(subcommand)]
    command: PostSubcommand,
}

#[derive(Subcommand)]
enum PostSubcommand {
    /// Create a post and print its id
    Add {
        /// Author username
        #[arg(long, short)]
        author: Option<String>,
    },
}

#[derive(Args)]
struct PolicyCommand {
    #[command(subcommand)]
    command: PolicySubcommand,
}

#[derive(Subcommand)]
enum PolicySubcommand {
    /// Attach a policy to a post, replacing its groups if one exists
    Set {
        post_id: i64,
        /// Group allowed to accept (repeatable)
        #[arg(long = "group", short)]
        groups: Vec<String>,
    },
    /// Show acceptance counts for a post's policy
    Status { post_id: i64 },
}

// ============================================================================
// Commands
// ============================================================================

struct Repos {
    directory: DirectoryRepository,
    policies: PolicyRepository,
}

async fn add_user(repos: &Repos, username: String, name: Option<String>, staff: bool) -> CliResult {
    let user = repos
        .directory
        .create_user(&username, name.as_deref(), staff)
        .await?;

    println!("Added user: {} (id {})", user.username, user.id);
    if let Some(n) = &user.name {
        println!("  Name: {}", n);
    }
    if user.staff {
        println!("  Staff: yes");
    }
    Ok(())
}

async fn list_users(repos: &Repos) -> CliResult {
    let users = repos.directory.list_users().await?;

    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!("{:<8} {:<24} {:<24} {:<6}", "ID", "USERNAME", "NAME", "STAFF");
    println!("{}", "-".repeat(64));

    for user in &users {
        println!(
            "{:<8} {:<24} {:<24} {:<6}",
            user.id,
            user.username,
            user.name.as_deref().unwrap_or(""),
            if user.staff { "yes" } else { "" }
        );
    }

    println!();
    println!("Total: {} user(s)", users.len());
    Ok(())
}

async fn add_group(repos: &Repos, name: String) -> CliResult {
    let id = repos.directory.create_group(&name).await?;
    println!("Added group: {} (id {})", name, id);
    Ok(())
}

async fn join_group(repos: &Repos, group: String, username: String) -> CliResult {
    let group_id = repos
        .directory
        .find_group(&group)
        .await?
        .ok_or_else(|| format!("Group '{}' not found", group))?;
    let user = repos
        .directory
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| format!("User '{}' not found", username))?;

    repos.directory.add_member(group_id, user.id).await?;
    println!("Added {} to {}", username, group);
    Ok(())
}

async fn add_post(repos: &Repos, author: Option<String>) -> CliResult {
    let author_id = match author {
        Some(username) => Some(
            repos
                .directory
                .get_user_by_username(&username)
                .await?
                .ok_or_else(|| format!("User '{}' not found", username))?
                .id,
        ),
        None => None,
    };

    let post_id = repos.directory.create_post(author_id).await?;
    println!("{}", post_id);
    Ok(())
}

async fn set_policy(repos: &Repos, post_id: PostId, groups: Vec<String>) -> CliResult {
    if repos.directory.get_post(post_id).await?.is_none() {
        return Err(format!("Post {} not found", post_id).into());
    }

    let mut group_ids = Vec::with_capacity(groups.len());
    for name in &groups {
        let id = repos
            .directory
            .find_group(name)
            .await?
            .ok_or_else(|| format!("Group '{}' not found", name))?;
        group_ids.push(id);
    }

    let policy_id = repos.policies.set_policy(post_id, &group_ids).await?;
    println!("Policy {} on post {}", policy_id, post_id);
    if group_ids.is_empty() {
        eprintln!("Warning: policy has no groups; nobody can accept it");
    } else {
        println!("  Groups: {}", groups.join(", "));
    }
    Ok(())
}

async fn policy_status(repos: &Repos, post_id: PostId) -> CliResult {
    let policy = repos
        .policies
        .policy_for_post(post_id)
        .await?
        .ok_or_else(|| format!("Post {} has no policy", post_id))?;
    let group_ids = repos.policies.group_ids(policy.id).await?;
    let (accepted, not_accepted) = repos.policies.acceptance_counts(policy.id).await?;

    println!("Policy {} on post {}", policy.id, post_id);
    println!("  Groups: {}", group_ids.len());
    println!("  Accepted: {}", accepted);
    println!("  Not accepted: {}", not_accepted);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> CliResult {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let pool = init_db(&config.database_path).await?;
    let repos = Repos {
        directory: DirectoryRepository::new(pool.clone()),
        policies: PolicyRepository::new(pool),
    };

    match cli.command {
        Commands::User(cmd) => match cmd.command {
            UserSubcommand::Add {
                username,
                name,
                staff,
            } => add_user(&repos, username, name, staff).await,
            UserSubcommand::List => list_users(&repos).await,
        },
        Commands::Group(cmd) => match cmd.command {
            GroupSubcommand::Add { name } => add_group(&repos, name).await,
            GroupSubcommand::Join { group, username } => {
                join_group(&repos, group, username).await
            }
        },
        Commands::Post(cmd) => match cmd.command {
            PostSubcommand::Add { author } => add_post(&repos, author).await,
        },
        Commands::Policy(cmd) => match cmd.command {
            PolicySubcommand::Set { post_id, groups } => {
                set_policy(&repos, PostId(post_id), groups).await
            }
            PolicySubcommand::Status { post_id } => policy_status(&repos, PostId(post_id)).await,
        },
    }
}

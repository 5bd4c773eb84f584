use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use recover_truncated::cli::{Cli, Commands, HashArgs, RecoverArgs, TruncateArgs};
use recover_truncated::format::format_for;
use recover_truncated::hashing::{digest_bytes, digest_file};
use recover_truncated::working_copy::truncate_copy;
use recover_truncated::{
    detect_archive_type, Candidate, Coordinator, PasswordSource, RecoveryError, RecoveryReport,
    RetryPolicy,
};

/// Asks on the terminal for another password after a rejection.
struct PasswordPrompt;

impl PasswordSource for PasswordPrompt {
    fn replacement(&mut self, rejected: Option<&str>) -> Option<String> {
        let message = match rejected {
            Some(_) => "The password provided is incorrect.",
            None => "The archive is password protected.",
        };
        eprintln!("{}", message.yellow());
        match prompt_line("Enter the password (empty to give up): ") {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Could not read a password from stdin: {}", e);
                None
            }
        }
    }
}

/// One line from stdin; `None` on EOF or an empty answer.
fn prompt_line(message: &str) -> io::Result<Option<String>> {
    eprint!("{}", message);
    io::stderr().flush()?;

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    let input = input.trim_end_matches(&['\r', '\n'][..]);
    if input.is_empty() {
        Ok(None)
    } else {
        Ok(Some(input.to_string()))
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<RecoveryError>() {
        Some(RecoveryError::LengthExhausted { .. }) => 2,
        Some(RecoveryError::PasswordRejected) => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Recover(args) => recover(args),
        Commands::Truncate(args) => truncate(args),
        Commands::Hash(args) => hash(args),
    }
}

fn recover(args: RecoverArgs) -> Result<()> {
    if let Err(e) = args.validate() {
        anyhow::bail!("Invalid arguments: {}", e);
    }

    let password = if args.ask_password {
        prompt_line("Archive password: ").context("Failed to read the password")?
    } else {
        args.password.clone()
    };
    let config = args
        .to_config(password)
        .context("Failed to build the search configuration")?;
    let coordinator = Coordinator::new(config)
        .with_context(|| format!("Cannot search {}", args.archive.display()))?;

    if !args.json {
        let config = coordinator.config();
        println!("{}", "Truncated archive recovery".bold());
        println!("{}", "=".repeat(60));
        println!("  Archive:       {}", config.archive.display());
        println!("  Member:        {}", config.member);
        println!("  Target {:<7} {}", format!("{}:", config.algorithm), config.target_hash);
        println!(
            "  Workers:       {} producers, {} consumers",
            config.producers, config.consumers
        );
        match config.max_length {
            Some(max) => println!("  Lengths:       {} to {}", config.start_length, max),
            None => println!("  Lengths:       from {}", config.start_length),
        }
        println!();
    }

    let recovery = coordinator.run(&mut PasswordPrompt)?;

    if let Some(extract_to) = &args.extract_to {
        fs::write(extract_to, &recovery.content)
            .with_context(|| format!("Failed to write {}", extract_to.display()))?;
    }

    if args.json {
        let report = RecoveryReport::new(coordinator.config(), &recovery);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== Recovery Results ===".bold());
    println!(
        "Missing bytes:    {} ({} bytes)",
        recovery.suffix.to_string().green().bold(),
        recovery.suffix.len()
    );
    println!("Repaired archive: {}", recovery.output.display());
    if let Some(extract_to) = &args.extract_to {
        println!("Member written:   {}", extract_to.display());
    }
    for attempt in &recovery.attempts {
        println!(
            "  length {}: {:?} after {} candidates ({} ms)",
            attempt.length, attempt.outcome, attempt.candidates_tested, attempt.elapsed_ms
        );
    }
    println!();
    println!("{}", format!("Content of {}:", coordinator.config().member).bold());
    println!("{}", String::from_utf8_lossy(&recovery.content));
    Ok(())
}

fn truncate(args: TruncateArgs) -> Result<()> {
    let member_hash = match &args.member {
        Some(member) => {
            let archive_type = detect_archive_type(&args.archive)
                .with_context(|| format!("Failed to read {}", args.archive.display()))?;
            let format = format_for(archive_type)?;
            let present = format
                .contains_member(&args.archive, member)
                .with_context(|| format!("Failed to list {}", args.archive.display()))?;
            if !present {
                let members = format.list_members(&args.archive)?;
                anyhow::bail!(
                    "'{}' is not in {} (members: {})",
                    member,
                    args.archive.display(),
                    members.join(", ")
                );
            }
            let content = format
                .read_member(&args.archive, member, args.password.as_deref())
                .with_context(|| {
                    format!("Failed to read '{}' from {}", member, args.archive.display())
                })?;
            Some((member, digest_bytes(&content, args.algorithm)))
        }
        None => None,
    };

    let output = args.output_path();
    let removed = truncate_copy(&args.archive, &output, args.bytes, RetryPolicy::default())
        .with_context(|| format!("Failed to truncate {}", args.archive.display()))?;

    println!("Truncated copy:  {}", output.display());
    println!(
        "Removed bytes:   {}",
        Candidate::new(removed).to_string().green().bold()
    );
    if let Some((member, hash)) = member_hash {
        println!("{} of {}: {}", args.algorithm, member, hash);
    }
    Ok(())
}

fn hash(args: HashArgs) -> Result<()> {
    let digest = digest_file(&args.file, args.algorithm)
        .with_context(|| format!("Failed to hash {}", args.file.display()))?;
    println!("{}  {}", digest, args.file.display());
    Ok(())
}

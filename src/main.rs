use clap::{Parser, Subcommand};
use site_stack::config::{self, Overrides};
use site_stack::{output, synth};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "site-stack")]
#[command(about = "Synthesize a CloudFront + S3 static site stack")]
#[command(long_about = "\
Synthesize a CloudFront + S3 static site stack

Reads stack.toml from the project directory, hashes the site's files and
writes a CloudFormation template plus a cloud assembly for the provisioning
engine to deploy. Nothing is sent to AWS.

Project structure:

  project/
  ├── stack.toml                   # Stack config (see gen-config)
  └── src/frontend/
      ├── package.json             # Front-end sources (build mode = container)
      └── lib/                     # Pre-built site (build mode = pre-built)
          ├── chatmodel.html       # Default root object
          └── error.html           # Served for 403s

Resources:
  CloudfrontOAI → SiteBucket (private) ← SiteBucketPolicy
  SiteDistribution (HTTPS redirect, 403 → /error.html)
  DeployWithInvalidation → SiteInvalidation (/*)

Run 'site-stack gen-config' to generate a documented stack.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project directory containing stack.toml
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    /// Cloud assembly output directory
    #[arg(long, default_value = "cdk.out", global = true)]
    out: PathBuf,

    /// Target AWS account (overrides stack.toml)
    #[arg(long, env = "SITE_STACK_ACCOUNT", global = true)]
    account: Option<String>,

    /// Target AWS region (overrides stack.toml)
    #[arg(long, env = "SITE_STACK_REGION", global = true)]
    region: Option<String>,

    /// Apex domain (overrides site.domain_name)
    #[arg(long, global = true)]
    domain_name: Option<String>,

    /// Subdomain label(s) (overrides site.site_sub_domain)
    #[arg(long, global = true)]
    sub_domain: Option<String>,

    /// Threads used to hash assets (default: all cores)
    #[arg(long, global = true)]
    jobs: Option<usize>,

    /// Log pipeline progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write the cloud assembly
    Synth,
    /// Validate config and assets and print the resource plan
    Check,
    /// Print the rendered CloudFormation template
    Template,
    /// Print a stock stack.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("SITE_STACK_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("site_stack=debug")
        } else {
            EnvFilter::new("site_stack=warn")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .init();

    init_thread_pool(cli.jobs);

    let overrides = Overrides {
        account: cli.account.clone(),
        region: cli.region.clone(),
        domain_name: cli.domain_name.clone(),
        site_sub_domain: cli.sub_domain.clone(),
    };

    match cli.command {
        Command::Synth => {
            println!("==> Synthesizing {}", cli.project.display());
            let (plan, report) = synth::synth(&cli.project, &cli.out, &overrides)?;
            output::print_plan(&plan);
            println!();
            let cwd = std::env::current_dir()?;
            output::print_synth_report(&report, &cwd);
            println!("==> Synth complete: {}", cli.out.display());
        }
        Command::Check => {
            println!("==> Checking {}", cli.project.display());
            let plan = synth::plan(&cli.project, &overrides)?;
            output::print_plan(&plan);
            println!("==> Stack is valid");
        }
        Command::Template => {
            let plan = synth::plan(&cli.project, &overrides)?;
            println!("{}", plan.template.to_json_pretty()?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool used for asset hashing.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(jobs: Option<usize>) {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    let threads = jobs.map_or(cores, |j| j.clamp(1, cores));
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

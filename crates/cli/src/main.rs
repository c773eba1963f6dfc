use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use lakestack_cfn as cfn;
use lakestack_policy::Policy;

mod config;
mod stack;

use config::StackConfig;

#[derive(Parser, Debug)]
#[command(author, version, about="lakestack — data-ingestion stack synthesizer (CloudFormation)")]
struct Cli {
    /// Stack config file (YAML or .yaml.age)
    #[arg(short, long, default_value="stack.yaml", global = true)]
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value="out", global = true)]
    out: PathBuf,

    /// Allow unencrypted buckets
    #[arg(long, default_value_t=false, global = true)]
    allow_unencrypted: bool,

    /// AGE identities (for .age config files)
    #[arg(long="age-identity", global = true)]
    age_ids: Vec<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum PolicyKind { Key, DataBucket, LogBucket }

#[derive(Subcommand, Debug)] enum Cmd {
    /// Write the CloudFormation template
    Synth,
    /// Synthesize and deploy with `aws cloudformation deploy`
    Deploy {
        #[arg(long)] stack: Option<String>,
    },
    /// Delete the deployed stack
    Destroy {
        #[arg(long)] stack: Option<String>,
    },
    /// Print one policy document
    Policy {
        #[arg(value_enum)] which: PolicyKind,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let cfg = StackConfig::load(&cli.file, &cli.age_ids)?;
    let guard = Policy::new(cli.allow_unencrypted, cfg.account_context()?.root_arn());
    let region = Some(cfg.region.as_str());

    match cli.cmd {
      Cmd::Synth => {
          let template = stack::synth(&cfg, &guard)?;
          template.write(&cli.out)?;
      },
      Cmd::Deploy { stack: stack_opt } => {
          let stack_name = stack_opt.unwrap_or_else(|| cfg.stack_name().to_string());
          let template = stack::synth(&cfg, &guard)?;
          let path = template.write(&cli.out)?;
          cfn::deploy_stack(&stack_name, &path, region)?
      },
      Cmd::Destroy { stack: stack_opt } => {
          let stack_name = stack_opt.unwrap_or_else(|| cfg.stack_name().to_string());
          cfn::delete_stack(&stack_name, region)?
      },
      Cmd::Policy { which } => {
          let doc = match which {
              PolicyKind::Key => stack::key_policy(&cfg)?,
              PolicyKind::DataBucket => stack::data_bucket_policy(&cfg)?,
              PolicyKind::LogBucket => stack::log_bucket_policy(&cfg)?,
          };
          println!("{}", doc.to_json_string()?);
      },
    }
    Ok(())
}

use std::path::PathBuf;

use alloy_primitives::{Address, ChainId};
use clap::value_parser;
use entrypoint_engine::{
    DispatchMode, DispatcherConfig, EntryPointConfig, ExecutorConfig, RollbackPolicy,
    ThrottleConfig, DEFAULT_BAN_DURATION, DEFAULT_BAN_THRESHOLD, DEFAULT_BUNDLE_GAS_LIMIT,
    DEFAULT_CHAIN_ID, DEFAULT_ENTRY_POINT, DEFAULT_VALIDATION_GAS_LIMIT, OPERATION_OVERHEAD_GAS,
};
use eyre::eyre::eyre;
use tracing::warn;

#[derive(Debug, clap::Parser)]
#[command(name = "entrypoint", version, about = "Post-execution validation entrypoint")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Runs the bundles of a JSON fixture through the entrypoint and prints the results.
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct SimulateArgs {
    /// Path to the bundle fixture.
    #[arg(long = "bundle", value_name = "FILE")]
    pub bundle: PathBuf,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pub pretty: bool,

    #[command(flatten)]
    pub entrypoint: EntryPointArgs,
}

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct EntryPointArgs {
    /// Address operation hashes are bound to.
    #[arg(long = "entrypoint", env = "ENTRYPOINT_ADDRESS", default_value_t = DEFAULT_ENTRY_POINT)]
    pub entry_point: Address,

    #[arg(long = "chain_id", env = "ENTRYPOINT_CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: ChainId,

    /// Receives bundle compensation. Overrides the fixture's beneficiary.
    #[arg(long = "beneficiary")]
    pub beneficiary: Option<Address>,

    #[command(flatten)]
    pub dispatch: DispatchArgs,

    #[command(flatten)]
    pub throttle: ThrottleArgs,

    #[command(flatten)]
    pub bundle: BundleArgs,
}

impl EntryPointArgs {
    pub fn into_config(self) -> eyre::Result<EntryPointConfig> {
        // Checks clap can't express.
        if self.bundle.gas_limit < OPERATION_OVERHEAD_GAS {
            return Err(eyre!(
                "`--bundle.gas_limit` must cover at least one operation ({OPERATION_OVERHEAD_GAS})"
            ));
        }

        if self.throttle.ban_threshold == 0 {
            warn!(target: "entrypoint::cli", "`--throttle.ban_threshold` is 0, senders are never banned");
        } else if self.throttle.ban_duration == 0 {
            warn!(target: "entrypoint::cli", "`--throttle.ban_duration` is 0, bans expire immediately");
        }

        Ok(EntryPointConfig {
            executor: ExecutorConfig {
                bundle_gas_limit: self.bundle.gas_limit,
            },
            dispatcher: DispatcherConfig {
                validation_gas_limit: self.dispatch.validation_gas_limit,
                mode: self.dispatch.mode,
            },
            throttle: ThrottleConfig {
                ban_threshold: self.throttle.ban_threshold,
                ban_duration: self.throttle.ban_duration,
                slash_on_ban: self.throttle.slash_on_ban,
            },
            rollback: self.bundle.rollback_policy,
            entry_point: self.entry_point,
            chain_id: self.chain_id,
        })
    }
}

/// Parameters for post-execution validation
#[derive(Debug, Clone, PartialEq, clap::Args)]
#[command(next_help_heading = "Post-Execution Validation")]
pub struct DispatchArgs {
    /// Gas available to each `validatePostExecution` call.
    #[arg(
        long = "dispatch.validation_gas_limit",
        default_value_t = DEFAULT_VALIDATION_GAS_LIMIT,
        value_parser = value_parser!(u64).range(1..)
    )]
    pub validation_gas_limit: u64,

    /// `short-circuit` stops at the first failed validation, `evaluate-all` validates every
    /// operation for diagnostics.
    #[arg(long = "dispatch.mode", default_value_t = DispatchMode::ShortCircuit)]
    pub mode: DispatchMode,
}

/// Parameters for sender throttling
#[derive(Debug, Clone, PartialEq, clap::Args)]
#[command(next_help_heading = "Throttling")]
pub struct ThrottleArgs {
    /// Consecutive failed validations after which a sender is banned. 0 disables bans.
    #[arg(long = "throttle.ban_threshold", default_value_t = DEFAULT_BAN_THRESHOLD)]
    pub ban_threshold: u32,

    /// Ban length in seconds.
    #[arg(long = "throttle.ban_duration", default_value_t = DEFAULT_BAN_DURATION)]
    pub ban_duration: u64,

    /// Mark the stake of banned senders for slashing.
    #[arg(
        long = "throttle.slash_on_ban",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub slash_on_ban: bool,
}

/// Parameters for bundle execution
#[derive(Debug, Clone, PartialEq, clap::Args)]
#[command(next_help_heading = "Bundle")]
pub struct BundleArgs {
    #[arg(long = "bundle.gas_limit", default_value_t = DEFAULT_BUNDLE_GAS_LIMIT)]
    pub gas_limit: u64,

    /// What to do with executed state when validation rejects a bundle.
    #[arg(long = "bundle.rollback_policy", default_value_t = RollbackPolicy::FullRollback)]
    pub rollback_policy: RollbackPolicy,
}

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bh-cli")]
#[command(about = "Inspect behavior bindings and dispatch messages in a stack world")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Print every behavior chain and use list after loading.
    Inspect(InspectArgs),
    /// Send a message to one object and print which handlers ran.
    Send(SendArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RegistryArgs {
    #[arg(long = "min-capacity", default_value_t = bh_runtime::DEFAULT_MIN_CAPACITY)]
    pub(crate) min_capacity: usize,
    #[arg(
        long = "max-inherit-depth",
        default_value_t = bh_runtime::DEFAULT_MAX_INHERIT_DEPTH
    )]
    pub(crate) max_inherit_depth: usize,
}

#[derive(Debug, Args)]
pub(crate) struct InspectArgs {
    #[arg(long = "world")]
    pub(crate) world: String,
    #[command(flatten)]
    pub(crate) registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub(crate) struct SendArgs {
    #[arg(long = "world")]
    pub(crate) world: String,
    #[arg(long = "stack")]
    pub(crate) stack: String,
    /// Control id on the stack; omitted means the stack itself.
    #[arg(long = "id")]
    pub(crate) id: Option<u32>,
    #[arg(long = "message")]
    pub(crate) message: String,
    #[arg(long = "repeat", default_value_t = 1)]
    pub(crate) repeat: usize,
    /// Behavior variable to print for the target after sending.
    #[arg(long = "var")]
    pub(crate) vars: Vec<String>,
    #[command(flatten)]
    pub(crate) registry: RegistryArgs,
}

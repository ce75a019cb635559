//! Command-line surface (spec.md §6's CLI table), defined with `clap`
//! derive the way `other_examples/manifests/Yinwhe-Rtain` structures its
//! subcommands.

use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mydocker", about = "A minimal Linux container runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and run a new container from an image.
    #[command(group(ArgGroup::new("mode").required(true).args(["tty", "detach"])))]
    Run {
        #[arg(long = "it", action = clap::ArgAction::SetTrue)]
        tty: bool,
        #[arg(short = 'd', long = "detach", action = clap::ArgAction::SetTrue)]
        detach: bool,
        #[arg(short = 'm', long = "mem", default_value = "")]
        mem: String,
        #[arg(long = "cpu", default_value = "")]
        cpu: String,
        #[arg(long = "cpuset", default_value = "")]
        cpu_set: String,
        #[arg(short = 'v', long = "volume", default_value = "")]
        volume: String,
        #[arg(long = "name")]
        name: Option<String>,
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        #[arg(long = "net", default_value = "")]
        network: String,
        #[arg(short = 'p', long = "port")]
        port_mapping: Vec<String>,
        image: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
    /// Internal: runs as PID 1 inside the new namespaces. Not for users.
    #[command(hide = true)]
    Init,
    /// Runs a command inside an existing container's namespaces.
    Exec {
        id: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
    /// Sends SIGTERM to a running container.
    Stop { id: String },
    /// Removes a container's workspace and state.
    Rm {
        #[arg(short = 'f', long = "force")]
        force: bool,
        ids: Vec<String>,
    },
    /// Lists containers.
    Ps {
        #[arg(short = 'a', long = "all")]
        all: bool,
    },
    /// Dumps a detached container's log file.
    Logs { id: String },
    /// Tars a container's merged filesystem into a new image.
    Commit { id: String, image_name: String },
    /// Network management.
    Network {
        #[command(subcommand)]
        command: NetworkCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    Create {
        #[arg(long = "driver", default_value = "bridge")]
        driver: String,
        #[arg(long = "subnet")]
        subnet: String,
        name: String,
    },
    List,
    Remove { name: String },
}

//! Binary entry point.
//!
//! spec.md §9's single most important constraint: `setns(CLONE_NEWPID)`
//! must run before this process has more than one thread. Both re-exec
//! gates below are therefore checked with plain `std::env`/`std::env::args`
//! access, before `clap` parses anything and long before a tokio runtime
//! (which spawns worker threads) is ever constructed.

use mydocker::cli::{Cli, Command, NetworkCommand};
use mydocker::error::MydockerError;
use mydocker::{commands, exec, init};

fn main() {
    if let Err(e) = real_main() {
        eprintln!("mydocker: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), MydockerError> {
    let mut args = std::env::args();
    args.next(); // argv[0]
    if args.next().as_deref() == Some(exec::FINAL_EXEC_MARKER) {
        let cmd = args.next().unwrap_or_default();
        return exec::run_final_exec(&cmd);
    }

    if exec::is_join_handshake() {
        return exec::run_join_and_reexec();
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    use clap::Parser;
    let cli = Cli::parse();

    match cli.command {
        Command::Init => init::run_init(),
        Command::Exec { id, argv } => commands::exec::exec(&id, &argv),
        Command::Stop { id } => commands::stop::stop(&id),
        Command::Rm { force, ids } => commands::rm::rm(&ids, force),
        Command::Ps { all } => {
            commands::ps::ps(all);
            Ok(())
        }
        Command::Logs { id } => commands::logs::logs(&id),
        Command::Commit { id, image_name } => commands::commit::commit(&id, &image_name),
        other => run_async(other),
    }
}

/// Dispatch for the subset of commands that need `rtnetlink`, and
/// therefore a tokio runtime. Built lazily so `init`/`exec`/`stop`/`rm`
/// never pay for one.
fn run_async(command: Command) -> Result<(), MydockerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| MydockerError::system_call("build tokio runtime", e))?;

    runtime.block_on(async move {
        let (connection, handle, _) = rtnetlink::new_connection()
            .map_err(|e| MydockerError::system_call("open netlink connection", e))?;
        tokio::spawn(connection);

        match command {
            Command::Run {
                tty,
                detach,
                mem,
                cpu,
                cpu_set,
                volume,
                name,
                env,
                network,
                port_mapping,
                image,
                argv,
            } => {
                commands::run::run(
                    handle,
                    image,
                    argv,
                    tty,
                    detach,
                    mem,
                    cpu,
                    cpu_set,
                    volume,
                    name,
                    env,
                    network,
                    port_mapping,
                )
                .await
            }
            Command::Network { command } => match command {
                NetworkCommand::Create { driver: _, subnet, name } => commands::network::create(handle, subnet, name).await,
                NetworkCommand::List => {
                    commands::network::list();
                    Ok(())
                }
                NetworkCommand::Remove { name } => commands::network::remove(handle, name).await,
            },
            _ => unreachable!("sync commands are handled in real_main"),
        }
    })
}

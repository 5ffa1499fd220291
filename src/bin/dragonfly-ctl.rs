use std::io;

use clap::{Parser, Subcommand};

use dragonfly::SignalRole;

#[derive(Parser)]
#[command(name = "dragonfly-ctl")]
#[command(about = "Signal a running dragonfly server", long_about = None)]
struct Cli {
    /// Process ID of the server
    #[arg(short, long)]
    pid: i32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a replacement process, then drain this one (SIGHUP)
    Restart,
    /// Start an additional process and keep this one serving (SIGUSR2)
    Reload,
    /// Drain and exit (SIGTERM)
    Stop,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let role = match cli.command {
        Commands::Restart => SignalRole::Restart,
        Commands::Reload => SignalRole::Reload,
        Commands::Stop => SignalRole::Terminate,
    };

    if cli.pid <= 0 {
        return Err(format!("invalid pid {}", cli.pid).into());
    }

    if unsafe { libc::kill(cli.pid, role.signal_number()) } == -1 {
        let err = io::Error::last_os_error();
        eprintln!("Error: cannot signal process {}: {}", cli.pid, err);
        return Err(err.into());
    }

    println!("Sent {} to {}", role.as_str(), cli.pid);
    Ok(())
}

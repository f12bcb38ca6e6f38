use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use crispy_upload::{Args, run};

fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let options = args.run_options(stdout.is_terminal());
    let run_result = args
        .into_command_and_client()
        .and_then(|(command, hardware_client)| {
            run(command, &mut stdout, hardware_client, options)
        });

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

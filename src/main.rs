use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use blecargo::{Args, fake_hardware_client, real_hardware_client, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let options = args.run_options(stdout.is_terminal());
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let hardware_client = match maybe_fake_args {
            Some(fake_args) => fake_hardware_client(fake_args),
            None => real_hardware_client(),
        };

        run(command, &options, &mut stdout, hardware_client).await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

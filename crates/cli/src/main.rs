use std::process::ExitCode;

fn main() -> ExitCode {
    h2pc_cli::run()
}

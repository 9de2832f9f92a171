use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(err) = ezfit::app::run() {
        eprintln!("ezfit: {err}");
        return ExitCode::from(err.exit_code());
    }
    ExitCode::SUCCESS
}

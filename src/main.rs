use std::process::ExitCode;

fn main() -> ExitCode {
    match pomocycle::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("pomocycle: {error}");
            ExitCode::FAILURE
        }
    }
}

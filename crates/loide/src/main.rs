use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    loide::cli::run()
}

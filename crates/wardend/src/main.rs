use std::process::ExitCode;

fn main() -> ExitCode {
    ExitCode::from(wardend::run_node().code())
}

//! Binary entrypoint for the sales assistant conversation shell.

use std::process::ExitCode;

use sales_assistant::start_sales_assistant;

/// Load saved conversations and serve the shell on stdin/stdout.
fn main() -> ExitCode {
    start_sales_assistant::run()
}

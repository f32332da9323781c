#![deny(unsafe_code)]

use std::io::Write;
use std::{env, io, process::ExitCode};

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let status = run_with(env::args_os(), &mut stdout, &mut stderr);
    bft_cli::exit_code_from(status)
}

fn run_with<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
    Out: Write,
    Err: Write,
{
    bft_cli::run(args, stdout, stderr)
}

#[cfg(test)]
mod tests {
    use super::run_with;

    #[test]
    fn version_flag_exits_cleanly_through_the_shim() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run_with(["bft", "--version"], &mut stdout, &mut stderr);
        assert_eq!(status, 0);
        assert!(!stdout.is_empty(), "version banner expected on stdout");
        assert!(stderr.is_empty(), "nothing should reach stderr");
    }

    #[test]
    fn missing_command_reports_usage_on_stderr() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run_with(["bft"], &mut stdout, &mut stderr);
        assert_ne!(status, 0);
        assert!(stdout.is_empty());
        assert!(!stderr.is_empty(), "usage text expected on stderr");
    }
}

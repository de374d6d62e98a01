use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    relayd::run(&mut io::stderr().lock())
}

use metrics::collector::net::NetSource;
use std::process::ExitCode;

fn main() -> ExitCode {
    metrics::plugin::main("if1sec", NetSource::default())
}

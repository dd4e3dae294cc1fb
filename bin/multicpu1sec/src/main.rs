use metrics::collector::cpu::CpuSource;
use std::process::ExitCode;

fn main() -> ExitCode {
    metrics::plugin::main("multicpu1sec", CpuSource::default())
}

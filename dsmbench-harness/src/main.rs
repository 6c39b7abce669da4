use anyhow::Result;

fn main() -> Result<()> {
    dsmbench_harness::cli::execute()
}

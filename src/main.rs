use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = appreg_rotator::cli::Cli::parse();
    let code = cli.run()?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

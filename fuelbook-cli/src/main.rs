use anyhow::Result;
use fuelbook_cli::app;

fn main() -> Result<()> {
    app::run()
}

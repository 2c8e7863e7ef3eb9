//! Driver listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use cadence_config::DriverRegistry;
use clap::Args;

/// List drivers, or describe one.
#[derive(Args)]
pub struct DriversArgs {
    /// Show details for a specific driver
    #[arg(value_name = "DRIVER")]
    driver: Option<String>,
}

/// Run the drivers command.
pub fn run(args: DriversArgs) -> anyhow::Result<()> {
    let registry = DriverRegistry::new();

    if let Some(name) = &args.driver {
        let driver = registry
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown driver: {}", name))?;

        println!("{}", driver.name);
        println!("{}", "=".repeat(driver.name.len()));
        println!();
        println!("{}", driver.description);
        println!();
        println!("Kind:        {}", driver.kind);
        if driver.params.is_empty() {
            println!("Parameters:  none");
        } else {
            println!("Parameters:  {}", driver.params.join(", "));
            println!();
            println!("Example:");
            println!();
            println!("  [[component]]");
            println!("  kind = \"{}\"", driver.name);
            println!("  [component.params]");
            for param in driver.params {
                println!("  {param} = ...");
            }
        }
    } else {
        println!("Available Drivers");
        println!("=================");
        println!();
        println!("  {:8}  {:8}  {}", "Name", "Kind", "Description");
        println!("  {:8}  {:8}  {}", "----", "----", "-----------");
        for driver in registry.all() {
            println!("  {:8}  {:8}  {}", driver.name, driver.kind.name(), driver.description);
        }
        println!();
        println!("Use 'cadence drivers <name>' for parameter info.");
    }

    Ok(())
}
